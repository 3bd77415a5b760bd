use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{ConsentInfo, PersonalInfo, ReportId, TransactionId};
use super::error::CreditCheckError;
use super::gateway::CreditBureau;
use super::validation::SubmissionGuard;

/// Places the bureau request once payment has cleared. Never retries on its own.
pub struct CreditCheckRequestor<B> {
    bureau: Arc<B>,
    guard: SubmissionGuard,
}

impl<B> CreditCheckRequestor<B>
where
    B: CreditBureau + 'static,
{
    pub fn new(bureau: Arc<B>, guard: SubmissionGuard) -> Self {
        Self { bureau, guard }
    }

    pub fn guard(&self) -> &SubmissionGuard {
        &self.guard
    }

    pub async fn initiate(
        &self,
        transaction_id: &TransactionId,
        personal_info: &PersonalInfo,
        consent: &ConsentInfo,
    ) -> Result<ReportId, CreditCheckError> {
        self.guard
            .validate(personal_info, consent, Utc::now().date_naive())?;

        match self
            .bureau
            .initiate_credit_check(transaction_id, personal_info, consent)
            .await
        {
            Ok(report_id) => {
                info!(%transaction_id, %report_id, "credit check initiated");
                Ok(report_id)
            }
            Err(err) => {
                warn!(%transaction_id, error = %err, "credit check initiation failed");
                Err(CreditCheckError::Request(err.to_string()))
            }
        }
    }
}

/// Contract-shaped view of an initiation attempt for API consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitiateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<ReportId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<ReportId, CreditCheckError>> for InitiateResponse {
    fn from(result: &Result<ReportId, CreditCheckError>) -> Self {
        match result {
            Ok(report_id) => Self {
                success: true,
                report_id: Some(report_id.clone()),
                error: None,
            },
            Err(err) => Self {
                success: false,
                report_id: None,
                error: Some(err.to_string()),
            },
        }
    }
}
