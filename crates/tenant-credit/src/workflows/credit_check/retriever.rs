use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{CreditReport, ReportId};
use super::error::CreditCheckError;
use super::gateway::CreditBureau;

/// Single-shot report fetch; callers decide whether to try again.
pub struct ReportRetriever<B> {
    bureau: Arc<B>,
}

impl<B> Clone for ReportRetriever<B> {
    fn clone(&self) -> Self {
        Self {
            bureau: Arc::clone(&self.bureau),
        }
    }
}

impl<B> ReportRetriever<B>
where
    B: CreditBureau + 'static,
{
    pub fn new(bureau: Arc<B>) -> Self {
        Self { bureau }
    }

    pub async fn fetch(&self, report_id: &ReportId) -> Result<CreditReport, CreditCheckError> {
        match self.bureau.retrieve_report(report_id).await {
            Ok(report) => {
                info!(%report_id, score = report.score, "credit report retrieved");
                Ok(report)
            }
            Err(err) => {
                warn!(%report_id, error = %err, "credit report retrieval failed");
                Err(CreditCheckError::Retrieval(err.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrieveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CreditReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RetrieveResponse {
    pub fn found(report: CreditReport) -> Self {
        Self {
            success: true,
            report: Some(report),
            error: None,
        }
    }

    pub fn missing(error: impl Into<String>) -> Self {
        Self {
            success: false,
            report: None,
            error: Some(error.into()),
        }
    }
}
