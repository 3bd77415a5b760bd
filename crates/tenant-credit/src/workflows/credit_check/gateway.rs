use async_trait::async_trait;

use super::domain::{
    ConsentInfo, CreditCheckStatus, CreditReport, PaymentRequest, PaymentResponse, PersonalInfo,
    ReportId, TransactionId,
};

/// Outbound payment processor. Declines are reported in the response, not as errors.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: PaymentRequest) -> Result<PaymentResponse, GatewayError>;
}

/// Credit bureau boundary so the workflow can be exercised against fakes.
#[async_trait]
pub trait CreditBureau: Send + Sync {
    async fn initiate_credit_check(
        &self,
        transaction_id: &TransactionId,
        personal_info: &PersonalInfo,
        consent: &ConsentInfo,
    ) -> Result<ReportId, BureauError>;

    async fn check_status(&self, report_id: &ReportId) -> Result<CreditCheckStatus, BureauError>;

    async fn retrieve_report(&self, report_id: &ReportId) -> Result<CreditReport, BureauError>;
}

/// Transport-level payment failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
    #[error("payment gateway rejected the request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BureauError {
    #[error("{0}")]
    Rejected(String),
    #[error("report {0} not found")]
    NotFound(ReportId),
    #[error("credit bureau unavailable: {0}")]
    Unavailable(String),
}
