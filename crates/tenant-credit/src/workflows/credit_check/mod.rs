//! Paid tenant credit check: fee collection, bureau request, status polling and
//! report retrieval, sequenced by [`WizardController`].

pub mod domain;
pub mod error;
pub mod gateway;
pub mod payment;
pub mod poller;
pub mod report;
pub mod requestor;
pub mod retriever;
pub mod router;
pub mod session;
pub mod simulated;
pub(crate) mod validation;
pub mod wizard;

#[cfg(test)]
mod tests;

pub use domain::{
    AccountType, Address, CheckState, ConsentField, ConsentInfo, CreditAccount, CreditCheckFee,
    CreditCheckStatus, CreditInquiry, CreditReport, InquiryKind, PaymentRequest, PaymentResponse,
    PaymentStatus, PersonalInfo, PublicRecord, ReportId, ScoreFactors, ScoreRange, TransactionId,
};
pub use error::{CreditCheckError, ErrorKind, ValidationError};
pub use gateway::{BureauError, CreditBureau, GatewayError, PaymentGateway};
pub use payment::FeeCollector;
pub use poller::{PollConfig, PollEvent, PollHandle, StatusPoller};
pub use report::{export_accounts_csv, ReportExportError, ReportSummaryView};
pub use requestor::{CreditCheckRequestor, InitiateResponse};
pub use retriever::{ReportRetriever, RetrieveResponse};
pub use router::{credit_check_router, PaymentSubmission, PersonalInfoSubmission, SessionView};
pub use session::{spawn_idle_sweeper, CreditCheckSessions, SessionError, SessionId, SharedWizard};
pub use validation::SubmissionGuard;
pub use wizard::{Submission, WizardController, WizardError, WizardStage, WizardState, WizardView};
