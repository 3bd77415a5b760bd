use serde::Serialize;

use super::domain::ConsentField;

/// Rejections raised before anything is sent to the bureau.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{} must be accepted before requesting a credit check", .0.label())]
    MissingConsent(ConsentField),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("email address is not valid")]
    InvalidEmail,
    #[error("SSN must contain exactly 9 digits")]
    InvalidSsn,
    #[error("phone number must contain 10 digits")]
    InvalidPhone,
    #[error("postal code '{postal_code}' is not valid for {country}")]
    InvalidPostalCode {
        postal_code: String,
        country: String,
    },
    #[error("applicant must be at least {minimum} years old")]
    Underage { minimum: u32 },
    #[error("date of birth cannot be in the future")]
    FutureDateOfBirth,
}

/// Every failure the credit check workflow can surface to the applicant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditCheckError {
    #[error("{0}")]
    Payment(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unable to start credit check: {0}")]
    Request(String),
    #[error("unable to confirm credit check status: {0}")]
    Poll(String),
    #[error("unable to retrieve credit report: {0}")]
    Retrieval(String),
    #[error("cannot {action} while on the {stage} step")]
    InvalidTransition {
        stage: &'static str,
        action: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Payment,
    Validation,
    Request,
    Poll,
    Retrieval,
    InvalidTransition,
}

impl CreditCheckError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            CreditCheckError::Payment(_) => ErrorKind::Payment,
            CreditCheckError::Validation(_) => ErrorKind::Validation,
            CreditCheckError::Request(_) => ErrorKind::Request,
            CreditCheckError::Poll(_) => ErrorKind::Poll,
            CreditCheckError::Retrieval(_) => ErrorKind::Retrieval,
            CreditCheckError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }
}
