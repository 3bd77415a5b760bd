use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier issued by the payment gateway for a settled charge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

/// Identifier issued by the credit bureau once a check has been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fee charged to the applicant before a bureau request is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCheckFee {
    pub amount_cents: u64,
    pub currency: String,
    pub description: String,
}

impl Default for CreditCheckFee {
    fn default() -> Self {
        Self {
            amount_cents: 9_000,
            currency: "CAD".to_string(),
            description: "Tenant credit check".to_string(),
        }
    }
}

impl CreditCheckFee {
    pub fn display_amount(&self) -> String {
        format!(
            "${}.{:02} {}",
            self.amount_cents / 100,
            self.amount_cents % 100,
            self.currency
        )
    }
}

/// One-time charge submitted to the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount_cents: u64,
    pub currency: String,
    pub description: String,
    pub customer_email: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Gateway verdict for a charge. Declines carry the gateway's message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentResponse {
    pub fn approved(transaction_id: TransactionId) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id),
            error: None,
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
}

/// Applicant identity submitted to the bureau. Never persisted past the wizard.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub ssn: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
}

impl PersonalInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    /// Last four digits of the SSN, for confirmation screens.
    pub fn masked_ssn(&self) -> String {
        let digits: Vec<char> = self.ssn.chars().filter(char::is_ascii_digit).collect();
        let tail: String = digits.iter().skip(digits.len().saturating_sub(4)).collect();
        format!("***-**-{tail}")
    }
}

impl fmt::Debug for PersonalInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersonalInfo")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("date_of_birth", &self.date_of_birth)
            .field("ssn", &self.masked_ssn())
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("address", &self.address)
            .finish()
    }
}

/// The three consent flags the applicant must accept before a bureau pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentField {
    CreditCheck,
    TermsAccepted,
    PrivacyPolicyAccepted,
}

impl ConsentField {
    pub const ALL: [ConsentField; 3] = [
        ConsentField::CreditCheck,
        ConsentField::TermsAccepted,
        ConsentField::PrivacyPolicyAccepted,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ConsentField::CreditCheck => "credit check authorization",
            ConsentField::TermsAccepted => "terms of service",
            ConsentField::PrivacyPolicyAccepted => "privacy policy",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentInfo {
    pub credit_check: bool,
    pub terms_accepted: bool,
    pub privacy_policy_accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConsentInfo {
    /// Consent with every flag accepted at `at`.
    pub fn granted(at: DateTime<Utc>) -> Self {
        Self {
            credit_check: true,
            terms_accepted: true,
            privacy_policy_accepted: true,
            timestamp: Some(at),
        }
    }

    /// Flip a single flag; the timestamp always records the latest toggle.
    pub fn toggle(&mut self, field: ConsentField, value: bool, at: DateTime<Utc>) {
        match field {
            ConsentField::CreditCheck => self.credit_check = value,
            ConsentField::TermsAccepted => self.terms_accepted = value,
            ConsentField::PrivacyPolicyAccepted => self.privacy_policy_accepted = value,
        }
        self.timestamp = Some(at);
    }

    pub fn is_granted(&self, field: ConsentField) -> bool {
        match field {
            ConsentField::CreditCheck => self.credit_check,
            ConsentField::TermsAccepted => self.terms_accepted,
            ConsentField::PrivacyPolicyAccepted => self.privacy_policy_accepted,
        }
    }

    pub fn missing(&self) -> Option<ConsentField> {
        ConsentField::ALL
            .into_iter()
            .find(|field| !self.is_granted(*field))
    }
}

/// Bureau-side lifecycle of a credit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CheckState {
    pub const fn label(self) -> &'static str {
        match self {
            CheckState::Pending => "pending",
            CheckState::Processing => "processing",
            CheckState::Completed => "completed",
            CheckState::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, CheckState::Completed | CheckState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCheckStatus {
    pub status: CheckState,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl CreditCheckStatus {
    pub fn new(status: CheckState, progress: u8) -> Self {
        Self {
            status,
            progress: progress.min(100),
            estimated_completion: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreRange {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl ScoreRange {
    pub const MIN_SCORE: u16 = 300;
    pub const MAX_SCORE: u16 = 850;

    pub const fn from_score(score: u16) -> Self {
        match score {
            0..=579 => ScoreRange::Poor,
            580..=669 => ScoreRange::Fair,
            670..=739 => ScoreRange::Good,
            _ => ScoreRange::Excellent,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ScoreRange::Poor => "Poor",
            ScoreRange::Fair => "Fair",
            ScoreRange::Good => "Good",
            ScoreRange::Excellent => "Excellent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    CreditCard,
    Mortgage,
    AutoLoan,
    StudentLoan,
    LineOfCredit,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Current,
    Late30,
    Late60,
    Late90,
    Collections,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub creditor: String,
    pub account_type: AccountType,
    pub balance_cents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_limit_cents: Option<u64>,
    pub payment_status: PaymentStatus,
    pub opened_on: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryKind {
    Hard,
    Soft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditInquiry {
    pub creditor: String,
    pub inquired_on: NaiveDate,
    pub kind: InquiryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRecord {
    pub record_type: String,
    pub filed_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<u64>,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

/// Finished bureau report, held read-only for display and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditReport {
    pub id: ReportId,
    pub score: u16,
    pub score_range: ScoreRange,
    pub accounts: Vec<CreditAccount>,
    pub inquiries: Vec<CreditInquiry>,
    pub public_records: Vec<PublicRecord>,
    pub factors: ScoreFactors,
    pub created_at: DateTime<Utc>,
}
