//! In-process stand-ins for the payment processor and credit bureau, used by the
//! demo command and the local server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};

use super::domain::{
    AccountType, CheckState, ConsentInfo, CreditAccount, CreditCheckStatus, CreditInquiry,
    CreditReport, InquiryKind, PaymentRequest, PaymentResponse, PaymentStatus, PersonalInfo,
    PublicRecord, ReportId, ScoreFactors, ScoreRange, TransactionId,
};
use super::gateway::{BureauError, CreditBureau, GatewayError, PaymentGateway};

pub const DECLINED_CARD_TOKEN: &str = "tok_declined";
pub const CARD_DECLINED_MESSAGE: &str = "Your card was declined.";

/// Approves every charge except those flagged with the declined card token or
/// sent from a blocked email domain.
#[derive(Debug, Default)]
pub struct SimulatedPaymentGateway {
    blocked_domains: Vec<String>,
    latency: Duration,
    sequence: AtomicU64,
    charges: Mutex<Vec<PaymentRequest>>,
}

impl SimulatedPaymentGateway {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn blocking_domain(mut self, domain: impl Into<String>) -> Self {
        self.blocked_domains
            .push(domain.into().trim().to_ascii_lowercase());
        self
    }

    pub fn charges(&self) -> Vec<PaymentRequest> {
        self.charges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_declined(&self, request: &PaymentRequest) -> bool {
        if request
            .metadata
            .get("card_token")
            .is_some_and(|token| token == DECLINED_CARD_TOKEN)
        {
            return true;
        }

        let domain = request
            .customer_email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_ascii_lowercase())
            .unwrap_or_default();
        self.blocked_domains.iter().any(|blocked| *blocked == domain)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(&self, request: PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if request.amount_cents == 0 {
            return Err(GatewayError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            ));
        }

        let declined = self.is_declined(&request);
        self.charges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if declined {
            return Ok(PaymentResponse::declined(CARD_DECLINED_MESSAGE));
        }

        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(PaymentResponse::approved(TransactionId(format!(
            "txn-{id:06}"
        ))))
    }
}

#[derive(Debug)]
struct SimulatedCheck {
    ticks: usize,
    report: CreditReport,
}

/// Walks every check through a fixed status script and then serves a report
/// derived from the applicant's details.
#[derive(Debug)]
pub struct SimulatedCreditBureau {
    script: Vec<CreditCheckStatus>,
    sequence: AtomicU64,
    checks: Mutex<HashMap<ReportId, SimulatedCheck>>,
}

impl Default for SimulatedCreditBureau {
    fn default() -> Self {
        Self::with_script(vec![
            CreditCheckStatus::new(CheckState::Pending, 0),
            CreditCheckStatus::new(CheckState::Processing, 40),
            CreditCheckStatus::new(CheckState::Processing, 80),
            CreditCheckStatus::new(CheckState::Completed, 100),
        ])
    }
}

impl SimulatedCreditBureau {
    /// The last entry is repeated once the script runs out.
    pub fn with_script(script: Vec<CreditCheckStatus>) -> Self {
        Self {
            script,
            sequence: AtomicU64::new(0),
            checks: Mutex::new(HashMap::new()),
        }
    }

    /// Checks initiated but whose report has not been retrieved yet.
    pub fn open_checks(&self) -> usize {
        self.checks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn status_at(&self, ticks: usize) -> CreditCheckStatus {
        self.script
            .get(ticks)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_else(|| CreditCheckStatus::new(CheckState::Completed, 100))
    }
}

#[async_trait]
impl CreditBureau for SimulatedCreditBureau {
    async fn initiate_credit_check(
        &self,
        transaction_id: &TransactionId,
        personal_info: &PersonalInfo,
        consent: &ConsentInfo,
    ) -> Result<ReportId, BureauError> {
        if let Some(field) = consent.missing() {
            return Err(BureauError::Rejected(format!(
                "{} was not provided",
                field.label()
            )));
        }
        if transaction_id.0.trim().is_empty() {
            return Err(BureauError::Rejected(
                "a paid transaction is required".to_string(),
            ));
        }

        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let report_id = ReportId(format!("rpt-{id:06}"));
        let report = sample_report(report_id.clone(), personal_info);

        self.checks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(report_id.clone(), SimulatedCheck { ticks: 0, report });
        Ok(report_id)
    }

    async fn check_status(&self, report_id: &ReportId) -> Result<CreditCheckStatus, BureauError> {
        let mut checks = self.checks.lock().unwrap_or_else(PoisonError::into_inner);
        let check = checks
            .get_mut(report_id)
            .ok_or_else(|| BureauError::NotFound(report_id.clone()))?;

        let mut status = self.status_at(check.ticks);
        check.ticks += 1;
        if !status.status.is_terminal() {
            let remaining = self.script.len().saturating_sub(check.ticks) as i64;
            status.estimated_completion =
                Some(Utc::now() + ChronoDuration::seconds(remaining * 10));
        }
        Ok(status)
    }

    async fn retrieve_report(&self, report_id: &ReportId) -> Result<CreditReport, BureauError> {
        let mut checks = self.checks.lock().unwrap_or_else(PoisonError::into_inner);
        let check = checks
            .get(report_id)
            .ok_or_else(|| BureauError::NotFound(report_id.clone()))?;

        let completed = check
            .ticks
            .checked_sub(1)
            .is_some_and(|tick| self.status_at(tick).status == CheckState::Completed);
        if !completed {
            return Err(BureauError::Rejected(format!(
                "report {report_id} is not ready"
            )));
        }

        // A delivered report is not kept around.
        checks
            .remove(report_id)
            .map(|check| check.report)
            .ok_or_else(|| BureauError::NotFound(report_id.clone()))
    }
}

/// Deterministic report so repeated demo runs for the same applicant agree.
pub fn sample_report(id: ReportId, personal_info: &PersonalInfo) -> CreditReport {
    let digit_sum: u32 = personal_info
        .ssn
        .chars()
        .filter_map(|c| c.to_digit(10))
        .sum();
    let score = 560 + ((digit_sum * 37) % 281) as u16;
    let score = score.clamp(ScoreRange::MIN_SCORE, ScoreRange::MAX_SCORE);

    let today = Utc::now().date_naive();
    let years_ago = |years: i32| {
        NaiveDate::from_ymd_opt(today.year() - years, 1, 15).unwrap_or(today)
    };

    let accounts = vec![
        CreditAccount {
            creditor: "Northern Trust Visa".to_string(),
            account_type: AccountType::CreditCard,
            balance_cents: 142_050,
            credit_limit_cents: Some(800_000),
            payment_status: PaymentStatus::Current,
            opened_on: years_ago(6),
        },
        CreditAccount {
            creditor: "Maple Auto Finance".to_string(),
            account_type: AccountType::AutoLoan,
            balance_cents: 1_275_000,
            credit_limit_cents: None,
            payment_status: if score < 640 {
                PaymentStatus::Late30
            } else {
                PaymentStatus::Current
            },
            opened_on: years_ago(3),
        },
        CreditAccount {
            creditor: "Lakeshore Credit Union LOC".to_string(),
            account_type: AccountType::LineOfCredit,
            balance_cents: 50_000,
            credit_limit_cents: Some(500_000),
            payment_status: PaymentStatus::Current,
            opened_on: years_ago(2),
        },
    ];

    let inquiries = vec![
        CreditInquiry {
            creditor: "Tenant screening".to_string(),
            inquired_on: today,
            kind: InquiryKind::Soft,
        },
        CreditInquiry {
            creditor: "Maple Auto Finance".to_string(),
            inquired_on: years_ago(3),
            kind: InquiryKind::Hard,
        },
    ];

    let public_records = if score < 600 {
        vec![PublicRecord {
            record_type: "collection".to_string(),
            filed_on: years_ago(4),
            amount_cents: Some(61_000),
            status: "paid".to_string(),
        }]
    } else {
        Vec::new()
    };

    let mut factors = ScoreFactors {
        positive: vec![
            "long history of on-time payments".to_string(),
            "low revolving utilization".to_string(),
        ],
        negative: Vec::new(),
    };
    if score < 640 {
        factors
            .negative
            .push("recent late payment on an installment loan".to_string());
    }
    if !public_records.is_empty() {
        factors
            .negative
            .push("collection account on file".to_string());
    }

    CreditReport {
        id,
        score,
        score_range: ScoreRange::from_score(score),
        accounts,
        inquiries,
        public_records,
        factors,
        created_at: Utc::now(),
    }
}
