use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::CreditCheckConfig;
use crate::workflows::credit_check::domain::{
    AccountType, Address, CheckState, ConsentInfo, CreditAccount, CreditCheckFee, CreditCheckStatus,
    CreditInquiry, CreditReport, InquiryKind, PaymentRequest, PaymentResponse, PaymentStatus,
    PersonalInfo, ReportId, ScoreFactors, ScoreRange, TransactionId,
};
use crate::workflows::credit_check::gateway::{
    BureauError, CreditBureau, GatewayError, PaymentGateway,
};
use crate::workflows::credit_check::poller::PollConfig;
use crate::workflows::credit_check::wizard::WizardController;

pub(super) fn applicant() -> PersonalInfo {
    PersonalInfo {
        first_name: "Maya".to_string(),
        last_name: "Tremblay".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1991, 3, 14).expect("valid date"),
        ssn: "046-454-286".to_string(),
        email: "maya.tremblay@example.ca".to_string(),
        phone: "416-555-0182".to_string(),
        address: Address {
            street: "88 Queen St W".to_string(),
            city: "Toronto".to_string(),
            province: "ON".to_string(),
            postal_code: "M5H 2N2".to_string(),
            country: "CA".to_string(),
        },
    }
}

pub(super) fn consent() -> ConsentInfo {
    ConsentInfo::granted(Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap())
}

pub(super) fn report_id() -> ReportId {
    ReportId("rpt-test-1".to_string())
}

pub(super) fn status(state: CheckState, progress: u8) -> CreditCheckStatus {
    CreditCheckStatus::new(state, progress)
}

pub(super) fn standard_script() -> Vec<StatusStep> {
    vec![
        StatusStep::Status(status(CheckState::Pending, 0)),
        StatusStep::Status(status(CheckState::Processing, 40)),
        StatusStep::Status(status(CheckState::Processing, 80)),
        StatusStep::Status(status(CheckState::Completed, 100)),
    ]
}

pub(super) fn sample_report(id: ReportId) -> CreditReport {
    CreditReport {
        id,
        score: 712,
        score_range: ScoreRange::Good,
        accounts: vec![
            CreditAccount {
                creditor: "Northern Trust Visa".to_string(),
                account_type: AccountType::CreditCard,
                balance_cents: 150_000,
                credit_limit_cents: Some(600_000),
                payment_status: PaymentStatus::Current,
                opened_on: NaiveDate::from_ymd_opt(2017, 4, 2).expect("valid date"),
            },
            CreditAccount {
                creditor: "Maple Auto Finance".to_string(),
                account_type: AccountType::AutoLoan,
                balance_cents: 1_200_000,
                credit_limit_cents: None,
                payment_status: PaymentStatus::Late30,
                opened_on: NaiveDate::from_ymd_opt(2022, 8, 19).expect("valid date"),
            },
            CreditAccount {
                creditor: "Lakeshore LOC".to_string(),
                account_type: AccountType::LineOfCredit,
                balance_cents: 50_000,
                credit_limit_cents: Some(400_000),
                payment_status: PaymentStatus::Current,
                opened_on: NaiveDate::from_ymd_opt(2020, 1, 6).expect("valid date"),
            },
        ],
        inquiries: vec![
            CreditInquiry {
                creditor: "Tenant screening".to_string(),
                inquired_on: NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date"),
                kind: InquiryKind::Soft,
            },
            CreditInquiry {
                creditor: "Maple Auto Finance".to_string(),
                inquired_on: NaiveDate::from_ymd_opt(2022, 8, 12).expect("valid date"),
                kind: InquiryKind::Hard,
            },
        ],
        public_records: Vec::new(),
        factors: ScoreFactors {
            positive: vec!["long credit history".to_string()],
            negative: vec!["recent late payment".to_string()],
        },
        created_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 45, 0).unwrap(),
    }
}

pub(super) fn poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(10),
        tick_timeout: Duration::from_secs(5),
        initial_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(8),
        max_tick_failures: 3,
        max_wait: Duration::from_secs(300),
    }
}

pub(super) fn credit_check_config() -> CreditCheckConfig {
    CreditCheckConfig {
        fee: CreditCheckFee::default(),
        poll: poll_config(),
        minimum_age: 18,
        session_idle_timeout: Duration::from_secs(30 * 60),
    }
}

pub(super) fn build_wizard(
    gateway: ScriptedGateway,
    bureau: ScriptedBureau,
) -> (
    WizardController<ScriptedGateway, ScriptedBureau>,
    Arc<ScriptedGateway>,
    Arc<ScriptedBureau>,
) {
    let gateway = Arc::new(gateway);
    let bureau = Arc::new(bureau);
    let wizard = WizardController::new(gateway.clone(), bureau.clone(), &credit_check_config());
    (wizard, gateway, bureau)
}

/// Replays queued gateway outcomes, approving once the queue is empty.
#[derive(Default)]
pub(super) struct ScriptedGateway {
    responses: Mutex<VecDeque<Result<PaymentResponse, GatewayError>>>,
    charges: Mutex<Vec<PaymentRequest>>,
}

impl ScriptedGateway {
    pub(super) fn approving() -> Self {
        Self::default()
    }

    pub(super) fn with_responses(responses: Vec<Result<PaymentResponse, GatewayError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            charges: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn charges(&self) -> Vec<PaymentRequest> {
        self.charges.lock().expect("charges mutex poisoned").clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        let attempt = {
            let mut charges = self.charges.lock().expect("charges mutex poisoned");
            charges.push(request);
            charges.len()
        };
        self.responses
            .lock()
            .expect("responses mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Ok(PaymentResponse::approved(TransactionId(format!(
                    "txn-test-{attempt}"
                ))))
            })
    }
}

#[derive(Debug, Clone)]
pub(super) enum StatusStep {
    Status(CreditCheckStatus),
    Error(String),
    Hang,
    Crash,
}

/// Bureau fake driven by queued outcomes. The final status step repeats once
/// the queue runs dry.
pub(super) struct ScriptedBureau {
    initiations: Mutex<VecDeque<Result<ReportId, BureauError>>>,
    statuses: Mutex<VecDeque<StatusStep>>,
    reports: Mutex<VecDeque<Result<CreditReport, BureauError>>>,
    submitted: Mutex<Vec<String>>,
    initiate_calls: AtomicUsize,
    status_calls: AtomicUsize,
    retrieve_calls: AtomicUsize,
}

impl Default for ScriptedBureau {
    fn default() -> Self {
        Self {
            initiations: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(standard_script().into()),
            reports: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            initiate_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            retrieve_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedBureau {
    pub(super) fn with_statuses(self, steps: Vec<StatusStep>) -> Self {
        *self.statuses.lock().expect("status mutex poisoned") = steps.into();
        self
    }

    pub(super) fn with_initiations(self, outcomes: Vec<Result<ReportId, BureauError>>) -> Self {
        *self.initiations.lock().expect("initiation mutex poisoned") = outcomes.into();
        self
    }

    pub(super) fn with_reports(self, outcomes: Vec<Result<CreditReport, BureauError>>) -> Self {
        *self.reports.lock().expect("report mutex poisoned") = outcomes.into();
        self
    }

    pub(super) fn initiate_calls(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub(super) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(super) fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub(super) fn submitted_names(&self) -> Vec<String> {
        self.submitted.lock().expect("submitted mutex poisoned").clone()
    }

    fn next_status_step(&self) -> StatusStep {
        let mut statuses = self.statuses.lock().expect("status mutex poisoned");
        if statuses.len() > 1 {
            statuses.pop_front().expect("non-empty queue")
        } else {
            statuses
                .front()
                .cloned()
                .unwrap_or(StatusStep::Status(status(CheckState::Processing, 50)))
        }
    }
}

#[async_trait]
impl CreditBureau for ScriptedBureau {
    async fn initiate_credit_check(
        &self,
        _transaction_id: &TransactionId,
        personal_info: &PersonalInfo,
        _consent: &ConsentInfo,
    ) -> Result<ReportId, BureauError> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .lock()
            .expect("submitted mutex poisoned")
            .push(personal_info.full_name());
        self.initiations
            .lock()
            .expect("initiation mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(report_id()))
    }

    async fn check_status(&self, _report_id: &ReportId) -> Result<CreditCheckStatus, BureauError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_status_step() {
            StatusStep::Status(status) => Ok(status),
            StatusStep::Error(message) => Err(BureauError::Unavailable(message)),
            StatusStep::Hang => std::future::pending().await,
            StatusStep::Crash => panic!("bureau client crashed"),
        }
    }

    async fn retrieve_report(&self, report_id: &ReportId) -> Result<CreditReport, BureauError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.reports
            .lock()
            .expect("report mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(sample_report(report_id.clone())))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
