use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    ConsentInfo, CreditCheckStatus, CreditReport, PaymentRequest, PersonalInfo, ReportId,
    TransactionId,
};
use super::error::{CreditCheckError, ErrorKind};
use super::gateway::{CreditBureau, PaymentGateway};
use super::payment::FeeCollector;
use super::poller::{PollEvent, PollHandle, StatusPoller};
use super::report::ReportSummaryView;
use super::requestor::CreditCheckRequestor;
use super::validation::SubmissionGuard;
use crate::config::CreditCheckConfig;

/// The four user-facing steps of the credit check flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStage {
    Payment,
    PersonalInfo,
    Processing,
    Report,
}

impl WizardStage {
    pub const fn label(self) -> &'static str {
        match self {
            WizardStage::Payment => "payment",
            WizardStage::PersonalInfo => "personal info",
            WizardStage::Processing => "processing",
            WizardStage::Report => "report",
        }
    }
}

/// Applicant details captured on the personal info step, kept for retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub personal_info: PersonalInfo,
    pub consent: ConsentInfo,
}

#[derive(Debug, Clone)]
pub enum WizardState {
    Payment {
        pending_request: Option<PaymentRequest>,
    },
    PersonalInfo {
        transaction_id: TransactionId,
    },
    Processing {
        transaction_id: TransactionId,
        submission: Submission,
        report_id: Option<ReportId>,
        status: Option<CreditCheckStatus>,
    },
    Report {
        report_id: ReportId,
        report: CreditReport,
    },
}

impl WizardState {
    pub fn stage(&self) -> WizardStage {
        match self {
            WizardState::Payment { .. } => WizardStage::Payment,
            WizardState::PersonalInfo { .. } => WizardStage::PersonalInfo,
            WizardState::Processing { .. } => WizardStage::Processing,
            WizardState::Report { .. } => WizardStage::Report,
        }
    }
}

/// Error overlay shown above the current step until the applicant retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardError {
    pub kind: ErrorKind,
    pub message: String,
    pub can_retry: bool,
    #[serde(skip)]
    pub cause: CreditCheckError,
}

/// Drives payment, bureau request, status polling and report display.
///
/// Holds at most one poll at a time. The poll is stopped on completion,
/// failure, cancel, and when the controller is dropped.
pub struct WizardController<P, B> {
    fees: FeeCollector<P>,
    requestor: CreditCheckRequestor<B>,
    poller: StatusPoller<B>,
    state: WizardState,
    error: Option<WizardError>,
    is_processing: bool,
    poll: Option<PollHandle>,
}

impl<P, B> WizardController<P, B>
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    pub fn new(payments: Arc<P>, bureau: Arc<B>, config: &CreditCheckConfig) -> Self {
        Self {
            fees: FeeCollector::new(payments, config.fee.clone()),
            requestor: CreditCheckRequestor::new(
                Arc::clone(&bureau),
                SubmissionGuard::with_minimum_age(config.minimum_age),
            ),
            poller: StatusPoller::new(bureau, config.poll.clone()),
            state: WizardState::Payment {
                pending_request: None,
            },
            error: None,
            is_processing: false,
            poll: None,
        }
    }

    pub fn stage(&self) -> WizardStage {
        self.state.stage()
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn error(&self) -> Option<&WizardError> {
        self.error.as_ref()
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    pub fn has_active_poll(&self) -> bool {
        self.poll.as_ref().is_some_and(|handle| !handle.is_stopped())
    }

    pub fn poller(&self) -> &StatusPoller<B> {
        &self.poller
    }

    pub fn fees(&self) -> &FeeCollector<P> {
        &self.fees
    }

    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match &self.state {
            WizardState::PersonalInfo { transaction_id }
            | WizardState::Processing { transaction_id, .. } => Some(transaction_id),
            _ => None,
        }
    }

    pub fn report_id(&self) -> Option<&ReportId> {
        match &self.state {
            WizardState::Processing { report_id, .. } => report_id.as_ref(),
            WizardState::Report { report_id, .. } => Some(report_id),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&CreditCheckStatus> {
        match &self.state {
            WizardState::Processing { status, .. } => status.as_ref(),
            _ => None,
        }
    }

    pub fn report(&self) -> Option<&CreditReport> {
        match &self.state {
            WizardState::Report { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Charge the credit check fee and move on to the personal info step.
    pub async fn submit_payment(
        &mut self,
        customer_email: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<WizardStage, CreditCheckError> {
        if !matches!(self.state, WizardState::Payment { .. }) {
            return Err(self.invalid("submit payment"));
        }

        let request = self.fees.request_for(customer_email, metadata);
        self.charge(request).await
    }

    /// Validate locally, then enter processing and request the check.
    pub async fn submit_personal_info(
        &mut self,
        personal_info: PersonalInfo,
        consent: ConsentInfo,
    ) -> Result<WizardStage, CreditCheckError> {
        let WizardState::PersonalInfo { transaction_id } = &self.state else {
            return Err(self.invalid("submit personal info"));
        };
        let transaction_id = transaction_id.clone();

        if let Err(err) =
            self.requestor
                .guard()
                .validate(&personal_info, &consent, Utc::now().date_naive())
        {
            return Err(self.surface(err.into()));
        }

        self.state = WizardState::Processing {
            transaction_id,
            submission: Submission {
                personal_info,
                consent,
            },
            report_id: None,
            status: None,
        };
        info!(stage = WizardStage::Processing.label(), "credit check wizard advanced");
        self.initiate().await
    }

    /// Repeat whatever failed last with the information already captured.
    pub async fn retry(&mut self) -> Result<WizardStage, CreditCheckError> {
        match &self.state {
            WizardState::Payment {
                pending_request: Some(request),
            } => {
                let request = request.clone();
                self.charge(request).await
            }
            WizardState::Processing {
                report_id: None, ..
            } => self.initiate().await,
            WizardState::Processing {
                report_id: Some(report_id),
                ..
            } if !self.has_active_poll() => {
                let report_id = report_id.clone();
                self.error = None;
                self.is_processing = true;
                self.start_polling(report_id).await;
                Ok(WizardStage::Processing)
            }
            _ => Err(self.invalid("retry")),
        }
    }

    /// Restart polling for the current report, replacing any poll in flight.
    pub async fn refresh(&mut self) -> Result<WizardStage, CreditCheckError> {
        let WizardState::Processing {
            report_id: Some(report_id),
            ..
        } = &self.state
        else {
            return Err(self.invalid("refresh status"));
        };
        let report_id = report_id.clone();

        self.error = None;
        self.is_processing = true;
        self.start_polling(report_id).await;
        Ok(WizardStage::Processing)
    }

    /// Wait for the next poll event and apply it. `None` when no poll is running.
    pub async fn next_event(&mut self) -> Option<WizardStage> {
        let handle = self.poll.as_mut()?;
        match handle.next().await {
            Some(event) => {
                self.apply(event).await;
                Some(self.stage())
            }
            None => {
                self.poll_lost();
                None
            }
        }
    }

    /// Apply every poll event that has already arrived without waiting.
    pub async fn sync(&mut self) -> WizardStage {
        loop {
            let Some(event) = self.poll.as_mut().and_then(PollHandle::try_next) else {
                break;
            };
            self.apply(event).await;
        }
        if self.poll.as_ref().is_some_and(PollHandle::has_ended) {
            self.poll_lost();
        }
        self.stage()
    }

    /// Keep applying poll events until the report arrives or the poll fails.
    pub async fn run_to_completion(&mut self) -> Result<&CreditReport, CreditCheckError> {
        while self.next_event().await.is_some() {
            if self.error.is_some() {
                break;
            }
        }

        match (&self.state, &self.error) {
            (WizardState::Report { report, .. }, _) => Ok(report),
            (_, Some(error)) => Err(error.cause.clone()),
            _ => Err(self.invalid("wait for a report")),
        }
    }

    /// Abandon the flow and return to the payment step.
    pub async fn cancel(&mut self) -> Result<WizardStage, CreditCheckError> {
        if matches!(self.state, WizardState::Report { .. }) {
            return Err(self.invalid("cancel"));
        }

        self.close().await;
        self.state = WizardState::Payment {
            pending_request: None,
        };
        self.error = None;
        info!("credit check wizard cancelled");
        Ok(WizardStage::Payment)
    }

    /// Leave the report screen. The wizard is reset for a fresh check.
    pub fn finish(&mut self) -> Result<CreditReport, CreditCheckError> {
        if !matches!(self.state, WizardState::Report { .. }) {
            return Err(self.invalid("finish"));
        }

        let previous = std::mem::replace(
            &mut self.state,
            WizardState::Payment {
                pending_request: None,
            },
        );
        self.error = None;
        match previous {
            WizardState::Report { report, .. } => Ok(report),
            _ => Err(self.invalid("finish")),
        }
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Stop any running poll. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut handle) = self.poll.take() {
            handle.stop().await;
        }
        self.is_processing = false;
    }

    pub fn view(&self) -> WizardView {
        WizardView {
            stage: self.stage(),
            stage_label: self.stage().label(),
            fee: self.fees.fee().display_amount(),
            is_processing: self.is_processing,
            polling: self.has_active_poll(),
            transaction_id: self.transaction_id().cloned(),
            report_id: self.report_id().cloned(),
            status: self.status().cloned(),
            report: self.report().map(ReportSummaryView::from),
            error: self.error.clone(),
        }
    }
}

impl<P, B> WizardController<P, B>
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    async fn charge(&mut self, request: PaymentRequest) -> Result<WizardStage, CreditCheckError> {
        self.error = None;
        self.is_processing = true;
        let result = self.fees.collect(request.clone()).await;
        self.is_processing = false;

        match result {
            Ok(transaction_id) => {
                self.state = WizardState::PersonalInfo { transaction_id };
                info!(stage = WizardStage::PersonalInfo.label(), "credit check wizard advanced");
                Ok(WizardStage::PersonalInfo)
            }
            Err(err) => {
                self.state = WizardState::Payment {
                    pending_request: Some(request),
                };
                Err(self.surface(err))
            }
        }
    }

    async fn initiate(&mut self) -> Result<WizardStage, CreditCheckError> {
        let WizardState::Processing {
            transaction_id,
            submission,
            report_id: None,
            ..
        } = &self.state
        else {
            return Err(self.invalid("request a credit check"));
        };
        let transaction_id = transaction_id.clone();
        let submission = submission.clone();

        self.error = None;
        self.is_processing = true;
        let result = self
            .requestor
            .initiate(
                &transaction_id,
                &submission.personal_info,
                &submission.consent,
            )
            .await;

        match result {
            Ok(new_report_id) => {
                if let WizardState::Processing { report_id, .. } = &mut self.state {
                    *report_id = Some(new_report_id.clone());
                }
                self.start_polling(new_report_id).await;
                Ok(WizardStage::Processing)
            }
            Err(err) => {
                self.is_processing = false;
                Err(self.surface(err))
            }
        }
    }

    async fn start_polling(&mut self, report_id: ReportId) {
        if let Some(mut previous) = self.poll.take() {
            previous.stop().await;
        }
        self.poll = Some(self.poller.start(report_id));
    }

    async fn apply(&mut self, event: PollEvent) {
        if !matches!(self.state, WizardState::Processing { .. }) {
            return;
        }

        match event {
            PollEvent::Status(update) => {
                if let WizardState::Processing { status, .. } = &mut self.state {
                    *status = Some(update);
                }
            }
            PollEvent::Completed(report) => {
                self.close().await;
                let report_id = match &self.state {
                    WizardState::Processing {
                        report_id: Some(report_id),
                        ..
                    } => report_id.clone(),
                    _ => report.id.clone(),
                };
                info!(%report_id, score = report.score, "credit check wizard reached report");
                self.error = None;
                self.state = WizardState::Report { report_id, report };
            }
            PollEvent::Failed(err) => {
                self.close().await;
                self.surface(err);
            }
        }
    }

    /// The poll exited without a terminal event, typically because its task panicked.
    fn poll_lost(&mut self) {
        self.poll = None;
        if matches!(self.state, WizardState::Processing { .. }) && self.error.is_none() {
            warn!("status polling ended without a result");
            self.is_processing = false;
            self.surface(CreditCheckError::Poll(
                "status polling stopped unexpectedly".to_string(),
            ));
        }
    }

    fn surface(&mut self, err: CreditCheckError) -> CreditCheckError {
        let can_retry = !matches!(
            err.kind(),
            ErrorKind::Validation | ErrorKind::InvalidTransition
        );
        self.error = Some(WizardError {
            kind: err.kind(),
            message: err.to_string(),
            can_retry,
            cause: err.clone(),
        });
        err
    }

    fn invalid(&self, action: &'static str) -> CreditCheckError {
        CreditCheckError::InvalidTransition {
            stage: self.stage().label(),
            action,
        }
    }
}

/// Serializable snapshot of the wizard for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub stage: WizardStage,
    pub stage_label: &'static str,
    pub fee: String,
    pub is_processing: bool,
    pub polling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<ReportId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CreditCheckStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportSummaryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WizardError>,
}
