use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::domain::{CheckState, CreditCheckStatus, CreditReport, ReportId};
use super::error::CreditCheckError;
use super::gateway::CreditBureau;
use super::retriever::ReportRetriever;

const EVENT_BUFFER: usize = 16;

/// Lower bound on the gap between two status checks.
pub const MIN_TICK_SPACING: Duration = Duration::from_millis(100);

/// Timing policy for status polling.
///
/// Failed or timed-out ticks are retried with exponential backoff starting at
/// `initial_backoff` and capped at `max_backoff`. After `max_tick_failures`
/// consecutive failures the poll ends with a `Poll` error, as it does once
/// `max_wait` has elapsed without a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub tick_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_tick_failures: u32,
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            tick_timeout: Duration::from_secs(15),
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            max_tick_failures: 5,
            max_wait: Duration::from_secs(600),
        }
    }
}

impl PollConfig {
    /// Gap between two successful ticks, never below `MIN_TICK_SPACING`.
    pub fn tick_spacing(&self) -> Duration {
        self.interval.max(MIN_TICK_SPACING)
    }

    /// Delay before the next attempt after `failures` consecutive failed ticks.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
            .max(MIN_TICK_SPACING)
    }
}

/// Everything a running poll reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Status(CreditCheckStatus),
    Completed(CreditReport),
    Failed(CreditCheckError),
}

/// Spawns status polls and tracks how many are alive.
pub struct StatusPoller<B> {
    bureau: Arc<B>,
    retriever: ReportRetriever<B>,
    config: PollConfig,
    active: Arc<AtomicUsize>,
}

impl<B> StatusPoller<B>
where
    B: CreditBureau + 'static,
{
    pub fn new(bureau: Arc<B>, config: PollConfig) -> Self {
        let retriever = ReportRetriever::new(Arc::clone(&bureau));
        Self {
            bureau,
            retriever,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn retriever(&self) -> &ReportRetriever<B> {
        &self.retriever
    }

    /// Number of poll tasks that have not yet finished or been stopped.
    pub fn active_polls(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Begin polling `report_id`. The returned handle owns the task.
    pub fn start(&self, report_id: ReportId) -> PollHandle {
        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let task = PollTask {
            report_id: report_id.clone(),
            bureau: Arc::clone(&self.bureau),
            retriever: self.retriever.clone(),
            config: self.config.clone(),
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActivePollGuard(Arc::clone(&self.active));
        let join = tokio::spawn(async move {
            let _guard = guard;
            task.run(sender).await;
        });

        info!(%report_id, "status polling started");
        PollHandle {
            report_id,
            events,
            task: Some(join),
            ended: false,
        }
    }
}

/// Ownership token for one running poll.
///
/// Dropping the handle aborts the task. `stop` additionally waits for the task
/// to wind down and discards anything still buffered.
#[derive(Debug)]
pub struct PollHandle {
    report_id: ReportId,
    events: mpsc::Receiver<PollEvent>,
    task: Option<JoinHandle<()>>,
    ended: bool,
}

impl PollHandle {
    pub fn report_id(&self) -> &ReportId {
        &self.report_id
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_none()
    }

    /// True once the task has exited and every event it sent has been read.
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Next event, or `None` once the poll has ended or been stopped.
    pub async fn next(&mut self) -> Option<PollEvent> {
        if self.task.is_none() {
            return None;
        }
        let event = self.events.recv().await;
        self.ended = event.is_none();
        event
    }

    /// Next event if one is already buffered.
    pub fn try_next(&mut self) -> Option<PollEvent> {
        if self.task.is_none() {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.ended = true;
                None
            }
        }
    }

    /// Idempotent: stopping an already stopped handle does nothing.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        task.abort();
        if let Err(err) = task.await {
            if err.is_panic() {
                warn!(report_id = %self.report_id, "status polling task panicked");
            }
        }
        self.events.close();
        while self.events.try_recv().is_ok() {}
        debug!(report_id = %self.report_id, "status polling stopped");
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct ActivePollGuard(Arc<AtomicUsize>);

impl Drop for ActivePollGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PollTask<B> {
    report_id: ReportId,
    bureau: Arc<B>,
    retriever: ReportRetriever<B>,
    config: PollConfig,
}

impl<B> PollTask<B>
where
    B: CreditBureau + 'static,
{
    async fn run(self, events: mpsc::Sender<PollEvent>) {
        let deadline = Instant::now() + self.config.max_wait;
        let mut next_tick = Instant::now();
        let mut failures: u32 = 0;

        loop {
            time::sleep_until(next_tick.min(deadline)).await;
            if Instant::now() >= deadline {
                warn!(report_id = %self.report_id, "credit check did not finish in time");
                let reason = format!(
                    "no result from the credit bureau after {} seconds",
                    self.config.max_wait.as_secs()
                );
                let _ = events
                    .send(PollEvent::Failed(CreditCheckError::Poll(reason)))
                    .await;
                return;
            }

            match self.tick().await {
                Ok(status) => {
                    failures = 0;
                    debug!(
                        report_id = %self.report_id,
                        status = status.status.label(),
                        progress = status.progress,
                        "credit check status"
                    );

                    let state = status.status;
                    if events.send(PollEvent::Status(status)).await.is_err() {
                        return;
                    }

                    match state {
                        CheckState::Completed => {
                            let event = match self.retriever.fetch(&self.report_id).await {
                                Ok(report) => PollEvent::Completed(report),
                                Err(err) => PollEvent::Failed(err),
                            };
                            let _ = events.send(event).await;
                            return;
                        }
                        CheckState::Failed => {
                            let err = CreditCheckError::Poll(
                                "the credit bureau could not complete the check".to_string(),
                            );
                            let _ = events.send(PollEvent::Failed(err)).await;
                            return;
                        }
                        CheckState::Pending | CheckState::Processing => {
                            next_tick = Instant::now() + self.config.tick_spacing();
                        }
                    }
                }
                Err(reason) => {
                    failures += 1;
                    if failures >= self.config.max_tick_failures {
                        warn!(
                            report_id = %self.report_id,
                            failures,
                            %reason,
                            "giving up on status polling"
                        );
                        let _ = events
                            .send(PollEvent::Failed(CreditCheckError::Poll(reason)))
                            .await;
                        return;
                    }

                    let delay = self.config.backoff_for(failures);
                    warn!(
                        report_id = %self.report_id,
                        failures,
                        retry_in_ms = delay.as_millis() as u64,
                        %reason,
                        "status check failed"
                    );
                    next_tick = Instant::now() + delay;
                }
            }
        }
    }

    async fn tick(&self) -> Result<CreditCheckStatus, String> {
        match time::timeout(
            self.config.tick_timeout,
            self.bureau.check_status(&self.report_id),
        )
        .await
        {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "status check timed out after {} seconds",
                self.config.tick_timeout.as_secs()
            )),
        }
    }
}
