use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::gateway::{CreditBureau, PaymentGateway};
use super::wizard::WizardController;
use crate::config::CreditCheckConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("chk-{id:06}"))
}

pub type SharedWizard<P, B> = Arc<AsyncMutex<WizardController<P, B>>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("credit check session {0} not found")]
    NotFound(SessionId),
}

struct SessionEntry<P, B> {
    wizard: SharedWizard<P, B>,
    last_seen: Instant,
}

/// One wizard per applicant session, each behind its own async lock so that
/// operations on a session apply in the order they complete.
///
/// Sessions untouched for longer than `session_idle_timeout` are dropped by
/// `evict_idle`, which also stops any poll they still own.
pub struct CreditCheckSessions<P, B> {
    payments: Arc<P>,
    bureau: Arc<B>,
    config: CreditCheckConfig,
    sessions: Mutex<HashMap<SessionId, SessionEntry<P, B>>>,
}

impl<P, B> CreditCheckSessions<P, B>
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    pub fn new(payments: Arc<P>, bureau: Arc<B>, config: CreditCheckConfig) -> Self {
        Self {
            payments,
            bureau,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CreditCheckConfig {
        &self.config
    }

    pub fn create(&self) -> (SessionId, SharedWizard<P, B>) {
        let id = next_session_id();
        let wizard = Arc::new(AsyncMutex::new(WizardController::new(
            Arc::clone(&self.payments),
            Arc::clone(&self.bureau),
            &self.config,
        )));

        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                SessionEntry {
                    wizard: Arc::clone(&wizard),
                    last_seen: Instant::now(),
                },
            );
        info!(session_id = %id, "credit check session opened");
        (id, wizard)
    }

    /// Look up a session and mark it as recently used.
    pub fn get(&self, id: &SessionId) -> Result<SharedWizard<P, B>, SessionError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        entry.last_seen = Instant::now();
        Ok(Arc::clone(&entry.wizard))
    }

    /// Remove the session and stop its poll, if any.
    pub async fn close(&self, id: &SessionId) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;

        entry.wizard.lock().await.close().await;
        info!(session_id = %id, "credit check session closed");
        Ok(())
    }

    /// Drop every session idle for longer than the configured timeout.
    /// Returns how many were removed.
    pub async fn evict_idle(&self) -> usize {
        let cutoff = self.config.session_idle_timeout;
        let expired: Vec<(SessionId, SharedWizard<P, B>)> = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, entry)| entry.last_seen.elapsed() >= cutoff)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry.wizard)))
                .collect()
        };

        for (id, wizard) in &expired {
            wizard.lock().await.close().await;
            info!(session_id = %id, "idle credit check session evicted");
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run `evict_idle` every `every` until the returned task is aborted.
pub fn spawn_idle_sweeper<P, B>(
    sessions: Arc<CreditCheckSessions<P, B>>,
    every: Duration,
) -> JoinHandle<()>
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle().await;
            debug!(evicted, remaining = sessions.len(), "session sweep finished");
        }
    })
}
