use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tenant_credit::config::CreditCheckConfig;
use tenant_credit::workflows::credit_check::simulated::{
    SimulatedCreditBureau, SimulatedPaymentGateway,
};
use tenant_credit::workflows::credit_check::{CreditCheckFee, CreditCheckSessions};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) fee: CreditCheckFee,
}

pub(crate) type SimulatedSessions =
    CreditCheckSessions<SimulatedPaymentGateway, SimulatedCreditBureau>;

/// Session registry backed by the in-process payment processor and bureau.
pub(crate) fn simulated_sessions(config: &CreditCheckConfig) -> Arc<SimulatedSessions> {
    Arc::new(CreditCheckSessions::new(
        Arc::new(SimulatedPaymentGateway::default()),
        Arc::new(SimulatedCreditBureau::default()),
        config.clone(),
    ))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
