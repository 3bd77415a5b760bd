use std::string::FromUtf8Error;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::domain::{AccountType, CreditReport, InquiryKind, PaymentStatus, ReportId, ScoreRange};

/// Display-ready digest of a retrieved report. Score and range are passed
/// through exactly as the bureau returned them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummaryView {
    pub report_id: ReportId,
    pub score: u16,
    pub score_range: ScoreRange,
    pub score_range_label: &'static str,
    pub account_count: usize,
    pub delinquent_account_count: usize,
    pub inquiry_count: usize,
    pub hard_inquiry_count: usize,
    pub public_record_count: usize,
    pub total_balance_cents: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revolving_utilization_percent: Option<u8>,
    pub positive_factors: Vec<String>,
    pub negative_factors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&CreditReport> for ReportSummaryView {
    fn from(report: &CreditReport) -> Self {
        let delinquent_account_count = report
            .accounts
            .iter()
            .filter(|account| {
                !matches!(
                    account.payment_status,
                    PaymentStatus::Current | PaymentStatus::Closed
                )
            })
            .count();

        Self {
            report_id: report.id.clone(),
            score: report.score,
            score_range: report.score_range,
            score_range_label: report.score_range.label(),
            account_count: report.accounts.len(),
            delinquent_account_count,
            inquiry_count: report.inquiries.len(),
            hard_inquiry_count: report
                .inquiries
                .iter()
                .filter(|inquiry| inquiry.kind == InquiryKind::Hard)
                .count(),
            public_record_count: report.public_records.len(),
            total_balance_cents: report
                .accounts
                .iter()
                .map(|account| account.balance_cents)
                .sum(),
            revolving_utilization_percent: revolving_utilization(report),
            positive_factors: report.factors.positive.clone(),
            negative_factors: report.factors.negative.clone(),
            created_at: report.created_at,
        }
    }
}

fn revolving_utilization(report: &CreditReport) -> Option<u8> {
    let (balance, limit) = report
        .accounts
        .iter()
        .filter(|account| {
            matches!(
                account.account_type,
                AccountType::CreditCard | AccountType::LineOfCredit
            ) && account.payment_status != PaymentStatus::Closed
        })
        .filter_map(|account| {
            account
                .credit_limit_cents
                .map(|limit| (account.balance_cents, limit))
        })
        .fold((0u64, 0u64), |(balance, limit), (b, l)| {
            (balance.saturating_add(b), limit.saturating_add(l))
        });

    if limit == 0 {
        return None;
    }

    let percent = (balance as f64 / limit as f64 * 100.0).round();
    Some(percent.clamp(0.0, 100.0) as u8)
}

#[derive(Debug, thiserror::Error)]
pub enum ReportExportError {
    #[error("failed to write csv row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv writer: {0}")]
    Flush(String),
    #[error("csv output was not valid utf-8: {0}")]
    Encoding(#[from] FromUtf8Error),
}

const ACCOUNT_HEADERS: [&str; 6] = [
    "creditor",
    "account_type",
    "balance",
    "credit_limit",
    "payment_status",
    "opened_on",
];

#[derive(Serialize)]
struct AccountRow<'a> {
    creditor: &'a str,
    account_type: AccountType,
    balance: String,
    credit_limit: Option<String>,
    payment_status: PaymentStatus,
    opened_on: NaiveDate,
}

/// Render the report's tradelines as CSV, one row per account.
pub fn export_accounts_csv(report: &CreditReport) -> Result<String, ReportExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(ACCOUNT_HEADERS)?;

    for account in &report.accounts {
        writer.serialize(AccountRow {
            creditor: &account.creditor,
            account_type: account.account_type,
            balance: format_cents(account.balance_cents),
            credit_limit: account.credit_limit_cents.map(format_cents),
            payment_status: account.payment_status,
            opened_on: account.opened_on,
        })?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ReportExportError::Flush(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

fn format_cents(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}
