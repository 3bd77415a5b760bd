use chrono::{NaiveDate, Utc};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tenant_credit::config::CreditCheckConfig;
use tenant_credit::error::AppError;
use tenant_credit::workflows::credit_check::simulated::{
    SimulatedCreditBureau, SimulatedPaymentGateway, DECLINED_CARD_TOKEN,
};
use tenant_credit::workflows::credit_check::{
    export_accounts_csv, Address, ConsentInfo, CreditReport, PersonalInfo, PollConfig,
    ReportSummaryView, WizardController, WizardStage,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Applicant first name
    #[arg(long, default_value = "Jordan")]
    pub(crate) first_name: String,
    /// Applicant last name
    #[arg(long, default_value = "Okafor")]
    pub(crate) last_name: String,
    /// Applicant date of birth (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date, default_value = "1990-05-17")]
    pub(crate) date_of_birth: NaiveDate,
    /// Applicant SSN; only the last four digits are ever printed
    #[arg(long, default_value = "046-454-286")]
    pub(crate) ssn: String,
    /// Email used for the payment receipt and the bureau request
    #[arg(long, default_value = "jordan.okafor@example.com")]
    pub(crate) email: String,
    /// Applicant phone number
    #[arg(long, default_value = "416-555-0147")]
    pub(crate) phone: String,
    /// Start with a card the processor declines to show the payment error path
    #[arg(long)]
    pub(crate) decline: bool,
    /// Write the report's accounts to this CSV file
    #[arg(long)]
    pub(crate) export: Option<PathBuf>,
    /// Status polling interval in milliseconds
    #[arg(long, default_value_t = 250)]
    pub(crate) poll_interval_ms: u64,
}

impl DemoArgs {
    fn personal_info(&self) -> PersonalInfo {
        PersonalInfo {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            date_of_birth: self.date_of_birth,
            ssn: self.ssn.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: Address {
                street: "221 King St E".to_string(),
                city: "Toronto".to_string(),
                province: "ON".to_string(),
                postal_code: "M5A 1J5".to_string(),
                country: "CA".to_string(),
            },
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let interval = Duration::from_millis(args.poll_interval_ms.max(1));
    let config = CreditCheckConfig {
        poll: PollConfig {
            interval,
            initial_backoff: interval,
            max_backoff: interval * 8,
            ..PollConfig::default()
        },
        ..CreditCheckConfig::default()
    };

    let mut wizard = WizardController::new(
        Arc::new(SimulatedPaymentGateway::new(Duration::from_millis(50))),
        Arc::new(SimulatedCreditBureau::default()),
        &config,
    );

    println!("Tenant credit check demo");
    println!("Step 1 of 4: {}", wizard.stage().label());
    println!("- Credit check fee: {}", wizard.fees().fee().display_amount());

    if args.decline {
        let mut metadata = BTreeMap::new();
        metadata.insert("card_token".to_string(), DECLINED_CARD_TOKEN.to_string());
        if let Err(err) = wizard.submit_payment(&args.email, metadata).await {
            println!("- Payment failed: {err}");
            if let Some(overlay) = wizard.error() {
                println!(
                    "- Still on the {} step (retry available: {})",
                    wizard.stage().label(),
                    if overlay.can_retry { "yes" } else { "no" }
                );
            }
            println!("- Trying again with a different card");
        }
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("card_token".to_string(), "tok_visa".to_string());
    wizard.submit_payment(&args.email, metadata).await?;
    if let Some(transaction_id) = wizard.transaction_id() {
        println!("- Payment approved: {transaction_id}");
    }

    let personal_info = args.personal_info();
    println!("\nStep 2 of 4: {}", wizard.stage().label());
    println!(
        "- Applicant: {} | SSN {} | born {}",
        personal_info.full_name(),
        personal_info.masked_ssn(),
        personal_info.date_of_birth
    );
    let consent = ConsentInfo::granted(Utc::now());
    println!("- Consent recorded for credit check, terms of service and privacy policy");
    wizard.submit_personal_info(personal_info, consent).await?;

    println!("\nStep 3 of 4: {}", wizard.stage().label());
    if let Some(report_id) = wizard.report_id() {
        println!("- Bureau request accepted: {report_id}");
    }
    while let Some(stage) = wizard.next_event().await {
        if stage != WizardStage::Processing {
            break;
        }
        if let Some(error) = wizard.error() {
            println!("- Polling stopped: {}", error.message);
            break;
        }
        if let Some(status) = wizard.status() {
            println!("- Status: {} ({}%)", status.status.label(), status.progress);
        }
    }

    let report = wizard.run_to_completion().await?.clone();
    println!("\nStep 4 of 4: {}", wizard.stage().label());
    render_report(&report);

    if let Some(path) = args.export {
        let csv = export_accounts_csv(&report)?;
        std::fs::write(&path, csv)?;
        println!("\nAccounts exported to {}", path.display());
    }

    wizard.finish()?;
    Ok(())
}

fn render_report(report: &CreditReport) {
    let summary = ReportSummaryView::from(report);
    println!(
        "- Score {} ({}) | report {}",
        summary.score, summary.score_range_label, summary.report_id
    );
    println!(
        "- {} accounts ({} delinquent) | total balance ${}.{:02}",
        summary.account_count,
        summary.delinquent_account_count,
        summary.total_balance_cents / 100,
        summary.total_balance_cents % 100
    );
    if let Some(utilization) = summary.revolving_utilization_percent {
        println!("- Revolving utilization {utilization}%");
    }
    println!(
        "- {} inquiries ({} hard) | {} public records",
        summary.inquiry_count, summary.hard_inquiry_count, summary.public_record_count
    );

    if !summary.positive_factors.is_empty() {
        println!("Helping your score:");
        for factor in &summary.positive_factors {
            println!("  - {factor}");
        }
    }
    if !summary.negative_factors.is_empty() {
        println!("Hurting your score:");
        for factor in &summary.negative_factors {
            println!("  - {factor}");
        }
    }

    println!("Accounts:");
    for account in &report.accounts {
        println!(
            "  - {}: ${}.{:02} ({:?})",
            account.creditor,
            account.balance_cents / 100,
            account.balance_cents % 100,
            account.payment_status
        );
    }
}
