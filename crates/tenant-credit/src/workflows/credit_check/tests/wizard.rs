use std::collections::BTreeMap;
use std::time::Duration;

use super::common::*;
use crate::workflows::credit_check::domain::{CheckState, ConsentField, PaymentResponse, ReportId};
use crate::workflows::credit_check::error::{CreditCheckError, ErrorKind, ValidationError};
use crate::workflows::credit_check::gateway::{BureauError, GatewayError};
use crate::workflows::credit_check::report::ReportSummaryView;
use crate::workflows::credit_check::wizard::{WizardController, WizardStage};

const EMAIL: &str = "maya.tremblay@example.ca";

async fn paid_wizard(
    bureau: ScriptedBureau,
) -> (
    WizardController<ScriptedGateway, ScriptedBureau>,
    std::sync::Arc<ScriptedBureau>,
) {
    let (mut wizard, _, bureau) = build_wizard(ScriptedGateway::approving(), bureau);
    wizard
        .submit_payment(EMAIL, BTreeMap::new())
        .await
        .expect("payment approved");
    (wizard, bureau)
}

#[tokio::test(start_paused = true)]
async fn happy_path_walks_every_stage() {
    let (mut wizard, gateway, bureau) =
        build_wizard(ScriptedGateway::approving(), ScriptedBureau::default());
    assert_eq!(wizard.stage(), WizardStage::Payment);
    assert_eq!(wizard.view().fee, "$90.00 CAD");

    let stage = wizard
        .submit_payment(EMAIL, BTreeMap::new())
        .await
        .expect("payment approved");
    assert_eq!(stage, WizardStage::PersonalInfo);
    assert_eq!(wizard.transaction_id().map(|id| id.0.as_str()), Some("txn-test-1"));
    assert_eq!(gateway.charges().len(), 1);

    let stage = wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");
    assert_eq!(stage, WizardStage::Processing);
    assert_eq!(wizard.report_id(), Some(&report_id()));
    assert!(wizard.is_processing());
    assert!(wizard.has_active_poll());
    assert_eq!(bureau.initiate_calls(), 1);

    let mut progress = Vec::new();
    while let Some(stage) = wizard.next_event().await {
        if stage == WizardStage::Processing {
            progress.push(wizard.status().map(|status| status.progress));
        }
    }

    assert_eq!(progress, vec![Some(0), Some(40), Some(80), Some(100)]);
    assert_eq!(wizard.stage(), WizardStage::Report);
    assert!(!wizard.is_processing());
    assert!(!wizard.has_active_poll());
    assert!(wizard.error().is_none());
    assert_eq!(bureau.retrieve_calls(), 1);
    assert_eq!(wizard.poller().active_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn report_survives_the_round_trip_unchanged() {
    let (mut wizard, _) = paid_wizard(ScriptedBureau::default()).await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");

    let report = wizard.run_to_completion().await.expect("report").clone();
    let expected = sample_report(report_id());
    assert_eq!(report, expected);

    let summary = ReportSummaryView::from(&report);
    assert_eq!(summary.score, 712);
    assert_eq!(summary.score_range, expected.score_range);
    assert_eq!(summary.account_count, 3);
    assert_eq!(summary.inquiry_count, 2);
    assert_eq!(summary.public_record_count, 0);

    let view = wizard.view();
    assert_eq!(view.stage, WizardStage::Report);
    assert_eq!(view.report, Some(summary));
}

#[tokio::test]
async fn declined_payment_keeps_the_applicant_on_payment() {
    let (mut wizard, gateway, bureau) = build_wizard(
        ScriptedGateway::with_responses(vec![Ok(PaymentResponse::declined("card declined"))]),
        ScriptedBureau::default(),
    );

    let err = wizard
        .submit_payment(EMAIL, BTreeMap::new())
        .await
        .expect_err("declined");

    assert_eq!(err, CreditCheckError::Payment("card declined".to_string()));
    assert_eq!(wizard.stage(), WizardStage::Payment);
    let overlay = wizard.error().expect("error overlay");
    assert_eq!(overlay.message, "card declined");
    assert_eq!(overlay.kind, ErrorKind::Payment);
    assert!(overlay.can_retry);
    assert!(!wizard.is_processing());
    assert_eq!(bureau.initiate_calls(), 0);

    let stage = wizard.retry().await.expect("second charge approved");
    assert_eq!(stage, WizardStage::PersonalInfo);
    assert!(wizard.error().is_none());
    let charges = gateway.charges();
    assert_eq!(charges.len(), 2);
    assert_eq!(charges[0], charges[1]);
}

#[tokio::test]
async fn gateway_outage_is_a_payment_error() {
    let (mut wizard, _, _) = build_wizard(
        ScriptedGateway::with_responses(vec![Err(GatewayError::Unavailable(
            "connection reset".to_string(),
        ))]),
        ScriptedBureau::default(),
    );

    let err = wizard
        .submit_payment(EMAIL, BTreeMap::new())
        .await
        .expect_err("gateway down");

    assert_eq!(err.kind(), ErrorKind::Payment);
    assert_eq!(wizard.stage(), WizardStage::Payment);
}

#[tokio::test]
async fn withheld_consent_is_rejected_without_a_bureau_call() {
    let (mut wizard, bureau) = paid_wizard(ScriptedBureau::default()).await;

    let mut consent = consent();
    consent.credit_check = false;
    let err = wizard
        .submit_personal_info(applicant(), consent)
        .await
        .expect_err("consent required");

    assert_eq!(
        err,
        CreditCheckError::Validation(ValidationError::MissingConsent(ConsentField::CreditCheck))
    );
    assert_eq!(wizard.stage(), WizardStage::PersonalInfo);
    assert_eq!(bureau.initiate_calls(), 0);
    let overlay = wizard.error().expect("error overlay");
    assert_eq!(overlay.kind, ErrorKind::Validation);
    assert!(!overlay.can_retry);
    assert!(!wizard.has_active_poll());

    wizard
        .submit_personal_info(applicant(), super::common::consent())
        .await
        .expect("corrected submission accepted");
    assert_eq!(bureau.initiate_calls(), 1);
    wizard.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_initiation_can_be_retried_with_the_same_details() {
    let (mut wizard, bureau) = paid_wizard(ScriptedBureau::default().with_initiations(vec![
        Err(BureauError::Unavailable("503".to_string())),
        Ok(ReportId("rpt-test-2".to_string())),
    ]))
    .await;

    let err = wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect_err("bureau down");

    assert_eq!(err.kind(), ErrorKind::Request);
    assert_eq!(wizard.stage(), WizardStage::Processing);
    assert!(wizard.report_id().is_none());
    assert!(!wizard.is_processing());
    assert!(!wizard.has_active_poll());
    assert!(wizard.error().is_some_and(|overlay| overlay.can_retry));

    let stage = wizard.retry().await.expect("second initiation");
    assert_eq!(stage, WizardStage::Processing);
    assert_eq!(wizard.report_id().map(|id| id.0.as_str()), Some("rpt-test-2"));
    assert!(wizard.has_active_poll());
    assert_eq!(
        bureau.submitted_names(),
        vec!["Maya Tremblay".to_string(), "Maya Tremblay".to_string()]
    );

    wizard.run_to_completion().await.expect("report");
    assert_eq!(wizard.stage(), WizardStage::Report);
}

#[tokio::test(start_paused = true)]
async fn poll_failure_stops_polling_until_retry() {
    let (mut wizard, bureau) = paid_wizard(ScriptedBureau::default().with_statuses(vec![
        StatusStep::Error("503".to_string()),
        StatusStep::Error("503".to_string()),
        StatusStep::Error("503".to_string()),
        StatusStep::Status(status(CheckState::Completed, 100)),
    ]))
    .await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");

    let err = wizard.run_to_completion().await.expect_err("poll gave up");
    assert_eq!(err.kind(), ErrorKind::Poll);
    assert_eq!(wizard.stage(), WizardStage::Processing);
    assert!(!wizard.has_active_poll());
    assert!(!wizard.is_processing());
    assert_eq!(wizard.poller().active_polls(), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(bureau.status_calls(), 3);

    wizard.retry().await.expect("polling restarted");
    wizard.run_to_completion().await.expect("report");
    assert_eq!(bureau.status_calls(), 4);
    assert_eq!(bureau.retrieve_calls(), 1);
    assert_eq!(bureau.initiate_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn crashed_poll_surfaces_a_retryable_error() {
    let (mut wizard, bureau) = paid_wizard(ScriptedBureau::default().with_statuses(vec![
        StatusStep::Status(status(CheckState::Processing, 20)),
        StatusStep::Crash,
        StatusStep::Status(status(CheckState::Completed, 100)),
    ]))
    .await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");

    let err = wizard.run_to_completion().await.expect_err("poll crashed");

    assert_eq!(err.kind(), ErrorKind::Poll);
    assert_eq!(wizard.stage(), WizardStage::Processing);
    assert!(!wizard.is_processing());
    assert!(!wizard.has_active_poll());
    assert_eq!(wizard.poller().active_polls(), 0);
    let overlay = wizard.error().expect("error shown");
    assert!(overlay.can_retry);
    assert_eq!(
        overlay.message,
        "unable to confirm credit check status: status polling stopped unexpectedly"
    );

    wizard.retry().await.expect("polling restarted");
    wizard.run_to_completion().await.expect("report");
    assert_eq!(bureau.status_calls(), 3);
    assert_eq!(bureau.initiate_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn sync_notices_a_crashed_poll() {
    let (mut wizard, _) = paid_wizard(
        ScriptedBureau::default().with_statuses(vec![StatusStep::Crash]),
    )
    .await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stage = wizard.sync().await;

    assert_eq!(stage, WizardStage::Processing);
    assert!(!wizard.has_active_poll());
    assert_eq!(
        wizard.error().map(|overlay| overlay.kind),
        Some(ErrorKind::Poll)
    );
}

#[tokio::test(start_paused = true)]
async fn retrieval_failure_is_retried_from_processing() {
    let (mut wizard, bureau) = paid_wizard(
        ScriptedBureau::default()
            .with_statuses(vec![StatusStep::Status(status(CheckState::Completed, 100))])
            .with_reports(vec![Err(BureauError::Unavailable("maintenance".to_string()))]),
    )
    .await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");

    let err = wizard.run_to_completion().await.expect_err("retrieval failed");
    assert_eq!(err.kind(), ErrorKind::Retrieval);
    assert_eq!(wizard.stage(), WizardStage::Processing);
    assert_eq!(
        wizard.error().map(|overlay| overlay.message.as_str()),
        Some("unable to retrieve credit report: credit bureau unavailable: maintenance")
    );

    wizard.retry().await.expect("polling restarted");
    wizard.run_to_completion().await.expect("report");
    assert_eq!(wizard.stage(), WizardStage::Report);
    assert_eq!(bureau.retrieve_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_replaces_the_running_poll() {
    let (mut wizard, bureau) = paid_wizard(
        ScriptedBureau::default()
            .with_statuses(vec![StatusStep::Status(status(CheckState::Processing, 60))]),
    )
    .await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");
    assert_eq!(wizard.poller().active_polls(), 1);

    wizard.refresh().await.expect("refreshed");
    wizard.refresh().await.expect("refreshed again");

    assert_eq!(wizard.poller().active_polls(), 1);
    assert!(wizard.has_active_poll());

    // A single live poll ticks once per interval.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let before = bureau.status_calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(bureau.status_calls() - before, 3);

    wizard.close().await;
    assert_eq!(wizard.poller().active_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn retry_refuses_while_a_poll_is_running() {
    let (mut wizard, _) = paid_wizard(
        ScriptedBureau::default()
            .with_statuses(vec![StatusStep::Status(status(CheckState::Processing, 60))]),
    )
    .await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");

    let err = wizard.retry().await.expect_err("nothing to retry");

    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(wizard.poller().active_polls(), 1);
    wizard.close().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_polling_and_returns_to_payment() {
    let (mut wizard, bureau) = paid_wizard(
        ScriptedBureau::default()
            .with_statuses(vec![StatusStep::Status(status(CheckState::Processing, 60))]),
    )
    .await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");
    assert!(wizard.next_event().await.is_some());

    let stage = wizard.cancel().await.expect("cancelled");
    let calls_at_cancel = bureau.status_calls();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(stage, WizardStage::Payment);
    assert!(wizard.transaction_id().is_none());
    assert!(!wizard.is_processing());
    assert_eq!(wizard.poller().active_polls(), 0);
    assert_eq!(bureau.status_calls(), calls_at_cancel);
    assert!(wizard.next_event().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_wizard_stops_its_poll() {
    let (mut wizard, bureau) = paid_wizard(
        ScriptedBureau::default()
            .with_statuses(vec![StatusStep::Status(status(CheckState::Processing, 60))]),
    )
    .await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");
    drop(wizard);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let calls_after_drop = bureau.status_calls();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(bureau.status_calls(), calls_after_drop);
}

#[tokio::test(start_paused = true)]
async fn sync_applies_events_that_already_arrived() {
    let (mut wizard, bureau) = paid_wizard(ScriptedBureau::default()).await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(wizard.stage(), WizardStage::Processing);

    let stage = wizard.sync().await;

    assert_eq!(stage, WizardStage::Report);
    assert_eq!(bureau.retrieve_calls(), 1);
    assert!(!wizard.has_active_poll());
}

#[tokio::test(start_paused = true)]
async fn finish_hands_back_the_report_and_resets() {
    let (mut wizard, _) = paid_wizard(ScriptedBureau::default()).await;
    wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect("check initiated");
    wizard.run_to_completion().await.expect("report");

    assert_eq!(
        wizard.cancel().await.expect_err("report is final").kind(),
        ErrorKind::InvalidTransition
    );

    let report = wizard.finish().expect("report handed back");
    assert_eq!(report.id, report_id());
    assert_eq!(wizard.stage(), WizardStage::Payment);
    assert!(wizard.report().is_none());
}

#[tokio::test]
async fn actions_out_of_order_are_rejected() {
    let (mut wizard, _, bureau) =
        build_wizard(ScriptedGateway::approving(), ScriptedBureau::default());

    let err = wizard
        .submit_personal_info(applicant(), consent())
        .await
        .expect_err("payment first");
    assert_eq!(
        err,
        CreditCheckError::InvalidTransition {
            stage: "payment",
            action: "submit personal info",
        }
    );
    assert_eq!(err.to_string(), "cannot submit personal info while on the payment step");
    assert!(wizard.finish().is_err());
    assert!(wizard.retry().await.is_err());
    assert!(wizard.refresh().await.is_err());
    assert_eq!(bureau.initiate_calls(), 0);

    wizard
        .submit_payment(EMAIL, BTreeMap::new())
        .await
        .expect("payment approved");
    assert!(wizard.submit_payment(EMAIL, BTreeMap::new()).await.is_err());
    assert_eq!(wizard.stage(), WizardStage::PersonalInfo);
}
