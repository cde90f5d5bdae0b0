// Tests for the real-time workflow driver
// Uses tokio's paused clock so timed transitions complete instantly and deterministically

use redwing::config::TimingConfig;
use redwing::variants::{builtin_variants, FIGHTER_UAV_G};
use redwing::workflow::{FlightPlanField, FlightWorkflow, Intent, IntentOutcome, Stage, WorkflowHandle};
use std::time::Duration;
use tokio::time::Instant;

fn fighter() -> FlightWorkflow {
    FlightWorkflow::new(
        FIGHTER_UAV_G,
        builtin_variants()[FIGHTER_UAV_G].clone(),
        TimingConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_intent_effect_is_visible_on_reply() {
    let handle = WorkflowHandle::spawn(fighter(), 1.0);

    let outcome = handle.send(Intent::Connect).await.unwrap();
    assert_eq!(outcome, IntentOutcome::Accepted);

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.stage, Stage::Connecting);
    assert!(snapshot.pending.is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connection_completes_after_delay() {
    let mut handle = WorkflowHandle::spawn(fighter(), 1.0);
    let start = Instant::now();

    handle.send(Intent::Connect).await.unwrap();
    let snapshot = handle.wait_for_stage(Stage::Connected).await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(2000));
    assert!(snapshot.clock_ms >= 2000);
    assert_eq!(snapshot.pending, None);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_speed_scales_wall_time() {
    let mut handle = WorkflowHandle::spawn(fighter(), 10.0);
    let start = Instant::now();

    handle.send(Intent::Connect).await.unwrap();
    handle.wait_for_stage(Stage::Connected).await.unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(2000));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_full_flight_through_driver() {
    let mut handle = WorkflowHandle::spawn(fighter(), 1.0);

    handle.send(Intent::Connect).await.unwrap();
    handle.wait_for_stage(Stage::Connected).await.unwrap();
    handle.send(Intent::ProceedToChecks).await.unwrap();
    handle.wait_for_stage(Stage::ChecksComplete).await.unwrap();
    handle.send(Intent::ProceedToDestination).await.unwrap();

    let profile = builtin_variants()[FIGHTER_UAV_G].clone();
    for field in FlightPlanField::ALL {
        let value = profile.options.candidates(field)[0].clone();
        let outcome = handle
            .send(Intent::SetFlightPlanField { field, value })
            .await
            .unwrap();
        assert!(outcome.is_accepted());
    }

    handle.send(Intent::ProceedToUpload).await.unwrap();
    handle.send(Intent::UploadMission).await.unwrap();
    handle.wait_for_stage(Stage::TakeoffReady).await.unwrap();
    handle.send(Intent::InitiateTakeoff).await.unwrap();

    let launched = handle.wait_for_stage(Stage::Launched).await.unwrap();
    let countdown = launched.countdown.unwrap();
    assert_eq!(countdown.seconds_remaining, 0);
    assert!(countdown.launched);

    let complete = handle.wait_for_stage(Stage::FlightComplete).await.unwrap();
    assert!(complete.is_terminal());

    let workflow = handle.shutdown().await.unwrap();
    assert_eq!(workflow.stage(), Stage::FlightComplete);
    assert_eq!(workflow.history().len(), Stage::ALL.len() - 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_mid_connection_cancels_timer() {
    let handle = WorkflowHandle::spawn(fighter(), 1.0);

    handle.send(Intent::Connect).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(handle.send(Intent::Reset).await.unwrap(), IntentOutcome::Accepted);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.stage, Stage::Idle);
    assert_eq!(snapshot.pending, None);

    let workflow = handle.shutdown().await.unwrap();
    let stages: Vec<(Stage, Stage)> = workflow
        .history()
        .iter()
        .map(|record| (record.from, record.to))
        .collect();
    assert_eq!(
        stages,
        vec![(Stage::Idle, Stage::Connecting), (Stage::Connecting, Stage::Idle)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_intent_is_reported_not_raised() {
    let handle = WorkflowHandle::spawn(fighter(), 1.0);

    let outcome = handle.send(Intent::InitiateTakeoff).await.unwrap();
    assert!(outcome.is_rejected());
    assert_eq!(handle.snapshot().stage, Stage::Idle);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_speed_keeps_driver_alive() {
    let mut workflow = fighter();
    workflow.advance(Duration::from_millis(10));

    let mut handle = WorkflowHandle::spawn(workflow, f64::INFINITY);
    assert_eq!(handle.send(Intent::Connect).await.unwrap(), IntentOutcome::Accepted);
    let snapshot = handle.wait_for_stage(Stage::Connected).await.unwrap();
    assert!(snapshot.clock_ms >= 2010);

    let workflow = handle.shutdown().await.unwrap();
    assert_eq!(workflow.stage(), Stage::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_nan_speed_still_serves_intents() {
    let handle = WorkflowHandle::spawn(fighter(), f64::NAN);
    assert_eq!(handle.send(Intent::Connect).await.unwrap(), IntentOutcome::Accepted);
    assert_eq!(handle.snapshot().stage, Stage::Connecting);
    handle.shutdown().await.unwrap();
}
