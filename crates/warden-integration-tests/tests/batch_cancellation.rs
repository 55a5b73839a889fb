//! Cancellation semantics: user-cancel cascades, cancel_all, and abort
//! signals mid-execution.

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{make_scheduler, spawn_ui, SlowTool, TextTool};
use warden_core::{CompletedToolCall, ConfirmationOutcome, ToolCallRequest};
use warden_policy::PolicyEngine;
use warden_scheduler::{SchedulerConfig, SchedulerError};

fn allow_all_engine() -> PolicyEngine {
    let mut engine = PolicyEngine::new();
    engine.set_default_decision(warden_policy::PolicyDecision::Allow);
    engine
}

#[tokio::test]
async fn user_cancel_cascades_to_queued_calls() {
    let dir = TempDir::new().unwrap();
    let scheduler = make_scheduler(
        vec![Arc::new(TextTool::named("write_file"))],
        PolicyEngine::new(), // default decision: ask the user
        &dir,
        SchedulerConfig::default(),
    );
    let ui = spawn_ui(scheduler.bus(), vec![ConfirmationOutcome::Cancel]);

    let completed = scheduler
        .schedule(
            vec![
                ToolCallRequest::new("c1", "write_file", json!({"text": "a"})),
                ToolCallRequest::new("c2", "write_file", json!({"text": "b"})),
                ToolCallRequest::new("c3", "write_file", json!({"text": "c"})),
            ],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // One "no" answers for the whole batch.
    assert!(completed.iter().all(CompletedToolCall::is_cancelled));
    assert_eq!(ui.requests_seen(), 1);

    ui.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_all_rejects_queued_batches_and_aborts_active() {
    let dir = TempDir::new().unwrap();
    let scheduler = make_scheduler(
        vec![Arc::new(SlowTool {
            duration: Duration::from_secs(30),
        })],
        allow_all_engine(),
        &dir,
        SchedulerConfig::default(),
    );

    let active = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .schedule(
                    vec![ToolCallRequest::new("a1", "slow_tool", json!({}))],
                    CancellationToken::new(),
                )
                .await
        })
    };
    // Give the first batch time to become active, then queue a second.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let queued = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .schedule(
                    vec![ToolCallRequest::new("b1", "slow_tool", json!({}))],
                    CancellationToken::new(),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    scheduler.cancel_all();

    // The active batch settles with its in-flight call cancelled.
    let active = active.await.unwrap().unwrap();
    assert!(active[0].is_cancelled());

    // The queued batch is rejected outright.
    let queued = queued.await.unwrap();
    assert!(matches!(queued, Err(SchedulerError::Cancelled)));
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_token_cancels_in_flight_and_queued_calls() {
    let dir = TempDir::new().unwrap();
    let scheduler = make_scheduler(
        vec![Arc::new(SlowTool {
            duration: Duration::from_secs(30),
        })],
        allow_all_engine(),
        &dir,
        SchedulerConfig::default(),
    );

    let token = CancellationToken::new();
    let abort = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.cancel();
    });

    let completed = scheduler
        .schedule(
            vec![
                ToolCallRequest::new("c1", "slow_tool", json!({})),
                ToolCallRequest::new("c2", "slow_tool", json!({})),
            ],
            token,
        )
        .await
        .unwrap();

    assert_eq!(completed.len(), 2);
    assert!(completed.iter().all(CompletedToolCall::is_cancelled));
}

#[tokio::test]
async fn cancelled_batch_settles_exactly_once() {
    let dir = TempDir::new().unwrap();
    let scheduler = make_scheduler(
        vec![Arc::new(TextTool::named("write_file"))],
        PolicyEngine::new(),
        &dir,
        SchedulerConfig::default(),
    );
    let ui = spawn_ui(scheduler.bus(), vec![ConfirmationOutcome::Cancel]);

    // The future resolves once with the cancelled snapshots; a second
    // schedule on the same scheduler starts a fresh batch.
    let completed = scheduler
        .schedule(
            vec![ToolCallRequest::new("c1", "write_file", json!({"text": "x"}))],
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert!(completed[0].is_cancelled());

    let ui2_outcomes = vec![ConfirmationOutcome::ProceedOnce];
    ui.shutdown();
    let ui2 = spawn_ui(scheduler.bus(), ui2_outcomes);
    let completed = scheduler
        .schedule(
            vec![ToolCallRequest::new("c2", "write_file", json!({"text": "y"}))],
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(completed[0].is_success());

    ui2.shutdown();
}
