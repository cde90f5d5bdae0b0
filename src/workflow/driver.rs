// Real-time driver: runs a FlightWorkflow inside one tokio task.
//
// Intents and timer wake-ups are serialized through a single select loop, so no
// two transitions ever run concurrently. A snapshot is published after each one.

use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use super::engine::FlightWorkflow;
use super::types::{Intent, IntentOutcome, Stage, WorkflowSnapshot};

const INTENT_BUFFER: usize = 32;
const MIN_SPEED: f64 = 0.001;
const MAX_SPEED: f64 = 1_000_000.0;

type IntentRequest = (Intent, oneshot::Sender<IntentOutcome>);

/// Presentation-side handle to a running workflow
#[derive(Debug)]
pub struct WorkflowHandle {
    intents: mpsc::Sender<IntentRequest>,
    snapshots: watch::Receiver<WorkflowSnapshot>,
    task: JoinHandle<FlightWorkflow>,
}

impl WorkflowHandle {
    /// Spawn `workflow` on the current runtime. `speed` scales the workflow
    /// clock against wall time: 2.0 runs every delay twice as fast.
    /// Speeds are clamped to `MIN_SPEED..=MAX_SPEED`; NaN runs at `MIN_SPEED`.
    pub fn spawn(workflow: FlightWorkflow, speed: f64) -> Self {
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(workflow.snapshot());
        let task = tokio::spawn(run(workflow, intent_rx, snapshot_tx, clamp_speed(speed)));

        Self {
            intents: intent_tx,
            snapshots: snapshot_rx,
            task,
        }
    }

    /// Forward an intent and wait for the core's answer
    pub async fn send(&self, intent: Intent) -> Result<IntentOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.intents
            .send((intent, reply_tx))
            .await
            .map_err(|_| anyhow!("Workflow task has stopped"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("Workflow task dropped the intent"))
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until the workflow reaches `stage`
    pub async fn wait_for_stage(&mut self, stage: Stage) -> Result<WorkflowSnapshot> {
        let snapshot = self
            .snapshots
            .wait_for(|snapshot| snapshot.stage == stage)
            .await
            .map_err(|_| anyhow!("Workflow task stopped before reaching {stage}"))?;
        Ok(snapshot.clone())
    }

    /// Stop accepting intents and hand the workflow back
    pub async fn shutdown(self) -> Result<FlightWorkflow> {
        drop(self.intents);
        self.task
            .await
            .map_err(|e| anyhow!("Workflow task failed: {e}"))
    }
}

async fn run(
    mut workflow: FlightWorkflow,
    mut intents: mpsc::Receiver<IntentRequest>,
    snapshots: watch::Sender<WorkflowSnapshot>,
    speed: f64,
) -> FlightWorkflow {
    let origin = Instant::now();
    let base_ms = workflow.now_ms();
    let clock = |now: Instant| {
        base_ms.saturating_add((now.duration_since(origin).as_secs_f64() * 1000.0 * speed) as u64)
    };
    let wall_time = |due_ms: u64| {
        origin + Duration::from_secs_f64(due_ms.saturating_sub(base_ms) as f64 / 1000.0 / speed)
    };

    info!(speed, stage = %workflow.stage(), "Workflow driver started");

    loop {
        let next_due = workflow.next_due_ms();

        tokio::select! {
            request = intents.recv() => {
                let Some((intent, reply)) = request else {
                    break;
                };
                workflow.advance_to(clock(Instant::now()));
                let outcome = workflow.dispatch(intent);
                // Publish before replying so the requester sees the effect
                snapshots.send_replace(workflow.snapshot());
                // The requester may have given up waiting
                let _ = reply.send(outcome);
            }
            () = wait_until(next_due.map(wall_time)) => {
                // Woken for `due`, so fire it even if float rounding lags the clock
                let due = next_due.unwrap_or_default();
                let fired = workflow.advance_to(clock(Instant::now()).max(due));
                debug!(fired, "Timers fired");
                snapshots.send_replace(workflow.snapshot());
            }
        }
    }

    info!(stage = %workflow.stage(), "Workflow driver stopped");
    workflow
}

fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        MIN_SPEED
    } else {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
