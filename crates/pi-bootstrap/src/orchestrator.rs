//! Sequential step runner.
//!
//! Walks an ordered list of [`Step`]s. Each step is skipped when its
//! precondition already holds, otherwise executed and then polled until its
//! postcondition holds. The first failure aborts the run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::clock::{Clock, SystemClock};
use crate::context::{ResourceWarning, RunContext};
use crate::error::{BootstrapError, FailureKind, Result};
use crate::step::{Step, StepRecord, StepResult};
use crate::wait::{wait_until, WaitPolicy};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running {
        index: usize,
        step: String,
    },
    Succeeded,
    Failed {
        index: usize,
        step: String,
        kind: FailureKind,
        reason: String,
    },
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub host: String,
    pub started_at: String,
    pub records: Vec<StepRecord>,
    pub state: RunState,
    pub warnings: Vec<ResourceWarning>,
}

impl RunResult {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.state, RunState::Succeeded)
    }

    /// The failing step's name, kind and reason, if any.
    #[must_use]
    pub fn failure(&self) -> Option<(&str, FailureKind, &str)> {
        match &self.state {
            RunState::Failed {
                step, kind, reason, ..
            } => Some((step.as_str(), *kind, reason.as_str())),
            _ => None,
        }
    }

    /// Process exit code for this run.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.failure().map_or(0, |(_, kind, _)| kind.exit_code())
    }

    /// Number of steps that ran their action.
    #[must_use]
    pub fn executed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.result == StepResult::Success)
            .count()
    }
}

/// Runs step sequences with a shared clock, wait policy and cancellation token.
pub struct Orchestrator {
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    policy: WaitPolicy,
}

impl Orchestrator {
    #[must_use]
    pub fn new(policy: WaitPolicy) -> Self {
        Self {
            clock: Arc::new(SystemClock::new()),
            cancel: CancellationToken::new(),
            policy,
        }
    }

    /// Replace the clock (tests use [`crate::clock::ManualClock`]).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the run when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `steps` in order against `ctx`.
    ///
    /// Never returns an error: failures are recorded in the result and stop
    /// the run.
    pub async fn run(&self, ctx: &RunContext, steps: &[Box<dyn Step>]) -> RunResult {
        let span = info_span!("run", host = %ctx.hostname, steps = steps.len());
        self.run_inner(ctx, steps).instrument(span).await
    }

    async fn run_inner(&self, ctx: &RunContext, steps: &[Box<dyn Step>]) -> RunResult {
        let mut result = RunResult {
            host: ctx.hostname.clone(),
            started_at: chrono::Utc::now().to_rfc3339(),
            records: Vec::with_capacity(steps.len()),
            state: RunState::NotStarted,
            warnings: ctx.warnings.clone(),
        };
        debug!(state = ?result.state, "Run created");

        for (index, step) in steps.iter().enumerate() {
            let name = step.name();
            result.state = RunState::Running {
                index,
                step: name.to_string(),
            };
            debug!(state = ?result.state, "Transition");

            // Steps block the runtime; give the signal listener a turn.
            tokio::task::yield_now().await;

            let started = self.clock.now();
            let mut outcome = if self.cancel.is_cancelled() {
                Err(BootstrapError::Interrupted)
            } else {
                self.run_step(ctx, step.as_ref()).await
            };
            let duration = self.clock.now().saturating_sub(started);

            // A child killed by Ctrl-C surfaces as a command failure.
            if outcome.is_err() {
                tokio::task::yield_now().await;
                if self.cancel.is_cancelled() {
                    outcome = Err(BootstrapError::Interrupted);
                }
            }

            let step_result = match outcome {
                Ok(r) => r,
                Err(err) => StepResult::Failed {
                    kind: err.kind(),
                    reason: err.to_string(),
                },
            };
            log_outcome(name, &step_result, duration);

            let failed = match &step_result {
                StepResult::Failed { kind, reason } => Some((*kind, reason.clone())),
                _ => None,
            };
            result.records.push(StepRecord {
                name: name.to_string(),
                result: step_result,
                duration,
            });

            if let Some((kind, reason)) = failed {
                result.state = RunState::Failed {
                    index,
                    step: name.to_string(),
                    kind,
                    reason,
                };
                debug!(state = ?result.state, "Transition");
                return result;
            }
        }

        result.state = RunState::Succeeded;
        debug!(state = ?result.state, "Transition");
        result
    }

    async fn run_step(&self, ctx: &RunContext, step: &dyn Step) -> Result<StepResult> {
        if step.check_precondition(ctx)? {
            return Ok(StepResult::SkippedAlreadySatisfied);
        }

        debug!(step = step.name(), "Executing: {}", step.description());
        step.execute(ctx)?;

        wait_until(
            self.clock.as_ref(),
            &self.cancel,
            self.policy,
            step.name(),
            || step.check_postcondition(ctx),
        )
        .await?;
        Ok(StepResult::Success)
    }
}

fn log_outcome(step: &str, result: &StepResult, duration: Duration) {
    let duration_ms = duration.as_millis();
    match result {
        StepResult::Failed { kind, reason } => {
            error!(step, outcome = result.label(), duration_ms, %kind, reason = %reason, "Step failed");
        }
        _ => info!(step, outcome = result.label(), duration_ms, "Step finished"),
    }
}

/// Precondition state of one step, used by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PreconditionState {
    Satisfied,
    Pending,
    Error(String),
}

/// Evaluate every precondition without executing anything.
#[must_use]
pub fn evaluate_preconditions(
    ctx: &RunContext,
    steps: &[Box<dyn Step>],
) -> Vec<(&'static str, PreconditionState)> {
    steps
        .iter()
        .map(|step| {
            let state = match step.check_precondition(ctx) {
                Ok(true) => PreconditionState::Satisfied,
                Ok(false) => PreconditionState::Pending,
                Err(err) => PreconditionState::Error(err.to_string()),
            };
            (step.name(), state)
        })
        .collect()
}
