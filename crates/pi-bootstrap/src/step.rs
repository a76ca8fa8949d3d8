//! Step abstraction and per-step results.

use std::time::Duration;

use serde::Serialize;

use crate::context::RunContext;
use crate::error::{FailureKind, Result};

/// One idempotent unit of provisioning.
///
/// A step is skipped when [`Step::check_precondition`] reports its effect
/// already holds. Otherwise [`Step::execute`] runs and
/// [`Step::check_postcondition`] is polled until it holds or the readiness
/// ceiling passes.
pub trait Step: Send + Sync {
    /// Stable, unique name used in logs and results.
    fn name(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// True when the step's effect is already in place.
    ///
    /// # Errors
    ///
    /// Returns an error for faults that make the state unknowable.
    fn check_precondition(&self, ctx: &RunContext) -> Result<bool>;

    /// Perform the step's action.
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails.
    fn execute(&self, ctx: &RunContext) -> Result<()>;

    /// True once the step's effect is observable. Defaults to the
    /// precondition, which suits most steps.
    ///
    /// # Errors
    ///
    /// Returns an error for faults; "not yet" is `Ok(false)`.
    fn check_postcondition(&self, ctx: &RunContext) -> Result<bool> {
        self.check_precondition(ctx)
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepResult {
    Success,
    SkippedAlreadySatisfied,
    Failed { kind: FailureKind, reason: String },
}

impl StepResult {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label used as the `outcome` log field.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SkippedAlreadySatisfied => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for StepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::SkippedAlreadySatisfied => write!(f, "Skipped"),
            Self::Failed { kind, .. } => write!(f, "Failed({kind})"),
        }
    }
}

/// A step's name, result and how long it took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub result: StepResult,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}
