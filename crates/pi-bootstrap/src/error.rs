//! Error taxonomy for bootstrap runs.
//!
//! Every fatal condition maps to a distinct process exit code so callers
//! (systemd units, CI jobs, operators) can tell a missing prerequisite from
//! a cluster that never became ready.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors that abort a bootstrap run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// A hard prerequisite (tool, memory or disk minimum) is not met.
    #[error("Prerequisite '{check}' not met: {detail}")]
    PrerequisiteFailed { check: String, detail: String },

    /// A resource the run cannot create on its own is absent.
    #[error("Required resource missing: {resource} ({detail})")]
    MissingRequiredResource { resource: String, detail: String },

    /// A postcondition did not hold before the readiness ceiling.
    #[error("Timed out waiting for '{step}' to become ready after {}s", elapsed.as_secs())]
    ReadinessTimeout { step: String, elapsed: Duration },

    /// A command or filesystem operation failed unexpectedly.
    #[error("{context}: {diagnostics}")]
    UnexpectedFault {
        context: String,
        diagnostics: String,
    },

    /// The operator aborted the run.
    #[error("Interrupted by operator")]
    Interrupted,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BootstrapError {
    /// Build an [`BootstrapError::UnexpectedFault`] from a context string and diagnostics.
    pub fn fault(context: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::UnexpectedFault {
            context: context.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Coarse classification used in step results and exit codes.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PrerequisiteFailed { .. } => FailureKind::PrerequisiteFailed,
            Self::MissingRequiredResource { .. } => FailureKind::MissingRequiredResource,
            Self::ReadinessTimeout { .. } => FailureKind::ReadinessTimeout,
            Self::UnexpectedFault { .. } => FailureKind::UnexpectedFault,
            Self::Interrupted => FailureKind::Interrupted,
            Self::Config(_) => FailureKind::Config,
        }
    }

    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

impl From<std::io::Error> for BootstrapError {
    fn from(err: std::io::Error) -> Self {
        Self::fault("I/O error", err.to_string())
    }
}

/// Failure classes, one per exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PrerequisiteFailed,
    MissingRequiredResource,
    ReadinessTimeout,
    UnexpectedFault,
    Interrupted,
    Config,
}

impl FailureKind {
    /// Exit code: 1 config, 2 prerequisite/missing resource, 3 timeout,
    /// 4 unexpected fault, 130 interrupted.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Config => 1,
            Self::PrerequisiteFailed | Self::MissingRequiredResource => 2,
            Self::ReadinessTimeout => 3,
            Self::UnexpectedFault => 4,
            Self::Interrupted => 130,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PrerequisiteFailed => "PrerequisiteFailed",
            Self::MissingRequiredResource => "MissingRequiredResource",
            Self::ReadinessTimeout => "ReadinessTimeout",
            Self::UnexpectedFault => "UnexpectedFault",
            Self::Interrupted => "Interrupted",
            Self::Config => "Config",
        };
        write!(f, "{s}")
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        let missing = BootstrapError::MissingRequiredResource {
            resource: "/dev/sda1".into(),
            detail: "not found".into(),
        };
        let timeout = BootstrapError::ReadinessTimeout {
            step: "wait-cluster-ready".into(),
            elapsed: Duration::from_secs(300),
        };
        let fault = BootstrapError::fault("kubectl apply", "forbidden");

        assert_eq!(missing.exit_code(), 2);
        assert_eq!(timeout.exit_code(), 3);
        assert_eq!(fault.exit_code(), 4);
        assert_eq!(BootstrapError::Interrupted.exit_code(), 130);
        assert_eq!(BootstrapError::Config("bad".into()).exit_code(), 1);
    }

    #[test]
    fn test_timeout_message_names_step_and_elapsed() {
        let err = BootstrapError::ReadinessTimeout {
            step: "wait-gitops-ready".into(),
            elapsed: Duration::from_secs(300),
        };
        let msg = err.to_string();
        assert!(msg.contains("wait-gitops-ready"));
        assert!(msg.contains("300s"));
    }
}
