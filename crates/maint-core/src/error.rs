//! Error types for the scenario engine
//!
//! Provides the error taxonomy for:
//! - Step execution failures (always captured by the runner)
//! - Feature probe failures (confinement fails closed on these)
//! - Malformed tags and composition faults
//! - Outcome state machine violations
//! - Configuration loading

use crate::result::StepState;
use std::path::PathBuf;

/// Error returned by a step execution
///
/// None of these ever escape [`Runner::run`](crate::runner::Runner::run);
/// they are converted into a per-step outcome.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Explicit failed assertion raised by the step
    #[error("{0}")]
    Failed(String),

    /// Unexpected fault inside the step
    #[error("unexpected fault: {0}")]
    Fault(#[source] anyhow::Error),

    /// Operator chose to quit at a confirmation prompt
    #[error("aborted by operator")]
    Aborted,
}

impl StepError {
    /// Create an explicit failure
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wrap an unexpected fault
    #[inline]
    pub fn fault(err: impl Into<anyhow::Error>) -> Self {
        Self::Fault(err.into())
    }

    /// Check if the operator aborted
    #[inline]
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Feature probe errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The probe itself failed
    #[error("probe of feature `{feature}` failed: {reason}")]
    Failed {
        /// Feature name
        feature: String,
        /// Failure reason
        reason: String,
    },
}

/// Version parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// Empty version string
    #[error("empty version")]
    Empty,

    /// A component is not a number
    #[error("invalid version component `{component}` in `{input}`")]
    InvalidComponent {
        /// Full input
        input: String,
        /// Offending component
        component: String,
    },
}

/// Tag parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// Empty tag
    #[error("tag must not be empty")]
    Empty,

    /// Tag contains a character outside `[a-z0-9_]`
    #[error("invalid character {ch:?} in tag `{tag}`")]
    InvalidChar {
        /// Full tag
        tag: String,
        /// Offending character
        ch: char,
    },
}

/// Composition errors
///
/// Fatal to the scenario: reported before any step runs.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    /// A registry query used a malformed tag
    #[error("invalid registry tag: {0}")]
    InvalidTag(#[from] TagError),
}

/// Outcome state machine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition not allowed by the outcome state machine
    #[error("illegal step transition {from:?} -> {to:?}")]
    Illegal {
        /// Current state
        from: StepState,
        /// Requested state
        to: StepState,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A version in the snapshot is malformed
    #[error("invalid version for feature `{feature}`: {source}")]
    InvalidVersion {
        /// Feature name
        feature: String,
        /// Parse error
        source: VersionError,
    },
}

/// Main engine error type
///
/// Only composition-time and selection faults propagate as errors;
/// step-level faults are recovered into outcome state.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Composition failed before any step ran
    #[error("scenario `{label}` failed to compose: {source}")]
    Composition {
        /// Scenario label
        label: String,
        /// Underlying error
        source: CompositionError,
    },

    /// A scenario could not be built from its declaration
    #[error("scenario `{label}` has an invalid declaration: {source}")]
    InvalidScenario {
        /// Scenario label
        label: String,
        /// Underlying error
        source: TagError,
    },

    /// Scenario label registered twice
    #[error("duplicate scenario label: {0}")]
    DuplicateScenario(String),

    /// No scenario with that label
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// Outcome state machine violation (a runner bug)
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Check if the error happened before any step could run
    #[inline]
    #[must_use]
    pub fn is_pre_execution(&self) -> bool {
        !matches!(self, Self::Transition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_constructors() {
        assert!(matches!(StepError::failed("disk full"), StepError::Failed(m) if m == "disk full"));
        assert!(StepError::Aborted.is_abort());
        assert!(!StepError::fault(anyhow::anyhow!("boom")).is_abort());
    }

    #[test]
    fn composition_error_wraps_tag_error() {
        let err: CompositionError = TagError::Empty.into();
        assert_eq!(err.to_string(), "invalid registry tag: tag must not be empty");
    }

    #[test]
    fn engine_error_display_names_scenario() {
        let err = EngineError::Composition {
            label: "Migrations".into(),
            source: TagError::Empty.into(),
        };
        assert_eq!(
            err.to_string(),
            "scenario `Migrations` failed to compose: invalid registry tag: tag must not be empty"
        );
        assert!(err.is_pre_execution());
    }

    #[test]
    fn invalid_declaration_is_not_a_composition_error() {
        let err = EngineError::InvalidScenario {
            label: "migrations".into(),
            source: TagError::Empty,
        };
        assert_eq!(
            err.to_string(),
            "scenario `migrations` has an invalid declaration: tag must not be empty"
        );
        assert!(err.is_pre_execution());
    }
}
