//! Confinement predicates
//!
//! A confinement decides whether a scenario applies to the current system.
//! It combines feature-registry probes with session flags and is evaluated
//! once, before composition. Evaluation is lazy: `All` stops at the first
//! false branch and `Any` at the first true one, so cheap session checks
//! placed first can spare expensive probes.
//!
//! A failing probe fails closed: the scenario is not applicable.

use crate::error::ProbeError;
use crate::state::SystemState;
use std::fmt;
use std::sync::Arc;

type PredicateFn = dyn Fn(&SystemState<'_>) -> Result<bool, ProbeError> + Send + Sync;

/// Boolean predicate over system state
#[derive(Clone)]
pub enum Confinement {
    /// Every branch holds
    All(Vec<Confinement>),
    /// At least one branch holds
    Any(Vec<Confinement>),
    /// Negation
    Not(Box<Confinement>),
    /// Feature is installed
    FeaturePresent(String),
    /// Feature is installed at a given major.minor version
    FeatureMinorVersion {
        /// Feature name
        feature: String,
        /// Expected minor version, e.g. `6.3`
        minor: String,
    },
    /// An upgrade to the given version is in progress
    UpgradeInProgress(String),
    /// Arbitrary predicate with a label for display
    Custom(String, Arc<PredicateFn>),
}

impl Confinement {
    /// Every branch holds
    #[inline]
    #[must_use]
    pub fn all(branches: impl IntoIterator<Item = Confinement>) -> Self {
        Self::All(branches.into_iter().collect())
    }

    /// At least one branch holds
    #[inline]
    #[must_use]
    pub fn any(branches: impl IntoIterator<Item = Confinement>) -> Self {
        Self::Any(branches.into_iter().collect())
    }

    /// Feature is installed
    #[inline]
    #[must_use]
    pub fn feature(name: impl Into<String>) -> Self {
        Self::FeaturePresent(name.into())
    }

    /// Feature is installed at `minor`
    #[inline]
    #[must_use]
    pub fn feature_minor_version(feature: impl Into<String>, minor: impl Into<String>) -> Self {
        Self::FeatureMinorVersion {
            feature: feature.into(),
            minor: minor.into(),
        }
    }

    /// An upgrade to `version` is in progress
    #[inline]
    #[must_use]
    pub fn upgrade_in_progress(version: impl Into<String>) -> Self {
        Self::UpgradeInProgress(version.into())
    }

    /// Arbitrary predicate
    #[must_use]
    pub fn custom<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SystemState<'_>) -> Result<bool, ProbeError> + Send + Sync + 'static,
    {
        Self::Custom(label.into(), Arc::new(predicate))
    }

    /// `self AND other`
    #[must_use]
    pub fn and(self, other: Confinement) -> Self {
        match self {
            Self::All(mut branches) => {
                branches.push(other);
                Self::All(branches)
            }
            this => Self::All(vec![this, other]),
        }
    }

    /// `self OR other`
    #[must_use]
    pub fn or(self, other: Confinement) -> Self {
        match self {
            Self::Any(mut branches) => {
                branches.push(other);
                Self::Any(branches)
            }
            this => Self::Any(vec![this, other]),
        }
    }

    /// Evaluate lazily against `state`
    pub fn evaluate(&self, state: &SystemState<'_>) -> Result<bool, ProbeError> {
        match self {
            Self::All(branches) => {
                for branch in branches {
                    if !branch.evaluate(state)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any(branches) => {
                for branch in branches {
                    if branch.evaluate(state)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(inner) => Ok(!inner.evaluate(state)?),
            Self::FeaturePresent(name) => Ok(state.feature(name)?.is_some()),
            Self::FeatureMinorVersion { feature, minor } => Ok(state
                .feature(feature)?
                .and_then(|info| info.current_minor_version())
                .is_some_and(|current| current == *minor)),
            Self::UpgradeInProgress(version) => {
                Ok(state.session.upgrade_in_progress() == Some(version.as_str()))
            }
            Self::Custom(_, predicate) => predicate(state),
        }
    }
}

impl std::ops::Not for Confinement {
    type Output = Confinement;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

impl fmt::Display for Confinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, branches: &[Confinement], op: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, branch) in branches.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{branch}")?;
            }
            f.write_str(")")
        }

        match self {
            Self::All(branches) => join(f, branches, "AND"),
            Self::Any(branches) => join(f, branches, "OR"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::FeaturePresent(name) => write!(f, "feature({name})"),
            Self::FeatureMinorVersion { feature, minor } => {
                write!(f, "feature({feature}).minor == {minor}")
            }
            Self::UpgradeInProgress(version) => write!(f, "upgrade_in_progress == {version}"),
            Self::Custom(label, _) => write!(f, "{label}"),
        }
    }
}

impl fmt::Debug for Confinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Confinement({self})")
    }
}

/// Outcome of a confinement check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    /// The scenario may run
    Applicable,
    /// The scenario must not run
    NotApplicable {
        /// Why
        reason: String,
    },
}

impl Applicability {
    /// Check if applicable
    #[inline]
    #[must_use]
    pub fn is_applicable(&self) -> bool {
        matches!(self, Self::Applicable)
    }
}

/// Decide applicability; no predicate means always applicable
pub fn check_applicability(
    confinement: Option<&Confinement>,
    state: &SystemState<'_>,
) -> Applicability {
    let Some(confinement) = confinement else {
        return Applicability::Applicable;
    };
    match confinement.evaluate(state) {
        Ok(true) => Applicability::Applicable,
        Ok(false) => Applicability::NotApplicable {
            reason: format!("confinement not satisfied: {confinement}"),
        },
        Err(err) => {
            tracing::warn!(error = %err, "confinement probe failed, scenario not applicable");
            Applicability::NotApplicable {
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SessionContext, StaticFeatureRegistry, Version};

    fn satellite(version: &str) -> StaticFeatureRegistry {
        StaticFeatureRegistry::new().with_feature("satellite", Version::parse(version).unwrap())
    }

    fn upgrade_confinement() -> Confinement {
        Confinement::feature("satellite").and(
            Confinement::feature_minor_version("satellite", "6.3")
                .or(Confinement::upgrade_in_progress("6.4")),
        )
    }

    #[test]
    fn matches_current_minor_version() {
        let features = satellite("6.3.5");
        let session = SessionContext::new();
        let state = SystemState::new(&features, &session);
        assert_eq!(upgrade_confinement().evaluate(&state), Ok(true));
    }

    #[test]
    fn matches_upgrade_in_progress_after_version_moved() {
        let features = satellite("6.4.0");
        let session = SessionContext::new().with_upgrade_in_progress("6.4");
        let state = SystemState::new(&features, &session);
        assert_eq!(upgrade_confinement().evaluate(&state), Ok(true));
    }

    #[test]
    fn rejects_other_versions() {
        let features = satellite("6.5");
        let session = SessionContext::new();
        let state = SystemState::new(&features, &session);
        assert_eq!(upgrade_confinement().evaluate(&state), Ok(false));
    }

    #[test]
    fn missing_feature_is_false_not_error() {
        let features = StaticFeatureRegistry::new();
        let session = SessionContext::new().with_upgrade_in_progress("6.4");
        let state = SystemState::new(&features, &session);
        assert_eq!(upgrade_confinement().evaluate(&state), Ok(false));
        assert_eq!(features.probe_count(), 1);
    }

    #[test]
    fn any_short_circuits_before_probe() {
        let features = satellite("6.3");
        let session = SessionContext::new().with_upgrade_in_progress("6.4");
        let state = SystemState::new(&features, &session);
        let predicate = Confinement::upgrade_in_progress("6.4")
            .or(Confinement::feature_minor_version("satellite", "6.3"));
        assert_eq!(predicate.evaluate(&state), Ok(true));
        assert_eq!(features.probe_count(), 0);
    }

    #[test]
    fn probe_failure_fails_closed() {
        let features = StaticFeatureRegistry::new().with_failing_probe("satellite", "rpm locked");
        let session = SessionContext::new();
        let state = SystemState::new(&features, &session);
        let applicability = check_applicability(Some(&upgrade_confinement()), &state);
        assert!(!applicability.is_applicable());
        assert!(matches!(
            applicability,
            Applicability::NotApplicable { reason } if reason.contains("rpm locked")
        ));
    }

    #[test]
    fn no_predicate_is_always_applicable() {
        let features = StaticFeatureRegistry::new();
        let session = SessionContext::new();
        let state = SystemState::new(&features, &session);
        assert!(check_applicability(None, &state).is_applicable());
    }

    #[test]
    fn not_and_custom() {
        let features = StaticFeatureRegistry::new();
        let session = SessionContext::new().with_assume_yes(true);
        let state = SystemState::new(&features, &session);
        let predicate = !Confinement::custom("assume_yes", |s| Ok(s.session.assume_yes()));
        assert_eq!(predicate.evaluate(&state), Ok(false));
    }

    #[test]
    fn display_renders_expression() {
        assert_eq!(
            upgrade_confinement().to_string(),
            "(feature(satellite) AND (feature(satellite).minor == 6.3 OR upgrade_in_progress == 6.4))"
        );
    }
}
