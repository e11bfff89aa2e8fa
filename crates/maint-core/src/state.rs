//! System state consumed by confinement and composition
//!
//! - [`FeatureRegistry`]: answers "what is installed and at which version"
//! - [`SessionContext`]: explicit replacement for the process-wide upgrade
//!   marker, owned and mutated only by the orchestrator
//! - [`SystemState`]: the read-only snapshot view handed to scenarios

use crate::error::{ProbeError, VersionError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Dotted numeric version, e.g. `6.3.2`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(Vec<u64>);

impl Version {
    /// Parse a dotted version
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(VersionError::Empty);
        }
        input
            .split('.')
            .map(|component| {
                component
                    .parse::<u64>()
                    .map_err(|_| VersionError::InvalidComponent {
                        input: input.to_string(),
                        component: component.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Major and minor components, e.g. `6.3` for `6.3.2`
    #[must_use]
    pub fn minor_version(&self) -> String {
        self.0
            .iter()
            .take(2)
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Check the major.minor prefix against a label such as `6.3`
    #[inline]
    #[must_use]
    pub fn matches_minor(&self, minor: &str) -> bool {
        self.minor_version() == minor
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
            first = false;
        }
        Ok(())
    }
}

/// Result of probing an installed feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    /// Feature name
    pub name: String,
    /// Installed version, if the feature reports one
    pub version: Option<Version>,
}

impl FeatureInfo {
    /// Installed minor version, e.g. `6.3`
    #[inline]
    #[must_use]
    pub fn current_minor_version(&self) -> Option<String> {
        self.version.as_ref().map(Version::minor_version)
    }
}

/// Feature detection subsystem
///
/// `Ok(None)` means the feature is not installed; `Err` means the probe
/// itself failed.
pub trait FeatureRegistry: Send + Sync {
    /// Probe a feature by name
    fn probe(&self, name: &str) -> Result<Option<FeatureInfo>, ProbeError>;
}

#[derive(Debug, Clone)]
enum FeatureEntry {
    Installed(FeatureInfo),
    ProbeFails(String),
}

/// Map-backed feature registry for snapshots and tests
#[derive(Debug, Default)]
pub struct StaticFeatureRegistry {
    entries: IndexMap<String, FeatureEntry>,
    probes: AtomicUsize,
}

impl StaticFeatureRegistry {
    /// Create an empty registry (nothing installed)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a feature as installed at `version`
    #[must_use]
    pub fn with_feature(mut self, name: &str, version: Version) -> Self {
        self.insert(name, Some(version));
        self
    }

    /// Mark a feature as installed without a version
    #[must_use]
    pub fn with_unversioned_feature(mut self, name: &str) -> Self {
        self.insert(name, None);
        self
    }

    /// Make every probe of `name` fail
    #[must_use]
    pub fn with_failing_probe(mut self, name: &str, reason: &str) -> Self {
        self.entries
            .insert(name.to_string(), FeatureEntry::ProbeFails(reason.to_string()));
        self
    }

    /// Insert or replace an installed feature
    pub fn insert(&mut self, name: &str, version: Option<Version>) {
        self.entries.insert(
            name.to_string(),
            FeatureEntry::Installed(FeatureInfo {
                name: name.to_string(),
                version,
            }),
        );
    }

    /// Number of probes answered so far
    #[inline]
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }
}

impl FeatureRegistry for StaticFeatureRegistry {
    fn probe(&self, name: &str) -> Result<Option<FeatureInfo>, ProbeError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        match self.entries.get(name) {
            None => Ok(None),
            Some(FeatureEntry::Installed(info)) => Ok(Some(info.clone())),
            Some(FeatureEntry::ProbeFails(reason)) => Err(ProbeError::Failed {
                feature: name.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Cooperative cancellation flag, observed only between steps
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Create an untriggered handle
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation at the next step boundary
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session-wide state shared by every scenario of one maintenance run
///
/// The upgrade marker is set by the orchestrator when an upgrade begins and
/// cleared when it ends. Scenarios only ever read it.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    upgrade_in_progress: Option<String>,
    assume_yes: bool,
    cancel: CancelHandle,
}

impl SessionContext {
    /// Create a fresh session
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every operator confirmation with yes
    #[inline]
    #[must_use]
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    /// Start with an upgrade marker already set (resumed session)
    #[inline]
    #[must_use]
    pub fn with_upgrade_in_progress(mut self, version: impl Into<String>) -> Self {
        self.upgrade_in_progress = Some(version.into());
        self
    }

    /// Mark an upgrade to `version` as in progress
    pub fn begin_upgrade(&mut self, version: impl Into<String>) {
        let version = version.into();
        tracing::info!(version = %version, "upgrade marked in progress");
        self.upgrade_in_progress = Some(version);
    }

    /// Clear the upgrade marker
    pub fn finish_upgrade(&mut self) {
        if let Some(version) = self.upgrade_in_progress.take() {
            tracing::info!(version = %version, "upgrade marker cleared");
        }
    }

    /// Version of the upgrade currently in progress
    #[inline]
    #[must_use]
    pub fn upgrade_in_progress(&self) -> Option<&str> {
        self.upgrade_in_progress.as_deref()
    }

    /// Whether confirmations are auto-answered
    #[inline]
    #[must_use]
    pub fn assume_yes(&self) -> bool {
        self.assume_yes
    }

    /// Cancellation handle for this session
    #[inline]
    #[must_use]
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }
}

/// Read-only view of the live system handed to confinement and composition
#[derive(Clone, Copy)]
pub struct SystemState<'a> {
    /// Feature detection
    pub features: &'a dyn FeatureRegistry,
    /// Session state
    pub session: &'a SessionContext,
}

impl<'a> SystemState<'a> {
    /// Build a state view
    #[inline]
    #[must_use]
    pub fn new(features: &'a dyn FeatureRegistry, session: &'a SessionContext) -> Self {
        Self { features, session }
    }

    /// Probe a feature
    #[inline]
    pub fn feature(&self, name: &str) -> Result<Option<FeatureInfo>, ProbeError> {
        self.features.probe(name)
    }
}

impl fmt::Debug for SystemState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemState")
            .field("session", self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_and_displays() {
        let v = Version::parse("6.3.2").unwrap();
        assert_eq!(v.to_string(), "6.3.2");
        assert_eq!(v.minor_version(), "6.3");
        assert!(v.matches_minor("6.3"));
        assert!(!v.matches_minor("6.4"));
    }

    #[test]
    fn version_rejects_garbage() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        assert!(matches!(
            Version::parse("6.x"),
            Err(VersionError::InvalidComponent { component, .. }) if component == "x"
        ));
    }

    #[test]
    fn version_ordering_is_numeric() {
        assert!(Version::parse("6.10").unwrap() > Version::parse("6.9").unwrap());
    }

    #[test]
    fn static_registry_answers_probes() {
        let registry = StaticFeatureRegistry::new()
            .with_feature("satellite", Version::parse("6.3.1").unwrap())
            .with_unversioned_feature("foreman_proxy")
            .with_failing_probe("pulp", "rpm database locked");

        let sat = registry.probe("satellite").unwrap().unwrap();
        assert_eq!(sat.current_minor_version().as_deref(), Some("6.3"));
        assert_eq!(registry.probe("foreman_proxy").unwrap().unwrap().version, None);
        assert_eq!(registry.probe("katello").unwrap(), None);
        assert!(registry.probe("pulp").is_err());
        assert_eq!(registry.probe_count(), 4);
    }

    #[test]
    fn session_upgrade_marker_lifecycle() {
        let mut session = SessionContext::new();
        assert_eq!(session.upgrade_in_progress(), None);
        session.begin_upgrade("6.4");
        assert_eq!(session.upgrade_in_progress(), Some("6.4"));
        session.finish_upgrade();
        assert_eq!(session.upgrade_in_progress(), None);
    }

    #[test]
    fn cancel_handle_is_shared_between_clones() {
        let session = SessionContext::new();
        let handle = session.cancel_handle().clone();
        handle.cancel();
        assert!(session.cancel_handle().is_cancelled());
    }
}
