//! Host actions
//!
//! The upgrade steps never touch the system directly. Every effect goes
//! through [`HostActions`], so the same scenarios drive a real host, a dry
//! run, or a test double.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;

/// Failure reported by the host
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// A host command failed
    #[error("`{action}` failed: {reason}")]
    CommandFailed {
        /// Action name
        action: String,
        /// Failure reason
        reason: String,
    },
}

/// One effect a step can ask of the host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostAction {
    /// Stop managed services
    StopServices,
    /// Start managed services
    StartServices,
    /// Query whether managed services run
    CheckServices,
    /// Point package repositories at a version
    SetupRepositories(String),
    /// Verify package repositories for a version
    ValidateRepositories(String),
    /// Drop package version locks
    UnlockPackageVersions,
    /// Update packages
    UpdatePackages {
        /// Non-interactive package manager
        assumeyes: bool,
    },
    /// Run the installer in upgrade mode
    InstallerUpgrade,
    /// Block external traffic for the duration of a step
    EnterMaintenance,
    /// Restore external traffic
    LeaveMaintenance,
    /// Enable or disable sync plans
    SetSyncPlans(bool),
}

impl HostAction {
    /// Stable name, used for logs and failure injection
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StopServices => "stop-services",
            Self::StartServices => "start-services",
            Self::CheckServices => "check-services",
            Self::SetupRepositories(_) => "setup-repositories",
            Self::ValidateRepositories(_) => "validate-repositories",
            Self::UnlockPackageVersions => "unlock-package-versions",
            Self::UpdatePackages { .. } => "update-packages",
            Self::InstallerUpgrade => "installer-upgrade",
            Self::EnterMaintenance => "enter-maintenance",
            Self::LeaveMaintenance => "leave-maintenance",
            Self::SetSyncPlans(_) => "set-sync-plans",
        }
    }
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetupRepositories(version) | Self::ValidateRepositories(version) => {
                write!(f, "{} {version}", self.name())
            }
            Self::UpdatePackages { assumeyes } => {
                write!(f, "{} assumeyes={assumeyes}", self.name())
            }
            Self::SetSyncPlans(enabled) => write!(f, "{} enabled={enabled}", self.name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Effects available to upgrade steps
#[async_trait::async_trait]
pub trait HostActions: Send + Sync {
    /// Perform an action
    async fn perform(&self, action: HostAction) -> Result<(), HostError>;

    /// Whether all managed services are running
    async fn services_running(&self) -> Result<bool, HostError>;
}

/// Host that logs and records actions instead of performing them
///
/// Failures can be injected per action name.
#[derive(Debug, Default)]
pub struct DryRunHost {
    performed: Mutex<Vec<HostAction>>,
    failing: HashSet<&'static str>,
    services_down: bool,
}

impl DryRunHost {
    /// New dry-run host where everything succeeds
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every action named `name` fail
    #[must_use]
    pub fn failing(mut self, name: &'static str) -> Self {
        self.failing.insert(name);
        self
    }

    /// Report services as not running
    #[must_use]
    pub fn with_services_down(mut self) -> Self {
        self.services_down = true;
        self
    }

    /// Actions performed so far, in order
    #[must_use]
    pub fn performed(&self) -> Vec<HostAction> {
        self.performed.lock().clone()
    }

    /// Names of performed actions, in order
    #[must_use]
    pub fn performed_names(&self) -> Vec<&'static str> {
        self.performed.lock().iter().map(HostAction::name).collect()
    }
}

#[async_trait::async_trait]
impl HostActions for DryRunHost {
    async fn perform(&self, action: HostAction) -> Result<(), HostError> {
        tracing::info!(action = %action, "dry run");
        let name = action.name();
        self.performed.lock().push(action);
        if self.failing.contains(name) {
            return Err(HostError::CommandFailed {
                action: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    async fn services_running(&self) -> Result<bool, HostError> {
        self.performed.lock().push(HostAction::CheckServices);
        if self.failing.contains(HostAction::CheckServices.name()) {
            return Err(HostError::CommandFailed {
                action: HostAction::CheckServices.name().to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(!self.services_down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_records_and_injects_failures() {
        let host = DryRunHost::new().failing("installer-upgrade");
        host.perform(HostAction::StopServices).await.unwrap();
        let err = host.perform(HostAction::InstallerUpgrade).await.unwrap_err();
        assert_eq!(err.to_string(), "`installer-upgrade` failed: injected failure");
        assert_eq!(host.performed_names(), vec!["stop-services", "installer-upgrade"]);
    }

    #[tokio::test]
    async fn services_running_reflects_configuration() {
        assert!(DryRunHost::new().services_running().await.unwrap());
        assert!(!DryRunHost::new().with_services_down().services_running().await.unwrap());
    }

    #[test]
    fn action_display_includes_params() {
        assert_eq!(
            HostAction::SetupRepositories("6.4".into()).to_string(),
            "setup-repositories 6.4"
        );
        assert_eq!(
            HostAction::UpdatePackages { assumeyes: true }.to_string(),
            "update-packages assumeyes=true"
        );
    }
}
