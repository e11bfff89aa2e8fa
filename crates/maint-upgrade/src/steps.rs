//! Checks and procedures used by the upgrade scenarios
//!
//! Each step is a thin wrapper over one [`HostAction`]; parameters are bound
//! when the step is built.

use crate::host::{HostAction, HostActions, HostError};
use maint_core::{
    Step, StepContext, StepError, StepMeta, StepRegistry, StepResource, StepVerdict, Tag, TagError,
};
use std::sync::Arc;

/// Upgrade guide for the 6.4 release
pub const UPGRADE_GUIDE_URL: &str =
    "https://access.redhat.com/documentation/en-us/red_hat_satellite/6.4/html/upgrading_and_updating_red_hat_satellite/";

/// Ask the operator before a mutating action; `Some` carries the skip verdict
fn declined(ctx: &StepContext<'_>, prompt: &str) -> Result<Option<StepVerdict>, StepError> {
    if ctx.confirm(prompt)? {
        Ok(None)
    } else {
        Ok(Some(StepVerdict::skipped("declined by operator")))
    }
}

impl From<HostError> for StepError {
    fn from(err: HostError) -> Self {
        StepError::failed(err.to_string())
    }
}

/// Maintenance mode held while a mutating step runs
pub struct MaintenanceMode {
    host: Arc<dyn HostActions>,
}

impl MaintenanceMode {
    /// Wrap a host
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>) -> Self {
        Self { host }
    }
}

#[async_trait::async_trait]
impl StepResource for MaintenanceMode {
    fn name(&self) -> &str {
        "maintenance-mode"
    }

    async fn acquire(&self) -> Result<(), StepError> {
        Ok(self.host.perform(HostAction::EnterMaintenance).await?)
    }

    async fn release(&self) -> Result<(), StepError> {
        Ok(self.host.perform(HostAction::LeaveMaintenance).await?)
    }
}

macro_rules! host_step {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name {
            meta: StepMeta,
            host: Arc<dyn HostActions>,
        }
    };
}

host_step!(
    /// Stop managed services
    ServiceStop
);

impl ServiceStop {
    /// Build the step
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>) -> Self {
        Self {
            meta: StepMeta::procedure("service-stop", "Stop applicable services"),
            host,
        }
    }
}

#[async_trait::async_trait]
impl Step for ServiceStop {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        if let Some(skip) = declined(ctx, "Stop services?")? {
            return Ok(skip);
        }
        self.host.perform(HostAction::StopServices).await?;
        Ok(StepVerdict::Success)
    }
}

host_step!(
    /// Start managed services
    ServiceStart
);

impl ServiceStart {
    /// Build the step
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>) -> Self {
        Self {
            meta: StepMeta::procedure("service-start", "Start applicable services"),
            host,
        }
    }
}

#[async_trait::async_trait]
impl Step for ServiceStart {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, _ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        self.host.perform(HostAction::StartServices).await?;
        Ok(StepVerdict::Success)
    }
}

host_step!(
    /// Point package repositories at the target version
    RepositoriesSetup
);

impl RepositoriesSetup {
    /// Build the step for `version`
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>, version: &str) -> Self {
        Self {
            meta: StepMeta::procedure(
                "repositories-setup",
                format!("Setup repositories for {version}"),
            )
            .with_param("version", version),
            host,
        }
    }
}

#[async_trait::async_trait]
impl Step for RepositoriesSetup {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, _ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        let version = self.meta.param("version").unwrap_or_default().to_string();
        self.host.perform(HostAction::SetupRepositories(version)).await?;
        Ok(StepVerdict::Success)
    }
}

host_step!(
    /// Drop package version locks
    UnlockVersions
);

impl UnlockVersions {
    /// Build the step
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>) -> Self {
        Self {
            meta: StepMeta::procedure("packages-unlock-versions", "Unlock packages"),
            host,
        }
    }
}

#[async_trait::async_trait]
impl Step for UnlockVersions {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, _ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        self.host.perform(HostAction::UnlockPackageVersions).await?;
        Ok(StepVerdict::Success)
    }
}

host_step!(
    /// Update packages; asks the operator unless `assumeyes` is bound
    PackagesUpdate
);

impl PackagesUpdate {
    /// Build the step
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>, assumeyes: bool) -> Self {
        Self {
            meta: StepMeta::procedure("packages-update", "Update packages")
                .with_param("assumeyes", assumeyes),
            host,
        }
    }

    fn assumeyes(&self) -> bool {
        self.meta.param("assumeyes") == Some("true")
    }
}

#[async_trait::async_trait]
impl Step for PackagesUpdate {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    fn resources(&self) -> Vec<Arc<dyn StepResource>> {
        vec![Arc::new(MaintenanceMode::new(self.host.clone()))]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        let assumeyes = self.assumeyes();
        if !assumeyes {
            if let Some(skip) = declined(ctx, "Update all packages?")? {
                return Ok(skip);
            }
        }
        self.host
            .perform(HostAction::UpdatePackages { assumeyes })
            .await?;
        Ok(StepVerdict::Success)
    }
}

host_step!(
    /// Run the installer in upgrade mode
    InstallerUpgrade
);

impl InstallerUpgrade {
    /// Build the step; it only runs after a successful package update
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>) -> Self {
        Self {
            meta: StepMeta::procedure("installer-upgrade", "Upgrade the installation")
                .requires("packages-update"),
            host,
        }
    }
}

#[async_trait::async_trait]
impl Step for InstallerUpgrade {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    fn resources(&self) -> Vec<Arc<dyn StepResource>> {
        vec![Arc::new(MaintenanceMode::new(self.host.clone()))]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        if let Some(skip) = declined(ctx, "Run the installer upgrade?")? {
            return Ok(skip);
        }
        self.host.perform(HostAction::InstallerUpgrade).await?;
        Ok(StepVerdict::Success)
    }
}

/// Point the operator at the upgrade guide
pub struct ProvideUpgradeGuide {
    meta: StepMeta,
}

impl ProvideUpgradeGuide {
    /// Build the check
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: StepMeta::check(
                "puppet-upgrade-guide",
                "Verify puppet and provide upgrade guide info",
            )
            .with_param("url", UPGRADE_GUIDE_URL),
        }
    }
}

impl Default for ProvideUpgradeGuide {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Step for ProvideUpgradeGuide {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, _ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        tracing::info!(url = UPGRADE_GUIDE_URL, "review the upgrade guide before continuing");
        Ok(StepVerdict::Success)
    }
}

host_step!(
    /// Verify repositories for the target version
    ValidateRepositories
);

impl ValidateRepositories {
    /// Build the check for `version`
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>, version: &str) -> Self {
        Self {
            meta: StepMeta::check(
                "repositories-validate",
                format!("Validate availability of repositories for {version}"),
            )
            .with_param("version", version),
            host,
        }
    }
}

#[async_trait::async_trait]
impl Step for ValidateRepositories {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, _ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        let version = self.meta.param("version").unwrap_or_default().to_string();
        self.host
            .perform(HostAction::ValidateRepositories(version))
            .await?;
        Ok(StepVerdict::Success)
    }
}

host_step!(
    /// Check that managed services are running
    ServicesUp
);

impl ServicesUp {
    /// Build the check
    #[must_use]
    pub fn new(host: Arc<dyn HostActions>) -> Self {
        Self {
            meta: StepMeta::check("services-up", "Check whether all services are running"),
            host,
        }
    }
}

#[async_trait::async_trait]
impl Step for ServicesUp {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, _ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        if self.host.services_running().await? {
            Ok(StepVerdict::Success)
        } else {
            Err(StepError::failed("not all services are running"))
        }
    }
}

/// Enable or disable sync plans around the migration
pub struct SyncPlans {
    meta: StepMeta,
    host: Arc<dyn HostActions>,
    enable: bool,
}

impl SyncPlans {
    /// Disable sync plans before migrating
    #[must_use]
    pub fn disable(host: Arc<dyn HostActions>) -> Self {
        Self {
            meta: StepMeta::procedure("sync-plans-disable", "Disable sync plans"),
            host,
            enable: false,
        }
    }

    /// Re-enable sync plans after migrating
    #[must_use]
    pub fn enable(host: Arc<dyn HostActions>) -> Self {
        Self {
            meta: StepMeta::procedure("sync-plans-enable", "Re-enable sync plans"),
            host,
            enable: true,
        }
    }
}

#[async_trait::async_trait]
impl Step for SyncPlans {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, _ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        self.host.perform(HostAction::SetSyncPlans(self.enable)).await?;
        Ok(StepVerdict::Success)
    }
}

/// Registry with the tagged steps shipped alongside the upgrade scenarios
///
/// # Errors
///
/// Returns [`TagError`] if a built-in tag is malformed.
pub fn default_registry(host: &Arc<dyn HostActions>) -> Result<StepRegistry, TagError> {
    Ok(StepRegistry::new()
        .with(Arc::new(ServicesUp::new(host.clone())), [Tag::new("default")?])
        .with(
            Arc::new(SyncPlans::disable(host.clone())),
            [Tag::new("pre_migrations")?],
        )
        .with(
            Arc::new(SyncPlans::enable(host.clone())),
            [Tag::new("post_migrations")?],
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DryRunHost;

    fn tag(name: &str) -> Tag {
        Tag::new(name).unwrap()
    }

    #[test]
    fn default_registry_buckets() {
        let host: Arc<dyn HostActions> = Arc::new(DryRunHost::new());
        let registry = default_registry(&host).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.find_checks(&tag("default")).len(), 1);
        assert_eq!(registry.find_procedures(&tag("pre_migrations")).len(), 1);
        assert_eq!(registry.find_procedures(&tag("post_migrations")).len(), 1);
        assert!(registry.find_checks(&tag("pre_upgrade")).is_empty());
    }

    #[test]
    fn parameters_are_bound_at_construction() {
        let host: Arc<dyn HostActions> = Arc::new(DryRunHost::new());
        let setup = RepositoriesSetup::new(host.clone(), "6.4");
        assert_eq!(setup.meta().param("version"), Some("6.4"));
        let update = PackagesUpdate::new(host.clone(), true);
        assert_eq!(update.meta().param("assumeyes"), Some("true"));
        assert_eq!(
            InstallerUpgrade::new(host).meta().requires,
            vec!["packages-update".to_string()]
        );
    }

    #[test]
    fn host_error_becomes_step_failure() {
        let err: StepError = HostError::CommandFailed {
            action: "stop-services".into(),
            reason: "timeout".into(),
        }
        .into();
        assert!(matches!(err, StepError::Failed(m) if m == "`stop-services` failed: timeout"));
    }
}
