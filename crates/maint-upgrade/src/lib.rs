//! Satellite 6.4 upgrade definition
//!
//! Five scenarios cover one upgrade: pre-upgrade checks, pre-migrations,
//! migrations, post-migrations and post-upgrade checks. They share a single
//! confinement through [`upgrade_metadata`], delegate every system effect to
//! a [`HostActions`] implementation, and are chained by the
//! [`UpgradeOrchestrator`], which owns the session's upgrade marker.
//!
//! # Example
//!
//! ```no_run
//! use maint_core::{Runner, SessionContext, StaticFeatureRegistry, Version};
//! use maint_upgrade::{default_registry, DryRunHost, HostActions, UpgradeOrchestrator};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let host: Arc<dyn HostActions> = Arc::new(DryRunHost::new());
//! let orchestrator =
//!     UpgradeOrchestrator::new(&host, default_registry(&host)?, Runner::unattended())?;
//! let features = StaticFeatureRegistry::new().with_feature("satellite", Version::parse("6.3.1")?);
//! let mut session = SessionContext::new();
//! let report = orchestrator.run(&features, &mut session).await;
//! println!("{}", report.render_text());
//! # Ok(())
//! # }
//! ```

pub mod host;
pub mod orchestrator;
pub mod scenarios;
pub mod steps;

pub use host::{DryRunHost, HostAction, HostActions, HostError};
pub use orchestrator::{PhaseReport, UpgradeOrchestrator, UpgradePhase, UpgradeReport};
pub use scenarios::{
    upgrade_catalog, upgrade_metadata, Migrations, PostMigrations, PostUpgradeChecks,
    PreMigrations, PreUpgradeCheck, SOURCE_MINOR, TARGET_VERSION,
};
pub use steps::{
    default_registry, InstallerUpgrade, MaintenanceMode, PackagesUpdate, ProvideUpgradeGuide,
    RepositoriesSetup, ServiceStart, ServiceStop, ServicesUp, SyncPlans, UnlockVersions,
    ValidateRepositories, UPGRADE_GUIDE_URL,
};
