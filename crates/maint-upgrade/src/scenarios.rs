//! The five 6.4 upgrade scenarios
//!
//! Every scenario shares [`upgrade_metadata`]: it only applies to a 6.3
//! installation, or to any installation while a 6.4 upgrade is in progress,
//! so a half-finished upgrade can be resumed after the version has moved.

use crate::host::HostActions;
use crate::steps::{
    InstallerUpgrade, PackagesUpdate, ProvideUpgradeGuide, RepositoriesSetup, ServiceStart,
    ServiceStop, UnlockVersions, ValidateRepositories,
};
use maint_core::{
    Composer, CompositionError, Confinement, EngineError, Metadata, MetadataBuilder, RunStrategy,
    Scenario, ScenarioCatalog, TagError,
};
use std::sync::Arc;

/// Version every scenario in this module upgrades to
pub const TARGET_VERSION: &str = "6.4";

/// Minor version an upgrade may start from
pub const SOURCE_MINOR: &str = "6.3";

const FEATURE: &str = "satellite";

/// Metadata shared by the upgrade scenarios
///
/// Tagged `upgrade_scenario`, targeting [`TARGET_VERSION`] and confined to
/// `satellite` at [`SOURCE_MINOR`] or an upgrade to [`TARGET_VERSION`] in
/// progress.
///
/// # Errors
///
/// Returns [`TagError`] if a tag is malformed.
pub fn upgrade_metadata(label: &str) -> Result<MetadataBuilder, TagError> {
    Ok(Metadata::builder(label)
        .tags(["upgrade_scenario"])?
        .target_version(TARGET_VERSION)
        .confine(
            Confinement::feature(FEATURE).and(
                Confinement::feature_minor_version(FEATURE, SOURCE_MINOR)
                    .or(Confinement::upgrade_in_progress(TARGET_VERSION)),
            ),
        ))
}

macro_rules! upgrade_scenario {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name {
            metadata: Metadata,
            host: Arc<dyn HostActions>,
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("label", &self.metadata.label())
                    .finish_non_exhaustive()
            }
        }
    };
}

upgrade_scenario!(
    /// Checks before upgrading
    PreUpgradeCheck
);

impl PreUpgradeCheck {
    /// Scenario label
    pub const LABEL: &'static str = "pre-upgrade-check";

    /// Build the scenario
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] if a tag is malformed.
    pub fn new(host: Arc<dyn HostActions>) -> Result<Self, TagError> {
        let metadata = upgrade_metadata(Self::LABEL)?
            .description(format!("Checks before upgrading to Satellite {TARGET_VERSION}"))
            .tags(["pre_upgrade_checks"])?
            .run_strategy(RunStrategy::FailSlow)
            .build();
        Ok(Self { metadata, host })
    }
}

impl Scenario for PreUpgradeCheck {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        let default = composer.find_checks("default")?;
        composer.add_steps(default);
        let pre_upgrade = composer.find_checks("pre_upgrade")?;
        composer.add_steps(pre_upgrade);
        composer
            .add_step(ProvideUpgradeGuide::new())
            .add_step(ValidateRepositories::new(self.host.clone(), TARGET_VERSION));
        Ok(())
    }
}

upgrade_scenario!(
    /// Procedures before migrating
    PreMigrations
);

impl PreMigrations {
    /// Scenario label
    pub const LABEL: &'static str = "pre-migrations";

    /// Build the scenario
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] if a tag is malformed.
    pub fn new(host: Arc<dyn HostActions>) -> Result<Self, TagError> {
        let metadata = upgrade_metadata(Self::LABEL)?
            .description(format!("Procedures before migrating to Satellite {TARGET_VERSION}"))
            .tags(["pre_migrations"])?
            .build();
        Ok(Self { metadata, host })
    }
}

impl Scenario for PreMigrations {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        let procedures = composer.find_procedures("pre_migrations")?;
        composer
            .add_steps(procedures)
            .add_step(ServiceStop::new(self.host.clone()));
        Ok(())
    }
}

upgrade_scenario!(
    /// Migration to the target version
    Migrations
);

impl Migrations {
    /// Scenario label
    pub const LABEL: &'static str = "migrations";

    /// Build the scenario
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] if a tag is malformed.
    pub fn new(host: Arc<dyn HostActions>) -> Result<Self, TagError> {
        let metadata = upgrade_metadata(Self::LABEL)?
            .description(format!("Migration scripts to Satellite {TARGET_VERSION}"))
            .tags(["migrations"])?
            .build();
        Ok(Self { metadata, host })
    }
}

impl Scenario for Migrations {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        composer
            .add_step(RepositoriesSetup::new(self.host.clone(), TARGET_VERSION))
            .add_step(UnlockVersions::new(self.host.clone()))
            .add_step(PackagesUpdate::new(self.host.clone(), true))
            .add_step(InstallerUpgrade::new(self.host.clone()));
        Ok(())
    }
}

upgrade_scenario!(
    /// Procedures after migrating
    PostMigrations
);

impl PostMigrations {
    /// Scenario label
    pub const LABEL: &'static str = "post-migrations";

    /// Build the scenario
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] if a tag is malformed.
    pub fn new(host: Arc<dyn HostActions>) -> Result<Self, TagError> {
        let metadata = upgrade_metadata(Self::LABEL)?
            .description(format!("Procedures after migrating to Satellite {TARGET_VERSION}"))
            .tags(["post_migrations"])?
            .build();
        Ok(Self { metadata, host })
    }
}

impl Scenario for PostMigrations {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        composer.add_step(ServiceStart::new(self.host.clone()));
        let procedures = composer.find_procedures("post_migrations")?;
        composer.add_steps(procedures);
        Ok(())
    }
}

upgrade_scenario!(
    /// Checks after upgrading
    PostUpgradeChecks
);

impl PostUpgradeChecks {
    /// Scenario label
    pub const LABEL: &'static str = "post-upgrade-checks";

    /// Build the scenario
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] if a tag is malformed.
    pub fn new(host: Arc<dyn HostActions>) -> Result<Self, TagError> {
        let metadata = upgrade_metadata(Self::LABEL)?
            .description(format!("Checks after upgrading to Satellite {TARGET_VERSION}"))
            .tags(["post_upgrade_checks"])?
            .run_strategy(RunStrategy::FailSlow)
            .build();
        Ok(Self { metadata, host })
    }
}

impl Scenario for PostUpgradeChecks {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        let default = composer.find_checks("default")?;
        composer.add_steps(default);
        let post_upgrade = composer.find_checks("post_upgrade")?;
        composer.add_steps(post_upgrade);
        Ok(())
    }
}

fn built<S: Scenario + 'static>(
    label: &str,
    scenario: Result<S, TagError>,
) -> Result<Arc<dyn Scenario>, EngineError> {
    match scenario {
        Ok(scenario) => Ok(Arc::new(scenario)),
        Err(source) => Err(EngineError::InvalidScenario {
            label: label.to_string(),
            source,
        }),
    }
}

/// Catalog holding the five upgrade scenarios in phase order
///
/// # Errors
///
/// Returns [`EngineError`] if a scenario cannot be built or labels collide.
pub fn upgrade_catalog(host: &Arc<dyn HostActions>) -> Result<ScenarioCatalog, EngineError> {
    let scenarios = [
        built(PreUpgradeCheck::LABEL, PreUpgradeCheck::new(host.clone()))?,
        built(PreMigrations::LABEL, PreMigrations::new(host.clone()))?,
        built(Migrations::LABEL, Migrations::new(host.clone()))?,
        built(PostMigrations::LABEL, PostMigrations::new(host.clone()))?,
        built(PostUpgradeChecks::LABEL, PostUpgradeChecks::new(host.clone()))?,
    ];
    let mut catalog = ScenarioCatalog::new();
    for scenario in scenarios {
        catalog.register(scenario)?;
    }
    Ok(catalog)
}
