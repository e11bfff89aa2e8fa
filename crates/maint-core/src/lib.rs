//! Maint Core - scenario orchestration engine
//!
//! Lets a maintainer declare ordered pipelines of independently authored
//! steps, gate them behind confinement predicates, and run them with one of
//! two failure-propagation strategies:
//!
//! 1. **Declaration**: [`Metadata`] + a [`Scenario::compose`] procedure
//! 2. **Confinement**: evaluated once against a [`SystemState`] snapshot
//! 3. **Composition**: literal steps and [`StepRegistry`] queries, in order
//! 4. **Execution**: [`Runner`] under [`RunStrategy::FailFast`] or
//!    [`RunStrategy::FailSlow`], producing a [`ScenarioResult`]
//!
//! # Example
//!
//! ```rust,ignore
//! use maint_core::prelude::*;
//!
//! let features = StaticFeatureRegistry::new()
//!     .with_feature("satellite", Version::parse("6.3.2")?);
//! let session = SessionContext::new();
//! let state = SystemState::new(&features, &session);
//!
//! let result = Runner::unattended()
//!     .run(&PreMigrations::new(), &registry, state)
//!     .await?;
//! println!("{}", result.summary());
//! ```

pub mod catalog;
pub mod config;
pub mod confinement;
pub mod error;
pub mod metadata;
pub mod registry;
pub mod result;
pub mod runner;
pub mod scenario;
pub mod state;
pub mod state_machine;
pub mod step;
pub mod tag;

// Re-exports
pub use catalog::{ScenarioCatalog, ScenarioDescription};
pub use config::{EngineConfig, FeatureSnapshot, LogConfig, SystemSnapshot};
pub use confinement::{check_applicability, Applicability, Confinement};
pub use error::{
    CompositionError, ConfigError, EngineError, ProbeError, StepError, TagError,
    TransitionError, VersionError,
};
pub use metadata::{Metadata, MetadataBuilder, RunStrategy};
pub use registry::StepRegistry;
pub use result::{ScenarioResult, ScenarioStatus, StepRecord, StepState};
pub use runner::Runner;
pub use scenario::{compose, ComposedPlan, Composer, Scenario};
pub use state::{
    CancelHandle, FeatureInfo, FeatureRegistry, SessionContext, StaticFeatureRegistry,
    SystemState, Version,
};
pub use step::{
    Decision, FixedOperator, Operator, Precondition, Step, StepCategory, StepContext,
    StepHandle, StepMeta, StepResource, StepVerdict,
};
pub use tag::Tag;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for declaring and running scenarios
    pub use crate::{
        Composer, CompositionError, Confinement, Metadata, Runner, RunStrategy, Scenario,
        ScenarioResult, ScenarioStatus, SessionContext, StaticFeatureRegistry, Step,
        StepContext, StepError, StepHandle, StepMeta, StepRegistry, StepVerdict, SystemState,
        Tag, Version,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
