//! Testing utilities for the maint workspace
//!
//! Shared scripted steps, tracked resources, and system-state fixtures.

#![allow(missing_docs)]

use maint_core::{
    CompositionError, Composer, Metadata, Precondition, Scenario, SessionContext,
    StaticFeatureRegistry, Step, StepContext, StepError, StepHandle, StepMeta, StepResource, StepVerdict, Version,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared, ordered log of events (step runs, resource acquire/release)
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// What a [`ScriptedStep`] does when run
#[derive(Debug, Clone)]
pub enum Behaviour {
    Pass,
    Fail(String),
    Fault(String),
    Panic,
    SkipSelf(String),
    /// Ask the operator; skip on "no"
    Confirm(String),
}

/// Step whose outcome is scripted and whose runs are logged
pub struct ScriptedStep {
    meta: StepMeta,
    behaviour: Behaviour,
    log: EventLog,
    resources: Vec<Arc<dyn StepResource>>,
    panic_in_precondition: bool,
}

impl ScriptedStep {
    pub fn new(meta: StepMeta, behaviour: Behaviour, log: &EventLog) -> Self {
        Self {
            meta,
            behaviour,
            log: log.clone(),
            resources: Vec::new(),
            panic_in_precondition: false,
        }
    }

    pub fn passing(id: &str, log: &EventLog) -> Self {
        Self::new(StepMeta::procedure(id, id), Behaviour::Pass, log)
    }

    pub fn failing(id: &str, log: &EventLog) -> Self {
        Self::new(
            StepMeta::procedure(id, id),
            Behaviour::Fail(format!("{id} failed")),
            log,
        )
    }

    pub fn check(id: &str, behaviour: Behaviour, log: &EventLog) -> Self {
        Self::new(StepMeta::check(id, id), behaviour, log)
    }

    #[must_use]
    pub fn with_resource(mut self, resource: Arc<dyn StepResource>) -> Self {
        self.resources.push(resource);
        self
    }

    /// Panic while evaluating the precondition
    #[must_use]
    pub fn panicking_precondition(mut self) -> Self {
        self.panic_in_precondition = true;
        self
    }

    pub fn handle(self) -> StepHandle {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl Step for ScriptedStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    fn precondition(&self, ctx: &StepContext<'_>) -> Precondition {
        assert!(
            !self.panic_in_precondition,
            "{} precondition exploded",
            self.meta.id
        );
        ctx.check_requirements(&self.meta)
    }

    fn resources(&self) -> Vec<Arc<dyn StepResource>> {
        self.resources.clone()
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
        self.log.push(format!("run:{}", self.meta.id));
        match &self.behaviour {
            Behaviour::Pass => Ok(StepVerdict::Success),
            Behaviour::Fail(message) => Err(StepError::failed(message.clone())),
            Behaviour::Fault(message) => Err(StepError::fault(anyhow::anyhow!(message.clone()))),
            Behaviour::Panic => panic!("{} panicked", self.meta.id),
            Behaviour::SkipSelf(reason) => Ok(StepVerdict::skipped(reason.clone())),
            Behaviour::Confirm(prompt) => {
                if ctx.confirm(prompt)? {
                    Ok(StepVerdict::Success)
                } else {
                    Ok(StepVerdict::skipped("declined by operator"))
                }
            }
        }
    }
}

/// Resource that logs acquire/release and can refuse acquisition
#[derive(Debug)]
pub struct TrackedResource {
    name: String,
    log: EventLog,
    fail_acquire: bool,
    fail_release: bool,
    panic_acquire: bool,
}

impl TrackedResource {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_acquire: false,
            fail_release: false,
            panic_acquire: false,
        }
    }

    #[must_use]
    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    #[must_use]
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    #[must_use]
    pub fn panicking_acquire(mut self) -> Self {
        self.panic_acquire = true;
        self
    }

    pub fn shared(self) -> Arc<dyn StepResource> {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl StepResource for TrackedResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> Result<(), StepError> {
        assert!(!self.panic_acquire, "{} acquire exploded", self.name);
        if self.fail_acquire {
            return Err(StepError::failed("resource busy"));
        }
        self.log.push(format!("acquire:{}", self.name));
        Ok(())
    }

    async fn release(&self) -> Result<(), StepError> {
        self.log.push(format!("release:{}", self.name));
        if self.fail_release {
            return Err(StepError::failed("release refused"));
        }
        Ok(())
    }
}

/// Scenario composed from a fixed list of step handles
pub struct FixedScenario {
    metadata: Metadata,
    steps: Vec<StepHandle>,
}

impl FixedScenario {
    pub fn new(metadata: Metadata, steps: Vec<StepHandle>) -> Self {
        Self { metadata, steps }
    }
}

impl Scenario for FixedScenario {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        composer.add_steps(self.steps.iter().cloned());
        Ok(())
    }
}

/// Feature registry with `satellite` installed at `version`
pub fn satellite_at(version: &str) -> StaticFeatureRegistry {
    StaticFeatureRegistry::new().with_feature(
        "satellite",
        Version::parse(version).expect("fixture version must parse"),
    )
}

/// Session with no upgrade in progress and confirmations auto-answered
pub fn unattended_session() -> SessionContext {
    SessionContext::new().with_assume_yes(true)
}
