//! Scenario runner
//!
//! Walks a composed plan strictly in order under the scenario's run
//! strategy. The runner:
//! - Checks confinement once, before composition
//! - Composes the plan exactly once per run
//! - Awaits each step to completion before starting the next
//! - Converts every step error, panic, or resource failure into a `Failed`
//!   outcome; nothing a step does escapes as an error
//! - Observes cancellation only at step boundaries

use crate::confinement::{check_applicability, Applicability};
use crate::error::{EngineError, StepError, TransitionError};
use crate::metadata::{Metadata, RunStrategy};
use crate::registry::StepRegistry;
use crate::result::{ScenarioResult, ScenarioStatus, StepRecord, StepState};
use crate::scenario::{compose, ComposedPlan, Scenario};
use crate::state::SystemState;
use crate::step::{
    Decision, FixedOperator, Operator, Precondition, Step, StepContext, StepResource, StepVerdict,
};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use ulid::Ulid;

/// Outcome of executing one step body inside its resource scope
struct StepExecution {
    result: Result<StepVerdict, StepError>,
    notes: Vec<String>,
    duration_ms: u64,
}

/// Sequential scenario runner
pub struct Runner {
    operator: Arc<dyn Operator>,
}

impl Runner {
    /// Create a runner that asks `operator` for confirmations
    #[inline]
    #[must_use]
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        Self { operator }
    }

    /// Runner whose operator answers yes to everything
    #[inline]
    #[must_use]
    pub fn unattended() -> Self {
        Self::new(Arc::new(FixedOperator(Decision::Yes)))
    }

    /// Run a scenario
    ///
    /// # Errors
    /// Returns `EngineError::Composition` if the plan cannot be composed;
    /// no step has run in that case. Step failures are reported inside the
    /// returned [`ScenarioResult`].
    pub async fn run(
        &self,
        scenario: &dyn Scenario,
        registry: &StepRegistry,
        state: SystemState<'_>,
    ) -> Result<ScenarioResult, EngineError> {
        let meta = scenario.metadata();
        let span = tracing::info_span!(
            "scenario",
            label = meta.label(),
            strategy = %meta.run_strategy()
        );

        async move {
            if let Applicability::NotApplicable { reason } =
                check_applicability(meta.confinement(), &state)
            {
                tracing::info!(%reason, "scenario not applicable");
                return Ok(ScenarioResult::not_applicable(
                    meta.label(),
                    meta.description(),
                    meta.run_strategy(),
                    reason,
                ));
            }

            let plan = compose(scenario, registry)?;
            self.execute(meta, &plan, state).await
        }
        .instrument(span)
        .await
    }

    /// Execute an already composed plan
    ///
    /// Confinement is not re-checked here.
    pub async fn execute(
        &self,
        meta: &Metadata,
        plan: &ComposedPlan,
        state: SystemState<'_>,
    ) -> Result<ScenarioResult, EngineError> {
        let strategy = meta.run_strategy();
        let started_at = Utc::now();
        let start = Instant::now();
        let total = plan.len();

        let mut records: Vec<StepRecord> = plan
            .steps()
            .iter()
            .enumerate()
            .map(|(i, step)| StepRecord::pending(i, &step.meta().id, &step.meta().description))
            .collect();
        let mut halted_at = None;
        let mut cancelled = false;

        tracing::info!(steps = total, "running scenario");

        for (index, step) in plan.steps().iter().enumerate() {
            if state.session.cancel_handle().is_cancelled() {
                tracing::info!(index, "cancellation requested, stopping at step boundary");
                cancelled = true;
                break;
            }

            let step_span = tracing::info_span!("step", index, id = %step.meta().id);

            let precondition = {
                let ctx = StepContext::new(state, self.operator.as_ref(), &records[..index], index);
                step_span.in_scope(|| guarded("precondition", || step.precondition(&ctx)))
            };
            let execution = match precondition {
                Ok(Precondition::Unmet(reason)) => {
                    step_span
                        .in_scope(|| tracing::info!(%reason, "precondition unmet, skipping step"));
                    let record = &mut records[index];
                    record.transition(StepState::Skipped)?;
                    record.message = Some(reason);
                    continue;
                }
                Ok(Precondition::Met) => {
                    records[index].transition(StepState::Running)?;
                    self.execute_step(step.as_ref(), &records[..index], index, state)
                        .instrument(step_span.clone())
                        .await
                }
                Err(fault) => {
                    records[index].transition(StepState::Running)?;
                    StepExecution {
                        result: Err(fault),
                        notes: Vec::new(),
                        duration_ms: 0,
                    }
                }
            };

            let flow = step_span.in_scope(|| settle(&mut records[index], execution, strategy))?;
            match flow {
                Flow::Continue => {}
                Flow::Halt => {
                    tracing::warn!(index, total, "fail_fast: halting scenario");
                    halted_at = Some(index);
                    break;
                }
                Flow::Cancel => {
                    cancelled = true;
                    break;
                }
            }
        }

        let any_failed = records.iter().any(|r| r.state == StepState::Failed);
        let status = if any_failed {
            ScenarioStatus::Failed
        } else if cancelled {
            ScenarioStatus::Cancelled
        } else {
            ScenarioStatus::Succeeded
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(%status, duration_ms, "scenario finished");

        Ok(ScenarioResult {
            run_id: Ulid::new(),
            label: meta.label().to_string(),
            description: meta.description().to_string(),
            strategy,
            status,
            not_applicable_reason: None,
            steps: records,
            halted_at,
            started_at,
            duration_ms,
        })
    }

    /// Run one step body inside its resource scope and a panic guard
    async fn execute_step(
        &self,
        step: &dyn Step,
        history: &[StepRecord],
        index: usize,
        state: SystemState<'_>,
    ) -> StepExecution {
        let start = Instant::now();
        let mut notes = Vec::new();
        let mut acquired: Vec<Arc<dyn StepResource>> = Vec::new();
        let mut acquire_error = None;

        match guarded("resources", || step.resources()) {
            Ok(resources) => {
                for resource in resources {
                    let outcome = AssertUnwindSafe(resource.acquire()).catch_unwind().await;
                    match outcome {
                        Ok(Ok(())) => {
                            tracing::debug!(resource = resource.name(), "resource acquired");
                            acquired.push(resource);
                        }
                        Ok(Err(err)) => {
                            acquire_error = Some(StepError::failed(format!(
                                "could not acquire {}: {err}",
                                resource.name()
                            )));
                            break;
                        }
                        Err(panic) => {
                            acquire_error = Some(panicked(
                                &format!("acquiring {}", resource.name()),
                                &*panic,
                            ));
                            break;
                        }
                    }
                }
            }
            Err(fault) => acquire_error = Some(fault),
        }

        let result = match acquire_error {
            Some(err) => Err(err),
            None => {
                let ctx = StepContext::new(state, self.operator.as_ref(), history, index);
                match AssertUnwindSafe(step.run(&ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(panicked("step", &*panic)),
                }
            }
        };

        for resource in acquired.iter().rev() {
            let outcome = match AssertUnwindSafe(resource.release()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    Err(panicked(&format!("releasing {}", resource.name()), &*panic))
                }
            };
            match outcome {
                Ok(()) => tracing::debug!(resource = resource.name(), "resource released"),
                Err(err) => {
                    tracing::warn!(
                        resource = resource.name(),
                        error = %err,
                        "resource release failed"
                    );
                    notes.push(format!("failed to release {}: {err}", resource.name()));
                }
            }
        }

        StepExecution {
            result,
            notes,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::unattended()
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").finish_non_exhaustive()
    }
}

/// What the runner does after a step finished
enum Flow {
    Continue,
    Halt,
    Cancel,
}

/// Move a running step's record to its terminal state
fn settle(
    record: &mut StepRecord,
    execution: StepExecution,
    strategy: RunStrategy,
) -> Result<Flow, TransitionError> {
    record.duration_ms = execution.duration_ms;
    record.notes = execution.notes;

    match execution.result {
        Ok(StepVerdict::Success) => {
            record.transition(StepState::Succeeded)?;
            tracing::info!(duration_ms = record.duration_ms, "step succeeded");
            Ok(Flow::Continue)
        }
        Ok(StepVerdict::Skipped { reason }) => {
            record.transition(StepState::Skipped)?;
            tracing::info!(%reason, "step skipped itself");
            record.message = Some(reason);
            Ok(Flow::Continue)
        }
        Err(StepError::Aborted) => {
            record.transition(StepState::Skipped)?;
            record.message = Some(StepError::Aborted.to_string());
            tracing::warn!("operator aborted, stopping at step boundary");
            Ok(Flow::Cancel)
        }
        Err(err) => {
            record.transition(StepState::Failed)?;
            tracing::warn!(error = %err, "step failed");
            record.message = Some(err.to_string());
            match strategy {
                RunStrategy::FailFast => Ok(Flow::Halt),
                RunStrategy::FailSlow => Ok(Flow::Continue),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Turn a caught panic into a step fault
fn panicked(what: &str, payload: &(dyn Any + Send)) -> StepError {
    StepError::fault(anyhow::anyhow!("{what} panicked: {}", panic_message(payload)))
}

/// Run synchronous step code under a panic guard
fn guarded<T>(what: &str, f: impl FnOnce() -> T) -> Result<T, StepError> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|panic| panicked(what, &*panic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confinement::Confinement;
    use crate::error::CompositionError;
    use crate::scenario::Composer;
    use crate::state::{SessionContext, StaticFeatureRegistry};
    use crate::step::StepMeta;
    use parking_lot::Mutex;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Pass,
        Fail,
        Panic,
    }

    struct Scripted {
        meta: StepMeta,
        behaviour: Behaviour,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl Step for Scripted {
        fn meta(&self) -> &StepMeta {
            &self.meta
        }

        async fn run(&self, _ctx: &StepContext<'_>) -> Result<StepVerdict, StepError> {
            self.log.lock().push(self.meta.id.clone());
            match self.behaviour {
                Behaviour::Pass => Ok(StepVerdict::Success),
                Behaviour::Fail => Err(StepError::failed("boom")),
                Behaviour::Panic => panic!("step exploded"),
            }
        }
    }

    struct Plan {
        meta: Metadata,
        steps: Vec<(&'static str, Behaviour)>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Scenario for Plan {
        fn metadata(&self) -> &Metadata {
            &self.meta
        }

        fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
            for (id, behaviour) in &self.steps {
                composer.add_step(Scripted {
                    meta: StepMeta::procedure(*id, *id),
                    behaviour: *behaviour,
                    log: self.log.clone(),
                });
            }
            Ok(())
        }
    }

    fn plan(strategy: RunStrategy, steps: Vec<(&'static str, Behaviour)>) -> Plan {
        Plan {
            meta: Metadata::builder("Test").run_strategy(strategy).build(),
            steps,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn run(scenario: &Plan) -> ScenarioResult {
        let features = StaticFeatureRegistry::new();
        let session = SessionContext::new();
        Runner::unattended()
            .run(scenario, &StepRegistry::new(), SystemState::new(&features, &session))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fail_fast_halts_at_first_failure() {
        let scenario = plan(
            RunStrategy::FailFast,
            vec![("a", Behaviour::Pass), ("b", Behaviour::Fail), ("c", Behaviour::Pass)],
        );
        let result = run(&scenario).await;

        assert_eq!(result.status, ScenarioStatus::Failed);
        assert_eq!(result.halted_at, Some(1));
        assert_eq!(result.steps[2].state, StepState::Pending);
        assert_eq!(*scenario.log.lock(), vec!["a", "b"]);
        assert_eq!(result.summary(), "halted at step 2 of 3, reason: boom");
    }

    #[tokio::test]
    async fn fail_slow_runs_everything() {
        let scenario = plan(
            RunStrategy::FailSlow,
            vec![("a", Behaviour::Fail), ("b", Behaviour::Pass), ("c", Behaviour::Fail)],
        );
        let result = run(&scenario).await;

        assert_eq!(result.status, ScenarioStatus::Failed);
        assert_eq!(result.halted_at, None);
        assert!(result.steps.iter().all(|s| s.state.is_terminal()));
        assert_eq!(result.count(StepState::Failed), 2);
        assert_eq!(*scenario.log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn panicking_step_becomes_failed() {
        let scenario = plan(
            RunStrategy::FailSlow,
            vec![("a", Behaviour::Panic), ("b", Behaviour::Pass)],
        );
        let result = run(&scenario).await;

        assert_eq!(result.steps[0].state, StepState::Failed);
        assert!(result.steps[0]
            .message
            .as_deref()
            .unwrap()
            .contains("step exploded"));
        assert_eq!(result.steps[1].state, StepState::Succeeded);
    }

    #[tokio::test]
    async fn false_confinement_runs_nothing() {
        let mut scenario = plan(RunStrategy::FailFast, vec![("a", Behaviour::Pass)]);
        scenario.meta = Metadata::builder("Test")
            .confine(Confinement::feature("satellite"))
            .build();
        let result = run(&scenario).await;

        assert_eq!(result.status, ScenarioStatus::NotApplicable);
        assert!(result.steps.is_empty());
        assert!(scenario.log.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_plan_succeeds() {
        let scenario = plan(RunStrategy::FailFast, vec![]);
        let result = run(&scenario).await;
        assert_eq!(result.status, ScenarioStatus::Succeeded);
    }

    #[test]
    fn panic_message_handles_payload_types() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "non-string panic payload");
    }
}
