//! Step contract
//!
//! A step is the atomic unit of work of a scenario: a check or a procedure.
//! Implementations only have to provide [`Step::meta`] and [`Step::run`];
//! preconditions and scoped resources are optional.
//!
//! Steps are stateless with respect to the scenario. Parameters are bound
//! when the step value is built, so the same step type can appear in many
//! scenarios with different parameters.

use crate::error::StepError;
use crate::result::{StepRecord, StepState};
use crate::state::{SessionContext, SystemState};
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Registry category of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    /// Read-only validation
    Check,
    /// Mutating procedure
    Procedure,
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check => f.write_str("check"),
            Self::Procedure => f.write_str("procedure"),
        }
    }
}

/// Immutable step descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepMeta {
    /// Stable identifier, e.g. `service-stop`
    pub id: String,
    /// Human description
    pub description: String,
    /// Registry category
    pub category: StepCategory,
    /// Tags the step registers under by default
    pub tags: BTreeSet<Tag>,
    /// Parameters bound at construction time
    pub params: BTreeMap<String, String>,
    /// Ids of earlier steps that must have succeeded for this one to run
    pub requires: Vec<String>,
}

impl StepMeta {
    /// Descriptor for a check
    #[must_use]
    pub fn check(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(id, description, StepCategory::Check)
    }

    /// Descriptor for a procedure
    #[must_use]
    pub fn procedure(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(id, description, StepCategory::Procedure)
    }

    fn new(id: impl Into<String>, description: impl Into<String>, category: StepCategory) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            category,
            tags: BTreeSet::new(),
            params: BTreeMap::new(),
            requires: Vec::new(),
        }
    }

    /// Add a default registration tag
    #[inline]
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Bind a parameter
    #[inline]
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Require an earlier step to have succeeded
    #[inline]
    #[must_use]
    pub fn requires(mut self, step_id: impl Into<String>) -> Self {
        self.requires.push(step_id.into());
        self
    }

    /// Look up a bound parameter
    #[inline]
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Whether a step's own precondition holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Step may run
    Met,
    /// Step is skipped with a reason
    Unmet(String),
}

/// Successful outcome reported by a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    /// Work done
    Success,
    /// Step declined at runtime
    Skipped {
        /// Why the step declined
        reason: String,
    },
}

impl StepVerdict {
    /// Declined with a reason
    #[inline]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Operator answer at a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed
    Yes,
    /// Skip this step
    No,
    /// Stop the whole run
    Quit,
}

/// Source of interactive confirmations
///
/// Prompting is the only suspension point a step may have.
pub trait Operator: Send + Sync {
    /// Ask the operator to confirm an action
    fn confirm(&self, prompt: &str) -> Decision;
}

/// Operator that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedOperator(pub Decision);

impl Operator for FixedOperator {
    fn confirm(&self, _prompt: &str) -> Decision {
        self.0
    }
}

/// A resource held for the duration of one step
///
/// The runner acquires every resource of a step before running it and
/// releases the acquired ones in reverse order on every exit path.
#[async_trait::async_trait]
pub trait StepResource: Send + Sync {
    /// Resource name for logs and notes
    fn name(&self) -> &str;

    /// Acquire the resource
    async fn acquire(&self) -> Result<(), StepError>;

    /// Release the resource
    async fn release(&self) -> Result<(), StepError>;
}

/// Execution context handed to a step
pub struct StepContext<'a> {
    state: SystemState<'a>,
    operator: &'a dyn Operator,
    history: &'a [StepRecord],
    index: usize,
}

impl<'a> StepContext<'a> {
    /// Build a context; `history` holds the records of earlier steps
    #[must_use]
    pub fn new(
        state: SystemState<'a>,
        operator: &'a dyn Operator,
        history: &'a [StepRecord],
        index: usize,
    ) -> Self {
        Self {
            state,
            operator,
            history,
            index,
        }
    }

    /// System state view
    #[inline]
    #[must_use]
    pub fn state(&self) -> &SystemState<'a> {
        &self.state
    }

    /// Session state
    #[inline]
    #[must_use]
    pub fn session(&self) -> &SessionContext {
        self.state.session
    }

    /// Zero-based position of the step in the composed sequence
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Outcome of the most recent earlier step with `step_id`
    #[must_use]
    pub fn outcome_of(&self, step_id: &str) -> Option<StepState> {
        self.history
            .iter()
            .rev()
            .find(|record| record.id == step_id)
            .map(|record| record.state)
    }

    /// Ask the operator; `Ok(false)` means skip, `Err(Aborted)` means quit
    pub fn confirm(&self, prompt: &str) -> Result<bool, StepError> {
        if self.session().assume_yes() {
            tracing::debug!(prompt, "confirmation auto-answered");
            return Ok(true);
        }
        match self.operator.confirm(prompt) {
            Decision::Yes => Ok(true),
            Decision::No => Ok(false),
            Decision::Quit => Err(StepError::Aborted),
        }
    }

    /// Evaluate the declared `requires` of a step
    #[must_use]
    pub fn check_requirements(&self, meta: &StepMeta) -> Precondition {
        for required in &meta.requires {
            match self.outcome_of(required) {
                Some(StepState::Succeeded) => {}
                Some(state) => {
                    return Precondition::Unmet(format!("requires `{required}`, which is {state}"));
                }
                None => {
                    return Precondition::Unmet(format!("requires `{required}`, which did not run"));
                }
            }
        }
        Precondition::Met
    }
}

impl fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("index", &self.index)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Atomic unit of work
#[async_trait::async_trait]
pub trait Step: Send + Sync {
    /// Step descriptor
    fn meta(&self) -> &StepMeta;

    /// The step's own applicability, re-evaluated at its turn
    fn precondition(&self, ctx: &StepContext<'_>) -> Precondition {
        ctx.check_requirements(self.meta())
    }

    /// Resources held while the step runs
    fn resources(&self) -> Vec<Arc<dyn StepResource>> {
        Vec::new()
    }

    /// Execute the step
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepVerdict, StepError>;
}

impl fmt::Debug for dyn Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Step").field(&self.meta().id).finish()
    }
}

/// Shared step reference
pub type StepHandle = Arc<dyn Step>;
