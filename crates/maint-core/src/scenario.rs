//! Scenarios and composition
//!
//! A [`Scenario`] binds [`Metadata`] to a `compose` procedure. Composition
//! materialises the step sequence from literal steps and registry queries,
//! in the order the author adds them. The scenario value itself never holds
//! its steps, so enumerating or describing scenarios is free of side effects.

use crate::error::{CompositionError, EngineError};
use crate::metadata::Metadata;
use crate::registry::StepRegistry;
use crate::step::{Step, StepHandle};
use crate::tag::Tag;
use std::fmt;
use std::sync::Arc;

/// A named, confined, strategy-tagged step pipeline
pub trait Scenario: Send + Sync {
    /// Declarative descriptor
    fn metadata(&self) -> &Metadata;

    /// Add this scenario's steps to `composer`
    ///
    /// Must only declare work: no system mutation, and the same registry
    /// must always yield the same sequence.
    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError>;
}

impl fmt::Debug for dyn Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scenario").field(&self.metadata().label()).finish()
    }
}

/// Accumulates a scenario's step sequence
pub struct Composer<'a> {
    registry: &'a StepRegistry,
    steps: Vec<StepHandle>,
}

impl<'a> Composer<'a> {
    /// New empty composer
    #[must_use]
    pub fn new(registry: &'a StepRegistry) -> Self {
        Self {
            registry,
            steps: Vec::new(),
        }
    }

    /// Append one concrete step
    pub fn add_step(&mut self, step: impl Step + 'static) -> &mut Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Append a contiguous block, preserving its order
    pub fn add_steps(&mut self, steps: impl IntoIterator<Item = StepHandle>) -> &mut Self {
        self.steps.extend(steps);
        self
    }

    /// Registry checks tagged `tag`
    pub fn find_checks(&self, tag: &str) -> Result<Vec<StepHandle>, CompositionError> {
        let tag = Tag::new(tag)?;
        Ok(self.registry.find_checks(&tag))
    }

    /// Registry procedures tagged `tag`
    pub fn find_procedures(&self, tag: &str) -> Result<Vec<StepHandle>, CompositionError> {
        let tag = Tag::new(tag)?;
        Ok(self.registry.find_procedures(&tag))
    }

    /// Number of steps so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if no step was added
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn finish(self) -> Vec<StepHandle> {
        self.steps
    }
}

impl fmt::Debug for Composer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// The materialised step sequence of one scenario
#[derive(Clone)]
pub struct ComposedPlan {
    label: String,
    steps: Vec<StepHandle>,
}

impl ComposedPlan {
    /// Scenario label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Steps in execution order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[StepHandle] {
        &self.steps
    }

    /// Step ids in execution order
    #[must_use]
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.meta().id.as_str()).collect()
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the plan has no steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for ComposedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedPlan")
            .field("label", &self.label)
            .field("steps", &self.step_ids())
            .finish()
    }
}

impl fmt::Display for ComposedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} steps)", self.label, self.steps.len())?;
        for (i, step) in self.steps.iter().enumerate() {
            let meta = step.meta();
            write!(f, "  {:>2}. [{}] {} - {}", i + 1, meta.category, meta.id, meta.description)?;
            if !meta.params.is_empty() {
                let params: Vec<String> =
                    meta.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, " ({})", params.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Compose `scenario` into its plan
pub fn compose(
    scenario: &dyn Scenario,
    registry: &StepRegistry,
) -> Result<ComposedPlan, EngineError> {
    let label = scenario.metadata().label().to_string();
    let mut composer = Composer::new(registry);
    scenario
        .compose(&mut composer)
        .map_err(|source| EngineError::Composition {
            label: label.clone(),
            source,
        })?;
    let steps = composer.finish();
    tracing::debug!(scenario = %label, steps = steps.len(), "scenario composed");
    Ok(ComposedPlan { label, steps })
}
