//! Run results
//!
//! A [`ScenarioResult`] aggregates one [`StepRecord`] per composed step plus
//! an overall [`ScenarioStatus`]. It is what the reporting layer consumes.

use crate::error::TransitionError;
use crate::metadata::RunStrategy;
use crate::state_machine::validate_transition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use ulid::Ulid;

/// Per-step outcome state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Not started
    Pending,
    /// Executing
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with a failure
    Failed,
    /// Did not run (precondition unmet, declined, or cancelled)
    Skipped,
}

impl StepState {
    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one step within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Zero-based position in the composed sequence
    pub index: usize,
    /// Step id
    pub id: String,
    /// Step description
    pub description: String,
    /// Current state
    pub state: StepState,
    /// Failure or skip reason
    pub message: Option<String>,
    /// Side notes, e.g. resource release problems
    pub notes: Vec<String>,
    /// Wall time spent running the step
    pub duration_ms: u64,
}

impl StepRecord {
    /// New record in `Pending`
    #[must_use]
    pub fn pending(index: usize, id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            index,
            id: id.into(),
            description: description.into(),
            state: StepState::Pending,
            message: None,
            notes: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Move to `to`, enforcing the outcome state machine
    pub fn transition(&mut self, to: StepState) -> Result<(), TransitionError> {
        validate_transition(self.state, to)?;
        tracing::trace!(step = %self.id, from = %self.state, to = %to, "step transition");
        self.state = to;
        Ok(())
    }
}

/// Overall scenario status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Every step succeeded or was skipped
    Succeeded,
    /// At least one step failed
    Failed,
    /// Confinement was false; nothing ran
    NotApplicable,
    /// Stopped at a step boundary before the end
    Cancelled,
}

impl ScenarioStatus {
    /// Process exit code for this status
    #[inline]
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded | Self::NotApplicable => 0,
            Self::Failed => 1,
            Self::Cancelled => 2,
        }
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::NotApplicable => f.write_str("not applicable"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of running one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Unique run id
    pub run_id: Ulid,
    /// Scenario label
    pub label: String,
    /// Scenario description
    pub description: String,
    /// Strategy the run used
    pub strategy: RunStrategy,
    /// Overall status
    pub status: ScenarioStatus,
    /// Reason the scenario was not applicable
    pub not_applicable_reason: Option<String>,
    /// One record per composed step
    pub steps: Vec<StepRecord>,
    /// Index of the step that halted a fail-fast run
    pub halted_at: Option<usize>,
    /// Start timestamp
    pub started_at: DateTime<Utc>,
    /// Total wall time
    pub duration_ms: u64,
}

impl ScenarioResult {
    /// Result for a scenario whose confinement was false
    #[must_use]
    pub fn not_applicable(
        label: impl Into<String>,
        description: impl Into<String>,
        strategy: RunStrategy,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Ulid::new(),
            label: label.into(),
            description: description.into(),
            strategy,
            status: ScenarioStatus::NotApplicable,
            not_applicable_reason: Some(reason.into()),
            steps: Vec::new(),
            halted_at: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Check if the scenario succeeded
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == ScenarioStatus::Succeeded
    }

    /// Records of failed steps
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.state == StepState::Failed)
    }

    /// Number of steps in `state`
    #[must_use]
    pub fn count(&self, state: StepState) -> usize {
        self.steps.iter().filter(|s| s.state == state).count()
    }

    /// Number of steps that actually executed
    #[must_use]
    pub fn executed_count(&self) -> usize {
        self.count(StepState::Succeeded) + self.count(StepState::Failed)
    }

    /// One-line summary
    ///
    /// A halted fail-fast run reads `halted at step K of N, reason R`
    /// (1-based K); everything else gets per-state counts.
    #[must_use]
    pub fn summary(&self) -> String {
        if let Some(reason) = &self.not_applicable_reason {
            return format!("not applicable: {reason}");
        }
        if let Some(index) = self.halted_at {
            let reason = self
                .steps
                .get(index)
                .and_then(|step| step.message.as_deref())
                .unwrap_or("no reason given");
            return format!(
                "halted at step {} of {}, reason: {reason}",
                index + 1,
                self.steps.len()
            );
        }
        format!(
            "{} steps: {} succeeded, {} failed, {} skipped, {} pending",
            self.steps.len(),
            self.count(StepState::Succeeded),
            self.count(StepState::Failed),
            self.count(StepState::Skipped),
            self.count(StepState::Pending),
        )
    }

    /// Full per-step table with an overall pass/fail line
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== {} ({}) ===", self.label, self.description);
        let _ = writeln!(out, "Strategy: {}", self.strategy);
        for step in &self.steps {
            let _ = write!(
                out,
                "[{:>3}] {:<10} {:<40}",
                step.index + 1,
                step.state,
                step.description
            );
            if let Some(message) = &step.message {
                let _ = write!(out, " {message}");
            }
            out.push('\n');
            for note in &step.notes {
                let _ = writeln!(out, "      note: {note}");
            }
        }
        let _ = writeln!(out, "{}", self.summary());
        let _ = writeln!(out, "=== Result: {} ===", self.status);
        out
    }
}

impl fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(states: &[StepState], halted_at: Option<usize>) -> ScenarioResult {
        let mut result = ScenarioResult::not_applicable("Demo", "demo", RunStrategy::FailFast, "");
        result.not_applicable_reason = None;
        result.status = ScenarioStatus::Failed;
        result.halted_at = halted_at;
        result.steps = states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                let mut record = StepRecord::pending(i, format!("s{i}"), format!("step {i}"));
                record.state = *state;
                if *state == StepState::Failed {
                    record.message = Some("service did not stop".into());
                }
                record
            })
            .collect();
        result
    }

    #[test]
    fn fail_fast_summary_names_halting_step() {
        let result = result_with(
            &[StepState::Succeeded, StepState::Failed, StepState::Pending],
            Some(1),
        );
        assert_eq!(
            result.summary(),
            "halted at step 2 of 3, reason: service did not stop"
        );
    }

    #[test]
    fn fail_slow_summary_counts_states() {
        let result = result_with(
            &[StepState::Succeeded, StepState::Failed, StepState::Skipped],
            None,
        );
        assert_eq!(
            result.summary(),
            "3 steps: 1 succeeded, 1 failed, 1 skipped, 0 pending"
        );
        assert_eq!(result.executed_count(), 2);
        assert_eq!(result.failed_steps().count(), 1);
    }

    #[test]
    fn render_text_lists_every_step() {
        let result = result_with(&[StepState::Succeeded, StepState::Failed], None);
        let text = result.render_text();
        assert!(text.contains("step 0"));
        assert!(text.contains("service did not stop"));
        assert!(text.contains("=== Result: failed ==="));
    }

    #[test]
    fn record_transition_enforces_machine() {
        let mut record = StepRecord::pending(0, "a", "a");
        assert!(record.transition(StepState::Succeeded).is_err());
        record.transition(StepState::Running).unwrap();
        record.transition(StepState::Succeeded).unwrap();
        assert!(record.transition(StepState::Failed).is_err());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ScenarioStatus::Succeeded.exit_code(), 0);
        assert_eq!(ScenarioStatus::NotApplicable.exit_code(), 0);
        assert_eq!(ScenarioStatus::Failed.exit_code(), 1);
        assert_eq!(ScenarioStatus::Cancelled.exit_code(), 2);
    }
}
