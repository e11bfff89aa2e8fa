//! Upgrade orchestration
//!
//! Chains the five phases and owns the session's upgrade marker. The marker
//! is set only once the pre-upgrade checks pass, and cleared only after the
//! post-upgrade checks have run. A phase that fails or is cancelled in
//! between leaves it set, which keeps the scenarios applicable when the
//! operator re-runs after the installed version has already moved.

use crate::host::HostActions;
use crate::scenarios::{
    Migrations, PostMigrations, PostUpgradeChecks, PreMigrations, PreUpgradeCheck, TARGET_VERSION,
};
use maint_core::{
    FeatureRegistry, Runner, Scenario, ScenarioResult, ScenarioStatus, SessionContext,
    StepRegistry, SystemState, TagError,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// One phase of the upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradePhase {
    /// Checks before anything changes
    PreUpgradeCheck,
    /// Preparation, ends with services stopped
    PreMigrations,
    /// Repositories, packages and installer
    Migrations,
    /// Services back up
    PostMigrations,
    /// Checks on the upgraded system
    PostUpgradeChecks,
}

impl UpgradePhase {
    /// Every phase, in execution order
    pub const ALL: [UpgradePhase; 5] = [
        Self::PreUpgradeCheck,
        Self::PreMigrations,
        Self::Migrations,
        Self::PostMigrations,
        Self::PostUpgradeChecks,
    ];

    /// Label of the scenario implementing this phase
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::PreUpgradeCheck => PreUpgradeCheck::LABEL,
            Self::PreMigrations => PreMigrations::LABEL,
            Self::Migrations => Migrations::LABEL,
            Self::PostMigrations => PostMigrations::LABEL,
            Self::PostUpgradeChecks => PostUpgradeChecks::LABEL,
        }
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    /// Phase
    pub phase: UpgradePhase,
    /// Scenario result
    pub result: ScenarioResult,
}

/// Outcome of a full upgrade attempt
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    /// Version the upgrade targets
    pub target_version: String,
    /// Phases that ran, in order
    pub phases: Vec<PhaseReport>,
    /// Phase whose outcome stopped the chain
    pub stopped_at: Option<UpgradePhase>,
    /// Error that kept the stopping phase from running at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the upgrade marker is still set
    pub upgrade_in_progress: bool,
}

impl UpgradeReport {
    /// Overall status: the first phase that did not succeed, or success
    ///
    /// A phase that could not run counts as failed.
    #[must_use]
    pub fn status(&self) -> ScenarioStatus {
        let unsuccessful = self
            .phases
            .iter()
            .map(|p| p.result.status)
            .find(|status| *status != ScenarioStatus::Succeeded);
        match unsuccessful {
            Some(status) => status,
            None if self.error.is_some() => ScenarioStatus::Failed,
            None => ScenarioStatus::Succeeded,
        }
    }

    /// Process exit code for the overall status
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.status().exit_code()
    }

    /// Result of `phase`, if it ran
    #[must_use]
    pub fn phase(&self, phase: UpgradePhase) -> Option<&ScenarioResult> {
        self.phases
            .iter()
            .find(|p| p.phase == phase)
            .map(|p| &p.result)
    }

    /// Human-readable report of every phase
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for phase in &self.phases {
            out.push_str(&phase.result.render_text());
            out.push('\n');
        }
        match (self.stopped_at, &self.error) {
            (Some(phase), Some(error)) => out.push_str(&format!(
                "Upgrade to {} stopped at {phase}: {error}\n",
                self.target_version
            )),
            (Some(phase), None) => out.push_str(&format!(
                "Upgrade to {} stopped at {phase}: {}\n",
                self.target_version,
                self.status()
            )),
            (None, _) => out.push_str(&format!("Upgrade to {} finished\n", self.target_version)),
        }
        if self.upgrade_in_progress {
            out.push_str("Upgrade marker is still set; re-run to resume\n");
        }
        out
    }
}

/// Runs the upgrade phases against one session
pub struct UpgradeOrchestrator {
    runner: Runner,
    registry: StepRegistry,
    phases: Vec<(UpgradePhase, Arc<dyn Scenario>)>,
}

impl UpgradeOrchestrator {
    /// Build the orchestrator for `host`
    ///
    /// `registry` supplies the tagged checks and procedures that the phases
    /// pull in during composition.
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] if a scenario's metadata is malformed.
    pub fn new(
        host: &Arc<dyn HostActions>,
        registry: StepRegistry,
        runner: Runner,
    ) -> Result<Self, TagError> {
        let phases: Vec<(UpgradePhase, Arc<dyn Scenario>)> = vec![
            (UpgradePhase::PreUpgradeCheck, Arc::new(PreUpgradeCheck::new(host.clone())?)),
            (UpgradePhase::PreMigrations, Arc::new(PreMigrations::new(host.clone())?)),
            (UpgradePhase::Migrations, Arc::new(Migrations::new(host.clone())?)),
            (UpgradePhase::PostMigrations, Arc::new(PostMigrations::new(host.clone())?)),
            (UpgradePhase::PostUpgradeChecks, Arc::new(PostUpgradeChecks::new(host.clone())?)),
        ];
        Ok(Self::with_phases(registry, runner, phases))
    }

    /// Build the orchestrator from explicit phase scenarios, run in the
    /// given order
    #[must_use]
    pub fn with_phases(
        registry: StepRegistry,
        runner: Runner,
        phases: Vec<(UpgradePhase, Arc<dyn Scenario>)>,
    ) -> Self {
        Self {
            runner,
            registry,
            phases,
        }
    }

    /// Run the upgrade
    ///
    /// Stops at the first phase that does not succeed. A phase that cannot
    /// run at all, for instance because it fails to compose, is recorded in
    /// [`UpgradeReport::error`] along with every phase that ran before it;
    /// the upgrade marker is left as it was at that point.
    pub async fn run(
        &self,
        features: &dyn FeatureRegistry,
        session: &mut SessionContext,
    ) -> UpgradeReport {
        let span = tracing::info_span!("upgrade", target = TARGET_VERSION);
        async move {
            let mut report = UpgradeReport {
                target_version: TARGET_VERSION.to_string(),
                phases: Vec::with_capacity(self.phases.len()),
                stopped_at: None,
                error: None,
                upgrade_in_progress: session.upgrade_in_progress().is_some(),
            };

            for (phase, scenario) in &self.phases {
                let phase = *phase;
                if phase == UpgradePhase::PreMigrations {
                    session.begin_upgrade(TARGET_VERSION);
                }

                tracing::info!(%phase, "starting phase");
                let result = self
                    .runner
                    .run(
                        scenario.as_ref(),
                        &self.registry,
                        SystemState::new(features, &*session),
                    )
                    .await;
                let result = match result {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!(%phase, error = %err, "phase could not run");
                        report.stopped_at = Some(phase);
                        report.error = Some(err.to_string());
                        break;
                    }
                };
                let status = result.status;
                report.phases.push(PhaseReport { phase, result });

                if phase == UpgradePhase::PostUpgradeChecks {
                    session.finish_upgrade();
                }
                if status != ScenarioStatus::Succeeded {
                    tracing::warn!(%phase, %status, "upgrade stopped");
                    report.stopped_at = Some(phase);
                    break;
                }
            }

            report.upgrade_in_progress = session.upgrade_in_progress().is_some();
            if report.stopped_at.is_none() {
                tracing::info!("upgrade finished");
            }
            report
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for UpgradeOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeOrchestrator")
            .field("phases", &self.phases.iter().map(|(p, _)| *p).collect::<Vec<_>>())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_map_to_scenario_labels() {
        let labels: Vec<&str> = UpgradePhase::ALL.iter().map(|p| p.label()).collect();
        assert_eq!(
            labels,
            vec![
                "pre-upgrade-check",
                "pre-migrations",
                "migrations",
                "post-migrations",
                "post-upgrade-checks"
            ]
        );
    }

    #[test]
    fn empty_report_is_success() {
        let report = UpgradeReport {
            target_version: "6.4".into(),
            phases: Vec::new(),
            stopped_at: None,
            error: None,
            upgrade_in_progress: false,
        };
        assert_eq!(report.status(), ScenarioStatus::Succeeded);
        assert_eq!(report.exit_code(), 0);
        assert!(report.render_text().contains("Upgrade to 6.4 finished"));
    }

    #[test]
    fn phase_that_could_not_run_fails_the_report() {
        let report = UpgradeReport {
            target_version: "6.4".into(),
            phases: Vec::new(),
            stopped_at: Some(UpgradePhase::PreUpgradeCheck),
            error: Some("registry unavailable".into()),
            upgrade_in_progress: false,
        };
        assert_eq!(report.status(), ScenarioStatus::Failed);
        assert_eq!(report.exit_code(), 1);
        assert!(report
            .render_text()
            .contains("Upgrade to 6.4 stopped at pre-upgrade-check: registry unavailable"));
    }
}
