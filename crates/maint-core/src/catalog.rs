//! Scenario catalog
//!
//! The selection surface consumed by a CLI: enumerate scenarios by tag,
//! select one by label, filter by applicability.

use crate::confinement::check_applicability;
use crate::error::EngineError;
use crate::metadata::RunStrategy;
use crate::scenario::Scenario;
use crate::state::SystemState;
use crate::tag::Tag;
use serde::Serialize;
use std::sync::Arc;

/// Introspection view of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioDescription {
    /// Scenario label
    pub label: String,
    /// Human description
    pub description: String,
    /// Tags, sorted
    pub tags: Vec<String>,
    /// Run strategy
    pub strategy: RunStrategy,
    /// Rendered confinement, if any
    pub confinement: Option<String>,
    /// Target version, if any
    pub target_version: Option<String>,
}

/// Ordered collection of scenarios with unique labels
#[derive(Debug, Default)]
pub struct ScenarioCatalog {
    scenarios: Vec<Arc<dyn Scenario>>,
}

impl ScenarioCatalog {
    /// Create an empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scenario
    ///
    /// # Errors
    /// `EngineError::DuplicateScenario` if the label is already taken.
    pub fn register(&mut self, scenario: Arc<dyn Scenario>) -> Result<(), EngineError> {
        let label = scenario.metadata().label();
        if self.by_label(label).is_some() {
            return Err(EngineError::DuplicateScenario(label.to_string()));
        }
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Select by label
    #[must_use]
    pub fn by_label(&self, label: &str) -> Option<&Arc<dyn Scenario>> {
        self.scenarios
            .iter()
            .find(|s| s.metadata().label() == label)
    }

    /// Select by label or fail
    pub fn get(&self, label: &str) -> Result<&Arc<dyn Scenario>, EngineError> {
        self.by_label(label)
            .ok_or_else(|| EngineError::UnknownScenario(label.to_string()))
    }

    /// Scenarios carrying `tag`, in registration order
    pub fn by_tag<'a>(&'a self, tag: &'a Tag) -> impl Iterator<Item = &'a Arc<dyn Scenario>> + 'a {
        self.scenarios
            .iter()
            .filter(move |s| s.metadata().has_tag(tag))
    }

    /// Scenarios carrying `tag` whose confinement holds for `state`
    #[must_use]
    pub fn applicable<'a>(
        &'a self,
        tag: &'a Tag,
        state: &SystemState<'_>,
    ) -> Vec<&'a Arc<dyn Scenario>> {
        self.by_tag(tag)
            .filter(|s| check_applicability(s.metadata().confinement(), state).is_applicable())
            .collect()
    }

    /// All scenarios, in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Scenario>> {
        self.scenarios.iter()
    }

    /// Registered labels
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.metadata().label()).collect()
    }

    /// Describe every scenario without composing or running anything
    #[must_use]
    pub fn describe(&self) -> Vec<ScenarioDescription> {
        self.scenarios
            .iter()
            .map(|s| {
                let meta = s.metadata();
                ScenarioDescription {
                    label: meta.label().to_string(),
                    description: meta.description().to_string(),
                    tags: meta.tags().iter().map(ToString::to_string).collect(),
                    strategy: meta.run_strategy(),
                    confinement: meta.confinement().map(ToString::to_string),
                    target_version: meta.target_version().map(str::to_string),
                }
            })
            .collect()
    }

    /// Number of scenarios
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Check if catalog is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confinement::Confinement;
    use crate::error::CompositionError;
    use crate::metadata::Metadata;
    use crate::scenario::Composer;
    use crate::state::{SessionContext, StaticFeatureRegistry};

    struct Declared(Metadata);

    impl Scenario for Declared {
        fn metadata(&self) -> &Metadata {
            &self.0
        }

        fn compose(&self, _composer: &mut Composer<'_>) -> Result<(), CompositionError> {
            Ok(())
        }
    }

    fn scenario(label: &str, tags: &[&str], confinement: Option<Confinement>) -> Arc<dyn Scenario> {
        let mut builder = Metadata::builder(label).tags(tags.iter().copied()).unwrap();
        if let Some(c) = confinement {
            builder = builder.confine(c);
        }
        Arc::new(Declared(builder.build()))
    }

    fn catalog() -> ScenarioCatalog {
        let mut catalog = ScenarioCatalog::new();
        catalog
            .register(scenario("Checks", &["upgrade_scenario", "pre_upgrade_checks"], None))
            .unwrap();
        catalog
            .register(scenario(
                "Migrations",
                &["upgrade_scenario", "migrations"],
                Some(Confinement::feature("satellite")),
            ))
            .unwrap();
        catalog
    }

    #[test]
    fn rejects_duplicate_labels() {
        let mut catalog = catalog();
        let err = catalog.register(scenario("Checks", &[], None)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateScenario(label) if label == "Checks"));
    }

    #[test]
    fn selects_by_label_and_tag() {
        let catalog = catalog();
        assert!(catalog.get("Migrations").is_ok());
        assert!(matches!(catalog.get("Nope"), Err(EngineError::UnknownScenario(_))));

        let tag = Tag::new("upgrade_scenario").unwrap();
        assert_eq!(catalog.by_tag(&tag).count(), 2);
        assert_eq!(catalog.labels(), vec!["Checks", "Migrations"]);
    }

    #[test]
    fn applicable_filters_on_confinement() {
        let catalog = catalog();
        let features = StaticFeatureRegistry::new();
        let session = SessionContext::new();
        let state = SystemState::new(&features, &session);
        let tag = Tag::new("upgrade_scenario").unwrap();

        let labels: Vec<&str> = catalog
            .applicable(&tag, &state)
            .into_iter()
            .map(|s| s.metadata().label())
            .collect();
        assert_eq!(labels, vec!["Checks"]);
    }

    #[test]
    fn describe_has_no_side_effects() {
        let catalog = catalog();
        let described = catalog.describe();
        assert_eq!(described.len(), 2);
        assert_eq!(described[1].confinement.as_deref(), Some("feature(satellite)"));
        assert_eq!(described[0].strategy, RunStrategy::FailFast);
    }
}
