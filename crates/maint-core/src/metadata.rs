//! Scenario metadata
//!
//! [`Metadata`] is a plain immutable value built once through
//! [`MetadataBuilder`]. Builders can be pre-populated by a shared helper and
//! extended per scenario, which is how families of scenarios share tags and
//! confinement.

use crate::confinement::Confinement;
use crate::error::TagError;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How the runner reacts to a failed step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStrategy {
    /// Stop at the first failed step
    #[default]
    FailFast,
    /// Run every step and aggregate failures
    FailSlow,
}

impl fmt::Display for RunStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => f.write_str("fail_fast"),
            Self::FailSlow => f.write_str("fail_slow"),
        }
    }
}

impl FromStr for RunStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_fast" => Ok(Self::FailFast),
            "fail_slow" => Ok(Self::FailSlow),
            other => Err(format!("unknown run strategy: {other}")),
        }
    }
}

/// Immutable scenario descriptor
#[derive(Debug, Clone)]
pub struct Metadata {
    label: String,
    description: String,
    tags: BTreeSet<Tag>,
    confinement: Option<Confinement>,
    run_strategy: RunStrategy,
    target_version: Option<String>,
}

impl Metadata {
    /// Start a builder for the scenario labelled `label`
    #[inline]
    #[must_use]
    pub fn builder(label: impl Into<String>) -> MetadataBuilder {
        MetadataBuilder::new(label)
    }

    /// Stable scenario name
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Human description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Selection tags
    #[inline]
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    /// Check for a tag
    #[inline]
    #[must_use]
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Applicability predicate
    #[inline]
    #[must_use]
    pub fn confinement(&self) -> Option<&Confinement> {
        self.confinement.as_ref()
    }

    /// Failure propagation strategy
    #[inline]
    #[must_use]
    pub fn run_strategy(&self) -> RunStrategy {
        self.run_strategy
    }

    /// Version the scenario targets
    #[inline]
    #[must_use]
    pub fn target_version(&self) -> Option<&str> {
        self.target_version.as_deref()
    }
}

/// Builder for [`Metadata`]
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    label: String,
    description: String,
    tags: BTreeSet<Tag>,
    confinement: Option<Confinement>,
    run_strategy: RunStrategy,
    target_version: Option<String>,
}

impl MetadataBuilder {
    /// New builder; strategy defaults to fail-fast
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            description: label.clone(),
            label,
            tags: BTreeSet::new(),
            confinement: None,
            run_strategy: RunStrategy::default(),
            target_version: None,
        }
    }

    /// Replace the label
    #[inline]
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the description
    #[inline]
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a tag
    #[inline]
    #[must_use]
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Add tags from strings
    pub fn tags<I, S>(mut self, tags: I) -> Result<Self, TagError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.tags.insert(Tag::new(tag)?);
        }
        Ok(self)
    }

    /// Set the confinement, AND-ing it with any existing one
    #[must_use]
    pub fn confine(mut self, confinement: Confinement) -> Self {
        self.confinement = Some(match self.confinement.take() {
            Some(existing) => existing.and(confinement),
            None => confinement,
        });
        self
    }

    /// Set the run strategy
    #[inline]
    #[must_use]
    pub fn run_strategy(mut self, strategy: RunStrategy) -> Self {
        self.run_strategy = strategy;
        self
    }

    /// Set the target version
    #[inline]
    #[must_use]
    pub fn target_version(mut self, version: impl Into<String>) -> Self {
        self.target_version = Some(version.into());
        self
    }

    /// Freeze into [`Metadata`]
    #[must_use]
    pub fn build(self) -> Metadata {
        Metadata {
            label: self.label,
            description: self.description,
            tags: self.tags,
            confinement: self.confinement,
            run_strategy: self.run_strategy,
            target_version: self.target_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_fail_fast() {
        let meta = Metadata::builder("Migrations").build();
        assert_eq!(meta.run_strategy(), RunStrategy::FailFast);
        assert_eq!(meta.description(), "Migrations");
        assert!(meta.confinement().is_none());
    }

    #[test]
    fn shared_builder_is_extended() {
        let base = Metadata::builder("base")
            .tags(["upgrade_scenario"])
            .unwrap()
            .target_version("6.4")
            .confine(Confinement::feature("satellite"));

        let meta = base
            .label("PreUpgradeCheck")
            .description("Checks before upgrading")
            .tags(["pre_upgrade_checks"])
            .unwrap()
            .run_strategy(RunStrategy::FailSlow)
            .build();

        assert_eq!(meta.label(), "PreUpgradeCheck");
        assert_eq!(meta.tags().len(), 2);
        assert!(meta.has_tag(&Tag::new("upgrade_scenario").unwrap()));
        assert_eq!(meta.target_version(), Some("6.4"));
        assert_eq!(meta.run_strategy(), RunStrategy::FailSlow);
    }

    #[test]
    fn confine_twice_ands_predicates() {
        let meta = Metadata::builder("x")
            .confine(Confinement::feature("a"))
            .confine(Confinement::feature("b"))
            .build();
        assert_eq!(
            meta.confinement().unwrap().to_string(),
            "(feature(a) AND feature(b))"
        );
    }

    #[test]
    fn strategy_parses_and_serializes() {
        assert_eq!("fail_slow".parse::<RunStrategy>(), Ok(RunStrategy::FailSlow));
        assert!("yolo".parse::<RunStrategy>().is_err());
        assert_eq!(
            serde_json::to_string(&RunStrategy::FailFast).unwrap(),
            "\"fail_fast\""
        );
    }
}
