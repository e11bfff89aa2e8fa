//! Step registry
//!
//! Provides [`StepRegistry`] for registering steps under tags at startup and
//! querying them by `(category, tag)` during composition. Each tag bucket
//! keeps registration order.

use crate::step::{StepCategory, StepHandle};
use crate::tag::Tag;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;

/// Registry of steps bucketed by category and tag
#[derive(Default)]
pub struct StepRegistry {
    buckets: IndexMap<(StepCategory, Tag), Vec<StepHandle>>,
    steps: Vec<StepHandle>,
}

impl StepRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step under its own tags plus `tags`
    ///
    /// The step lands at the end of every bucket it joins.
    pub fn register(&mut self, step: StepHandle, tags: impl IntoIterator<Item = Tag>) {
        let meta = step.meta();
        let category = meta.category;
        let all_tags: BTreeSet<Tag> = meta.tags.iter().cloned().chain(tags).collect();

        tracing::debug!(
            step = %meta.id,
            %category,
            tags = ?all_tags.iter().map(Tag::as_str).collect::<Vec<_>>(),
            "registering step"
        );

        for tag in all_tags {
            self.buckets
                .entry((category, tag))
                .or_default()
                .push(step.clone());
        }
        self.steps.push(step);
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, step: StepHandle, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.register(step, tags);
        self
    }

    /// Steps of `category` tagged `tag`, in registration order
    ///
    /// An unknown tag yields an empty vec.
    #[must_use]
    pub fn find(&self, category: StepCategory, tag: &Tag) -> Vec<StepHandle> {
        self.buckets
            .get(&(category, tag.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Checks tagged `tag`
    #[inline]
    #[must_use]
    pub fn find_checks(&self, tag: &Tag) -> Vec<StepHandle> {
        self.find(StepCategory::Check, tag)
    }

    /// Procedures tagged `tag`
    #[inline]
    #[must_use]
    pub fn find_procedures(&self, tag: &Tag) -> Vec<StepHandle> {
        self.find(StepCategory::Procedure, tag)
    }

    /// Tags with at least one step of `category`
    pub fn tags(&self, category: StepCategory) -> impl Iterator<Item = &Tag> {
        self.buckets
            .keys()
            .filter(move |(c, _)| *c == category)
            .map(|(_, tag)| tag)
    }

    /// Number of registered steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for ((category, tag), steps) in &self.buckets {
            let ids: Vec<&str> = steps.iter().map(|s| s.meta().id.as_str()).collect();
            map.entry(&format_args!("{category}:{tag}"), &ids);
        }
        map.finish()
    }
}
