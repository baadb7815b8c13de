// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Relations between nodes: target definitions and materialized edges

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::node::NodeRef;

/// Predicate over node keys.
pub type KeySelector = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Set of node keys, ordered.
pub type KeySet = BTreeSet<String>;

/// Dynamic selection of a set of target nodes.
///
/// The key prefixes each select a subset of nodes and the subsets are unioned.
/// The result is then intersected with the key predicate, if any. A selector
/// with neither prefixes nor predicate selects nothing.
#[derive(Clone, Default)]
pub struct TargetSelector {
    pub key_prefixes: Vec<String>,
    pub key_selector: Option<KeySelector>,
}

impl TargetSelector {
    /// Select the nodes whose key satisfies the predicate.
    #[must_use]
    pub fn from_fn(selector: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            key_prefixes: vec![],
            key_selector: Some(Arc::new(selector)),
        }
    }

    /// Select the nodes whose key starts with any of the prefixes.
    #[must_use]
    pub fn with_prefixes(prefixes: &[&str]) -> Self {
        Self {
            key_prefixes: prefixes.iter().map(ToString::to_string).collect(),
            key_selector: None,
        }
    }

    /// Further restrict the selection with a key predicate.
    #[must_use]
    pub fn and_fn(mut self, selector: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.key_selector = Some(Arc::new(selector));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key_prefixes.is_empty() && self.key_selector.is_none()
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        let by_prefix = self.key_prefixes.is_empty()
            || self.key_prefixes.iter().any(|p| key.starts_with(p.as_str()));
        by_prefix && self.key_selector.as_ref().is_none_or(|select| select(key))
    }
}

impl Debug for TargetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetSelector")
            .field("key_prefixes", &self.key_prefixes)
            .field("key_selector", &self.key_selector.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// What an edge points to.
#[derive(Clone, Debug)]
pub enum TargetRef {
    /// A single node of the given key, whether it exists yet or not.
    Key(String),
    /// Every node matched by the selector.
    Selector(TargetSelector),
}

/// Definition of the edges pointing from a node under a given relation and
/// label. The label must be unique for a given (source node, relation).
#[derive(Clone, Debug)]
pub struct RelationTargetDef {
    pub relation: String,
    pub label: String,
    pub target: TargetRef,
}

impl RelationTargetDef {
    /// Edge to the node with the given key.
    #[must_use]
    pub fn with_key(relation: &str, label: &str, key: &str) -> Self {
        Self {
            relation: relation.to_string(),
            label: label.to_string(),
            target: TargetRef::Key(key.to_string()),
        }
    }

    /// Edges to every node matched by the selector.
    #[must_use]
    pub fn with_selector(relation: &str, label: &str, selector: TargetSelector) -> Self {
        Self {
            relation: relation.to_string(),
            label: label.to_string(),
            target: TargetRef::Selector(selector),
        }
    }

    /// True if the definition can match at most one node.
    #[must_use]
    pub fn singleton(&self) -> bool {
        matches!(self.target, TargetRef::Key(_))
    }

    pub(crate) fn expected_key(&self) -> Option<String> {
        match &self.target {
            TargetRef::Key(key) => Some(key.clone()),
            TargetRef::Selector(_) => None,
        }
    }

    /// An exact key takes precedence: a selector is never consulted for
    /// definitions given by key.
    pub(crate) fn matches(&self, key: &str) -> bool {
        match &self.target {
            TargetRef::Key(expected) => expected == key,
            TargetRef::Selector(selector) => selector.matches(key),
        }
    }
}

/// Materialized edges of a single (relation, label), referenced by node keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Target {
    pub relation: String,
    pub label: String,
    /// Set if the edges were defined with an exact key.
    pub expected_key: Option<String>,
    pub matching_keys: KeySet,
}

/// All materialized edges of a node in one direction, sorted by relation and
/// then label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Targets(Vec<Target>);

impl Targets {
    fn lookup_idx(&self, relation: &str, label: &str) -> Result<usize, usize> {
        self.0.binary_search_by(|t| {
            (t.relation.as_str(), t.label.as_str()).cmp(&(relation, label))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.0.iter()
    }

    /// Index where the targets of the given relation start, or `len()` if
    /// there are none.
    #[must_use]
    pub fn relation_begin(&self, relation: &str) -> usize {
        let idx = self.0.partition_point(|t| t.relation.as_str() < relation);
        match self.0.get(idx) {
            Some(t) if t.relation == relation => idx,
            _ => self.0.len(),
        }
    }

    /// Targets of the given relation.
    pub fn relation<'a>(&'a self, relation: &'a str) -> impl Iterator<Item = &'a Target> {
        self.0[self.relation_begin(relation)..]
            .iter()
            .take_while(move |t| t.relation == relation)
    }

    #[must_use]
    pub fn get_target_for_label(&self, relation: &str, label: &str) -> Option<&Target> {
        self.lookup_idx(relation, label).ok().map(|idx| &self.0[idx])
    }

    /// Check whether the edge (relation, label) -> key is present.
    #[must_use]
    pub fn has(&self, relation: &str, label: &str, key: &str) -> bool {
        self.get_target_for_label(relation, label)
            .is_some_and(|t| t.matching_keys.contains(key))
    }

    /// Target for the given relation and label, created empty if missing.
    pub(crate) fn entry(&mut self, relation: &str, label: &str) -> &mut Target {
        let idx = match self.lookup_idx(relation, label) {
            Ok(idx) => idx,
            Err(idx) => {
                self.0.insert(
                    idx,
                    Target {
                        relation: relation.to_string(),
                        label: label.to_string(),
                        ..Default::default()
                    },
                );
                idx
            }
        };
        &mut self.0[idx]
    }

    pub(crate) fn add_key(&mut self, relation: &str, label: &str, key: &str) -> bool {
        self.entry(relation, label).matching_keys.insert(key.to_string())
    }

    /// Remove an edge. With `prune`, a (relation, label) left without edges
    /// is dropped altogether.
    pub(crate) fn remove_key(&mut self, relation: &str, label: &str, key: &str, prune: bool) -> bool {
        let Ok(idx) = self.lookup_idx(relation, label) else {
            return false;
        };
        let removed = self.0[idx].matching_keys.remove(key);
        if prune && self.0[idx].matching_keys.is_empty() {
            self.0.remove(idx);
        }
        removed
    }
}

impl Display for Targets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut relation: Option<&str> = None;
        for target in &self.0 {
            if relation != Some(target.relation.as_str()) {
                if relation.is_some() {
                    write!(f, "}} ")?;
                }
                write!(f, "{}:{{", target.relation)?;
                relation = Some(target.relation.as_str());
            } else {
                write!(f, ", ")?;
            }
            write!(f, "{}->{}", target.label, fmt_keys(&target.matching_keys))?;
        }
        if relation.is_some() {
            write!(f, "}}")?;
        }
        Ok(())
    }
}

pub(crate) fn fmt_keys(keys: &KeySet) -> String {
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    format!("[{}]", keys.join(", "))
}

/// Edges of a single label, resolved to the nodes present in the graph at
/// the time of the call.
#[derive(Debug, Clone)]
pub struct RuntimeTarget<'a> {
    pub label: String,
    pub nodes: Vec<NodeRef<'a>>,
}

/// Resolved edges of a single relation, one entry per label.
#[derive(Debug, Clone, Default)]
pub struct RuntimeTargets<'a>(pub Vec<RuntimeTarget<'a>>);

impl<'a> RuntimeTargets<'a> {
    #[must_use]
    pub fn get_target_for_label(&self, label: &str) -> Option<&RuntimeTarget<'a>> {
        self.0.iter().find(|t| t.label == label)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeTarget<'a>> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_sorted_lookup() {
        let mut targets = Targets::default();
        targets.add_key("relation2", "b", "key1");
        targets.add_key("relation1", "z", "key2");
        targets.add_key("relation1", "a", "key3");
        targets.add_key("relation1", "a", "key4");

        let order: Vec<(&str, &str)> = targets
            .iter()
            .map(|t| (t.relation.as_str(), t.label.as_str()))
            .collect();
        assert_eq!(order, vec![("relation1", "a"), ("relation1", "z"), ("relation2", "b")]);

        assert_eq!(targets.relation_begin("relation1"), 0);
        assert_eq!(targets.relation_begin("relation2"), 2);
        assert_eq!(targets.relation_begin("relation3"), 3);
        assert_eq!(targets.relation_begin("relation0"), 3);
        assert_eq!(targets.relation("relation1").count(), 2);
        assert_eq!(targets.relation("relation3").count(), 0);

        assert!(targets.has("relation1", "a", "key4"));
        assert!(!targets.has("relation1", "z", "key4"));
        assert_eq!(
            targets.to_string(),
            "relation1:{a->[key3, key4], z->[key2]} relation2:{b->[key1]}"
        );
    }

    #[test]
    fn test_remove_key_prune() {
        let mut targets = Targets::default();
        targets.add_key("relation1", "a", "key1");
        targets.add_key("relation1", "b", "key1");

        assert!(targets.remove_key("relation1", "a", "key1", false));
        assert!(targets.get_target_for_label("relation1", "a").is_some());
        assert!(targets.remove_key("relation1", "b", "key1", true));
        assert!(targets.get_target_for_label("relation1", "b").is_none());
        assert!(!targets.remove_key("relation1", "c", "key1", true));
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_target_def_matching() {
        let by_key = RelationTargetDef::with_key("rel", "label", "/a/key1");
        assert!(by_key.singleton());
        assert!(by_key.matches("/a/key1"));
        assert!(!by_key.matches("/a/key2"));

        let by_prefix = RelationTargetDef::with_selector(
            "rel",
            "label",
            TargetSelector::with_prefixes(&["/a/", "/b/"]),
        );
        assert!(!by_prefix.singleton());
        assert!(by_prefix.matches("/a/key1"));
        assert!(by_prefix.matches("/b/key1"));
        assert!(!by_prefix.matches("/c/key1"));

        let intersected = RelationTargetDef::with_selector(
            "rel",
            "label",
            TargetSelector::with_prefixes(&["/a/"]).and_fn(|key| key.ends_with('1')),
        );
        assert!(intersected.matches("/a/key1"));
        assert!(!intersected.matches("/a/key2"));
        assert!(!intersected.matches("/b/key1"));

        let empty = RelationTargetDef::with_selector("rel", "label", TargetSelector::default());
        assert!(!empty.matches("/a/key1"));
        assert!(!empty.matches(""));
    }
}
