// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Maintenance of the edges of a write overlay.
//!
//! Targets of a node are materialized from its target definitions; sources
//! are never set directly and are always the exact transpose of the targets
//! of all the other nodes. A node never has an edge to itself.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, trace, warn};

use crate::node::NodeData;
use crate::targets::{RelationTargetDef, TargetRef, TargetSelector, Targets};
use crate::write::Overlay;

/// An edge to be added: (node at the other end, relation, label).
type PendingEdge = (String, String, String);

impl Overlay {
    /// Keys of the existing nodes (other than `own_key`) matched by a target
    /// definition.
    fn candidates(&self, def: &RelationTargetDef, own_key: &str) -> Vec<String> {
        match &def.target {
            TargetRef::Key(key) => {
                if key != own_key && self.nodes.contains_key(key) {
                    vec![key.clone()]
                } else {
                    vec![]
                }
            }
            TargetRef::Selector(selector) => self
                .selector_scan(selector)
                .into_iter()
                .filter(|key| key != own_key && selector.matches(key))
                .collect(),
        }
    }

    /// Keys worth testing against a selector: the key ranges of the selector
    /// prefixes, or every key if there are none.
    fn selector_scan(&self, selector: &TargetSelector) -> BTreeSet<String> {
        if selector.key_prefixes.is_empty() {
            if selector.key_selector.is_none() {
                return BTreeSet::new();
            }
            return self.nodes.keys().cloned().collect();
        }
        let mut keys = BTreeSet::new();
        for prefix in &selector.key_prefixes {
            keys.extend(
                self.nodes
                    .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
                    .map(|(key, _)| key)
                    .take_while(|key| key.starts_with(prefix.as_str()))
                    .cloned(),
            );
        }
        keys
    }

    fn add_source(&mut self, target_key: &str, relation: &str, label: &str, source_key: &str) {
        if let Some(target) = self.node_mut(target_key) {
            target.sources.add_key(relation, label, source_key);
            target.sources_updated = true;
        }
    }

    fn remove_source(&mut self, target_key: &str, relation: &str, label: &str, source_key: &str) {
        if let Some(target) = self.node_mut(target_key) {
            if target.sources.remove_key(relation, label, source_key, true) {
                target.sources_updated = true;
            }
        }
    }

    /// Replace the target definitions of a node and re-materialize its edges.
    pub(crate) fn set_targets(&mut self, key: &str, defs: Vec<RelationTargetDef>) {
        let defs = dedup_target_defs(key, defs);
        let Some(node) = self.nodes.get(key) else {
            return;
        };

        // detach from the current targets
        let previous = node.targets.clone();
        for target in previous.iter() {
            for target_key in &target.matching_keys {
                self.remove_source(target_key, &target.relation, &target.label, key);
            }
        }

        // re-evaluate every definition against the other nodes
        let mut targets = Targets::default();
        let mut edges: Vec<PendingEdge> = vec![];
        for def in &defs {
            let target = targets.entry(&def.relation, &def.label);
            target.expected_key = def.expected_key();
            for candidate in self.candidates(def, key) {
                target.matching_keys.insert(candidate.clone());
                edges.push((candidate, def.relation.clone(), def.label.clone()));
            }
        }
        for (target_key, relation, label) in &edges {
            trace!("Edge {key} -[{relation}/{label}]-> {target_key}");
            self.add_source(target_key, relation, label, key);
        }

        if let Some(node) = self.node_mut(key) {
            node.targets_def = defs;
            node.targets = targets;
            node.targets_updated = true;
        }
    }

    /// Connect a newly created node with every existing node whose target
    /// definitions select it.
    pub(crate) fn check_potential_target(&mut self, new_key: &str) {
        let edges: Vec<PendingEdge> = self
            .nodes
            .iter()
            .filter(|(key, _)| key.as_str() != new_key)
            .flat_map(|(key, node)| {
                node.targets_def
                    .iter()
                    .filter(|def| def.matches(new_key))
                    .map(move |def| (key.clone(), def.relation.clone(), def.label.clone()))
            })
            .collect();

        for (source_key, relation, label) in &edges {
            trace!("Edge {source_key} -[{relation}/{label}]-> {new_key} (new node)");
            if let Some(source) = self.node_mut(source_key) {
                source.targets.add_key(relation, label, new_key);
                source.targets_updated = true;
            }
            self.add_source(new_key, relation, label, source_key);
        }
    }

    /// Remove every edge from and to a node that was just taken out of the
    /// overlay.
    pub(crate) fn detach_node(&mut self, node: &Arc<NodeData>) {
        let key = node.key.as_str();
        for target in node.targets.iter() {
            for target_key in &target.matching_keys {
                self.remove_source(target_key, &target.relation, &target.label, key);
            }
        }
        for source in node.sources.iter() {
            for source_key in &source.matching_keys {
                if let Some(source_node) = self.node_mut(source_key) {
                    if source_node
                        .targets
                        .remove_key(&source.relation, &source.label, key, false)
                    {
                        source_node.targets_updated = true;
                    }
                }
            }
        }
    }
}

/// Keep a single definition per (relation, label): the last one given.
fn dedup_target_defs(key: &str, defs: Vec<RelationTargetDef>) -> Vec<RelationTargetDef> {
    let mut unique: Vec<RelationTargetDef> = Vec::with_capacity(defs.len());
    for def in defs {
        if let Some(existing) = unique
            .iter_mut()
            .find(|d| d.relation == def.relation && d.label == def.label)
        {
            warn!(
                "Node {key} defines targets of relation {} with label {} more than once",
                def.relation, def.label
            );
            *existing = def;
        } else {
            unique.push(def);
        }
    }
    unique
}
