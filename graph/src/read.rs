// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Read access to the graph

use chrono::{DateTime, Utc};
use idxmap::NamedMappingRw;
use parking_lot::RwLockReadGuard;
use std::sync::Arc;

use crate::display;
use crate::errors::GraphError;
use crate::flags::{FlagSelector, FlagStats};
use crate::graph::{GraphState, MappingMap};
use crate::history::{self, RecordedNode};
use crate::node::{NodeMap, NodeRef};

/// Operations provided by every graph handle.
pub trait ReadAccess {
    /// Metadata map registered under the given name.
    fn get_metadata_map(&self, map_name: &str) -> Option<Arc<dyn NamedMappingRw>>;

    /// Keys of all the nodes, sorted.
    fn get_keys(&self) -> Vec<String>;

    /// The node of the given key, `None` if the key is unused.
    fn get_node(&self, key: &str) -> Option<NodeRef<'_>>;

    /// Nodes (ordered by key) whose key is accepted by the key selector, if
    /// any, and that satisfy every flag selector.
    fn get_nodes(
        &self,
        key_selector: Option<&dyn Fn(&str) -> bool>,
        flag_selectors: &[FlagSelector],
    ) -> Vec<NodeRef<'_>>;

    /// Usage of the given flag across all the recorded revisions of the nodes
    /// selected by key. Revisions caused only by updates of targets are not
    /// counted.
    fn get_flag_stats(&self, flag_name: &str, key_selector: Option<&dyn Fn(&str) -> bool>)
    -> FlagStats;

    /// Recorded revisions of the node, from the oldest to the newest.
    fn get_node_timeline(&self, key: &str) -> Vec<RecordedNode>;

    /// The revisions that were current at the given time, one per key.
    fn get_snapshot(&self, time: DateTime<Utc>) -> Vec<RecordedNode>;

    /// Human-readable representation of the graph content.
    fn dump(&self) -> String;

    /// Check that targets and sources of all nodes correspond with each other.
    ///
    /// # Errors
    ///
    /// Reports the first inconsistency found.
    fn validate_edges(&self) -> Result<(), GraphError>;
}

/// A borrowed set of nodes with their metadata maps, from either the
/// published graph or a write overlay.
#[derive(Clone, Copy)]
pub(crate) struct View<'a> {
    nodes: &'a NodeMap,
    mappings: &'a MappingMap,
}

impl<'a> View<'a> {
    pub(crate) fn new(nodes: &'a NodeMap, mappings: &'a MappingMap) -> Self {
        Self { nodes, mappings }
    }

    pub(crate) fn get_metadata_map(self, map_name: &str) -> Option<Arc<dyn NamedMappingRw>> {
        self.mappings.get(map_name).cloned()
    }

    pub(crate) fn get_keys(self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub(crate) fn get_node(self, key: &str) -> Option<NodeRef<'a>> {
        self.nodes.get(key).map(|node| NodeRef::new(node, self.nodes))
    }

    pub(crate) fn get_nodes(
        self,
        key_selector: Option<&dyn Fn(&str) -> bool>,
        flag_selectors: &[FlagSelector],
    ) -> Vec<NodeRef<'a>> {
        self.nodes
            .iter()
            .filter(|(key, _)| key_selector.is_none_or(|select| select(key.as_str())))
            .filter(|(_, node)| flag_selectors.iter().all(|fs| fs.selects(&node.flags)))
            .map(|(_, node)| NodeRef::new(node, self.nodes))
            .collect()
    }

    pub(crate) fn dump(self) -> String {
        display::dump(self.nodes, self.mappings)
    }

    pub(crate) fn validate_edges(self) -> Result<(), GraphError> {
        for (key, node) in self.nodes {
            for target in node.targets.iter() {
                for target_key in &target.matching_keys {
                    if target_key == key {
                        return Err(GraphError::SelfEdge(key.clone()));
                    }
                    let Some(target_node) = self.nodes.get(target_key) else {
                        return Err(GraphError::BrokenTarget(key.clone(), target_key.clone()));
                    };
                    if !target_node.sources.has(&target.relation, &target.label, key) {
                        return Err(GraphError::MissingSource(key.clone(), target_key.clone()));
                    }
                }
            }
            for source in node.sources.iter() {
                for source_key in &source.matching_keys {
                    if source_key == key {
                        return Err(GraphError::SelfEdge(key.clone()));
                    }
                    let Some(source_node) = self.nodes.get(source_key) else {
                        return Err(GraphError::BrokenSource(key.clone(), source_key.clone()));
                    };
                    if !source_node.targets.has(&source.relation, &source.label, key) {
                        return Err(GraphError::MissingTarget(key.clone(), source_key.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Read-only graph handle.
///
/// The handle holds the graph lock in shared mode: saves into the graph
/// block until every reader is released, either with
/// [`GraphReader::release`] or by dropping it.
pub struct GraphReader<'g> {
    state: RwLockReadGuard<'g, GraphState>,
}

impl<'g> GraphReader<'g> {
    pub(crate) fn new(state: RwLockReadGuard<'g, GraphState>) -> Self {
        Self { state }
    }

    fn view(&self) -> View<'_> {
        View::new(&self.state.nodes, &self.state.mappings)
    }

    /// Release the handle and with it the graph lock.
    pub fn release(self) {}
}

impl ReadAccess for GraphReader<'_> {
    fn get_metadata_map(&self, map_name: &str) -> Option<Arc<dyn NamedMappingRw>> {
        self.view().get_metadata_map(map_name)
    }

    fn get_keys(&self) -> Vec<String> {
        self.view().get_keys()
    }

    fn get_node(&self, key: &str) -> Option<NodeRef<'_>> {
        self.view().get_node(key)
    }

    fn get_nodes(
        &self,
        key_selector: Option<&dyn Fn(&str) -> bool>,
        flag_selectors: &[FlagSelector],
    ) -> Vec<NodeRef<'_>> {
        self.view().get_nodes(key_selector, flag_selectors)
    }

    fn get_flag_stats(
        &self,
        flag_name: &str,
        key_selector: Option<&dyn Fn(&str) -> bool>,
    ) -> FlagStats {
        history::flag_stats(&self.state.timeline, flag_name, key_selector)
    }

    fn get_node_timeline(&self, key: &str) -> Vec<RecordedNode> {
        self.state.timeline.get(key).cloned().unwrap_or_default()
    }

    fn get_snapshot(&self, time: DateTime<Utc>) -> Vec<RecordedNode> {
        history::snapshot(&self.state.timeline, time)
    }

    fn dump(&self) -> String {
        self.view().dump()
    }

    fn validate_edges(&self) -> Result<(), GraphError> {
        self.view().validate_edges()
    }
}
