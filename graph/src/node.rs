// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Graph nodes and the handles used to read and edit them

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::flags::{self, Flag};
use crate::targets::{RelationTargetDef, RuntimeTarget, RuntimeTargets, Targets};
use crate::value::Value;
use crate::write::Overlay;

/// Metadata associated with the value of a node. The graph never looks inside.
pub type Metadata = idxmap::Item;

/// Nodes indexed (and ordered) by key. Nodes are shared between the published
/// graph and write overlays and copied on first write.
pub(crate) type NodeMap = BTreeMap<String, Arc<NodeData>>;

/// The content of a node.
///
/// Edges are kept as keys of the nodes at the other end and are only turned
/// into node references at query time.
#[derive(Clone)]
pub(crate) struct NodeData {
    pub(crate) key: String,
    pub(crate) value: Option<Arc<dyn Value>>,
    pub(crate) flags: Vec<Flag>,

    pub(crate) metadata: Option<Metadata>,
    pub(crate) metadata_map: Option<String>,
    /// Label under which the metadata was stored into the metadata map.
    pub(crate) metadata_label: Option<String>,
    pub(crate) meta_in_sync: bool,

    pub(crate) targets_def: Vec<RelationTargetDef>,
    pub(crate) targets: Targets,
    pub(crate) sources: Targets,

    // changes not yet saved into the published graph
    pub(crate) data_updated: bool,
    pub(crate) targets_updated: bool,
    pub(crate) sources_updated: bool,
}

impl NodeData {
    pub(crate) fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
            flags: vec![],
            metadata: None,
            metadata_map: None,
            metadata_label: None,
            meta_in_sync: true,
            targets_def: vec![],
            targets: Targets::default(),
            sources: Targets::default(),
            data_updated: true,
            targets_updated: false,
            sources_updated: false,
        }
    }

    /// Label of the node value, the key if no value is set.
    pub(crate) fn label(&self) -> &str {
        self.value.as_ref().map_or(self.key.as_str(), |v| v.label())
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.data_updated || self.targets_updated || self.sources_updated
    }

    /// Take over the value, flags and metadata of another revision of the
    /// node. The edges and the metadata map binding already in place stay.
    pub(crate) fn assign_data(&mut self, other: &NodeData) {
        self.value.clone_from(&other.value);
        self.flags.clone_from(&other.flags);
        self.metadata.clone_from(&other.metadata);
        if self.metadata_map.is_none() {
            self.metadata_map.clone_from(&other.metadata_map);
        }
        self.meta_in_sync = false;
        self.data_updated = true;
    }

    pub(crate) fn mark_saved(&mut self) {
        self.data_updated = false;
        self.targets_updated = false;
        self.sources_updated = false;
        self.meta_in_sync = true;
    }
}

/// Read-only handle to a graph node.
///
/// The handle borrows the graph view it was obtained from; edges are
/// resolved against that view every time they are queried.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    node: &'a NodeData,
    nodes: &'a NodeMap,
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(node: &'a NodeData, nodes: &'a NodeMap) -> Self {
        Self { node, nodes }
    }

    fn resolve(&self, key: &str) -> Option<NodeRef<'a>> {
        self.nodes.get(key).map(|n| NodeRef::new(n, self.nodes))
    }

    #[must_use]
    pub fn get_key(&self) -> &'a str {
        &self.node.key
    }

    /// Label of the value, or the key if the node has no value yet.
    #[must_use]
    pub fn get_label(&self) -> &'a str {
        self.node.label()
    }

    #[must_use]
    pub fn get_value(&self) -> Option<&'a dyn Value> {
        self.node.value.as_deref()
    }

    #[must_use]
    pub fn get_flags(&self) -> &'a [Flag] {
        &self.node.flags
    }

    /// The flag of the given name, if the node has it.
    #[must_use]
    pub fn get_flag(&self, name: &str) -> Option<&'a Flag> {
        self.node.flags.iter().find(|f| f.get_name() == name)
    }

    #[must_use]
    pub fn get_metadata(&self) -> Option<&'a Metadata> {
        self.node.metadata.as_ref()
    }

    /// Name of the metadata map the node is bound to.
    #[must_use]
    pub fn get_metadata_map(&self) -> Option<&'a str> {
        self.node.metadata_map.as_deref()
    }

    /// Definitions of the edges pointing from this node.
    #[must_use]
    pub fn get_target_defs(&self) -> &'a [RelationTargetDef] {
        &self.node.targets_def
    }

    /// Materialized edges pointing from this node, referenced by key.
    #[must_use]
    pub fn get_targets_by_key(&self) -> &'a Targets {
        &self.node.targets
    }

    /// Materialized edges pointing to this node, referenced by key.
    #[must_use]
    pub fn get_sources_by_key(&self) -> &'a Targets {
        &self.node.sources
    }

    /// Nodes that the edges of the given relation point to, grouped by label.
    #[must_use]
    pub fn get_targets(&self, relation: &str) -> RuntimeTargets<'a> {
        RuntimeTargets(
            self.node
                .targets
                .relation(relation)
                .map(|target| RuntimeTarget {
                    label: target.label.clone(),
                    nodes: target
                        .matching_keys
                        .iter()
                        .filter_map(|key| self.resolve(key))
                        .collect(),
                })
                .collect(),
        )
    }

    /// Nodes with an edge of the given relation pointing to this node,
    /// ordered by key and listed once regardless of the number of labels.
    #[must_use]
    pub fn get_sources(&self, relation: &str) -> Vec<NodeRef<'a>> {
        let mut keys: Vec<&str> = self
            .node
            .sources
            .relation(relation)
            .flat_map(|source| source.matching_keys.iter().map(String::as_str))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.into_iter().filter_map(|key| self.resolve(key)).collect()
    }
}

impl Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.node.key)
            .field("value", &self.node.value)
            .field("flags", &self.node.flags)
            .field("targets", &self.node.targets)
            .field("sources", &self.node.sources)
            .finish_non_exhaustive()
    }
}

/// Read-write handle to a node of a write overlay.
///
/// Changes become visible to readers of the graph only once the overlay is
/// saved.
pub struct NodeRw<'a> {
    key: String,
    overlay: &'a mut Overlay,
}

impl<'a> NodeRw<'a> {
    pub(crate) fn new(key: &str, overlay: &'a mut Overlay) -> Self {
        Self {
            key: key.to_string(),
            overlay,
        }
    }

    fn update(&mut self, edit: impl FnOnce(&mut NodeData)) {
        if let Some(node) = self.overlay.node_mut(&self.key) {
            edit(node);
        }
    }

    #[must_use]
    pub fn get_key(&self) -> &str {
        &self.key
    }

    /// Read-only view of the node in its current (unsaved) state.
    ///
    /// # Panics
    ///
    /// Never in practice: the node cannot be removed from the overlay while
    /// this handle borrows it.
    #[must_use]
    pub fn as_node(&self) -> NodeRef<'_> {
        let nodes = &self.overlay.nodes;
        NodeRef::new(&nodes[self.key.as_str()], nodes)
    }

    /// Associate the given value with the node.
    pub fn set_value(&mut self, value: Arc<dyn Value>) {
        self.update(|node| {
            node.value = Some(value);
            node.data_updated = true;
            // the label may have changed
            node.meta_in_sync = false;
        });
    }

    /// Associate flags with the node, replacing flags of the same name.
    pub fn set_flags(&mut self, new: impl IntoIterator<Item = Flag>) {
        self.update(|node| {
            flags::set_flags(&mut node.flags, new);
            node.data_updated = true;
        });
    }

    /// Remove the flags of the given names. Names not present are ignored.
    pub fn del_flags(&mut self, names: &[&str]) {
        self.update(|node| {
            if flags::del_flags(&mut node.flags, names) {
                node.data_updated = true;
            }
        });
    }

    /// Choose the metadata map used to store the association between the
    /// label of this node and its metadata. Only the first call has effect:
    /// once bound, the node stays bound to the same map.
    pub fn set_metadata_map(&mut self, map_name: &str) {
        self.update(|node| {
            if node.metadata_map.is_none() {
                node.metadata_map = Some(map_name.to_string());
                node.meta_in_sync = false;
                node.data_updated = true;
            }
        });
    }

    /// Associate metadata with the node (`None` removes it).
    pub fn set_metadata(&mut self, metadata: Option<Metadata>) {
        self.update(|node| {
            node.metadata = metadata;
            node.meta_in_sync = false;
            node.data_updated = true;
        });
    }

    /// Replace the definitions of all edges pointing from this node.
    pub fn set_targets(&mut self, defs: Vec<RelationTargetDef>) {
        self.overlay.redefined.insert(self.key.clone());
        self.overlay.set_targets(&self.key, defs);
    }
}

impl Debug for NodeRw<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.as_node(), f)
    }
}
