// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Write access to the graph: copy-on-write overlays saved atomically

use chrono::{DateTime, Utc};
use idxmap::NamedMappingRw;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, instrument, trace, warn};

use crate::errors::GraphError;
use crate::flags::{FlagSelector, FlagStats};
use crate::graph::{KvGraph, MappingMap};
use crate::history::{self, RecordedNode};
use crate::node::{NodeData, NodeMap, NodeRef, NodeRw};
use crate::read::{ReadAccess, View};

/// Operations provided by the read-write graph handle.
pub trait RwAccess: ReadAccess {
    /// Register a metadata map for value-label -> metadata associations of
    /// selected nodes. If a map of the same name is already registered, the
    /// first registration wins.
    fn register_metadata_map(&mut self, map_name: &str, mapping: Arc<dyn NamedMappingRw>);

    /// Create a new node or return a read-write handle to an existing one.
    fn set_node(&mut self, key: &str) -> NodeRw<'_>;

    /// Delete the node of the given key. Returns true if the node existed.
    fn delete_node(&mut self, key: &str) -> bool;

    /// Publish all changes made so far into the graph, atomically.
    fn save(&mut self);
}

/// The private node set of a write handle.
pub(crate) struct Overlay {
    pub(crate) nodes: NodeMap,
    /// Keys of the nodes changed (or deleted) since the last save.
    pub(crate) touched: BTreeSet<String>,
    /// Keys of the nodes created since the last save.
    pub(crate) created: BTreeSet<String>,
    /// Keys of the nodes whose target definitions were replaced since the
    /// last save.
    pub(crate) redefined: BTreeSet<String>,
}

impl Overlay {
    pub(crate) fn new(nodes: NodeMap) -> Self {
        Self {
            nodes,
            touched: BTreeSet::new(),
            created: BTreeSet::new(),
            redefined: BTreeSet::new(),
        }
    }

    /// Node open for modification, copied out of the published graph on
    /// first write.
    pub(crate) fn node_mut(&mut self, key: &str) -> Option<&mut NodeData> {
        let node = self.nodes.get_mut(key)?;
        self.touched.insert(key.to_string());
        Some(Arc::make_mut(node))
    }

    /// Insert a node with the data of `source` and no edges, then connect it.
    fn insert_detached(&mut self, source: &NodeData) {
        let key = source.key.as_str();
        let mut node = NodeData::new(key);
        node.assign_data(source);
        self.nodes.insert(key.to_string(), Arc::new(node));
        self.touched.insert(key.to_string());
        self.check_potential_target(key);
        self.set_targets(key, source.targets_def.clone());
    }
}

/// Read-write graph handle.
///
/// The handle works on a private copy of the graph: nothing is visible to
/// readers until [`RwAccess::save`] is called. Obtaining the handle does not
/// block readers and several handles may be prepared concurrently, but
/// saves are serialized.
///
/// Releasing the handle (explicitly with [`GraphWriter::release`] or by
/// dropping it) records the saved changes into the history of the graph, if
/// recording was requested.
pub struct GraphWriter<'g> {
    graph: &'g KvGraph,
    overlay: Overlay,
    mappings: MappingMap,
    new_mappings: BTreeSet<String>,
    record: bool,
    /// Keys saved since the handle was created -> was the node data updated
    /// (as opposed to its targets only).
    new_revs: BTreeMap<String, bool>,
}

impl<'g> GraphWriter<'g> {
    pub(crate) fn new(graph: &'g KvGraph, nodes: NodeMap, mappings: MappingMap, record: bool) -> Self {
        Self {
            graph,
            overlay: Overlay::new(nodes),
            mappings,
            new_mappings: BTreeSet::new(),
            record,
            new_revs: BTreeMap::new(),
        }
    }

    fn view(&self) -> View<'_> {
        View::new(&self.overlay.nodes, &self.mappings)
    }

    /// Release the handle, recording the saved changes if requested.
    /// Unsaved changes are discarded.
    pub fn release(self) {}

    /// Append the saved changes to the timelines of the graph.
    #[instrument(level = "debug", skip(self), fields(revisions = self.new_revs.len()))]
    fn record_changes(&mut self) {
        let new_revs = std::mem::take(&mut self.new_revs);
        if !self.record || !self.graph.opts().record_old_revs || new_revs.is_empty() {
            return;
        }
        let mut guard = self.graph.state.write();
        let state = &mut *guard;
        let now = Utc::now();
        history::append_revisions(state, new_revs, now);

        if now - state.last_rev_trimming >= history::trimming_period() {
            history::trim_old_revisions(
                &mut state.timeline,
                now,
                self.graph.start_time(),
                self.graph.opts(),
            );
            state.last_rev_trimming = now;
        }
    }
}

impl Drop for GraphWriter<'_> {
    fn drop(&mut self) {
        self.record_changes();
    }
}

impl RwAccess for GraphWriter<'_> {
    fn register_metadata_map(&mut self, map_name: &str, mapping: Arc<dyn NamedMappingRw>) {
        if self.mappings.contains_key(map_name) {
            debug!("Metadata map {map_name} is already registered");
            return;
        }
        self.mappings.insert(map_name.to_string(), mapping);
        self.new_mappings.insert(map_name.to_string());
    }

    fn set_node(&mut self, key: &str) -> NodeRw<'_> {
        self.overlay.touched.insert(key.to_string());
        if !self.overlay.nodes.contains_key(key) {
            trace!("Creating node {key}");
            self.overlay.created.insert(key.to_string());
            self.overlay
                .nodes
                .insert(key.to_string(), Arc::new(NodeData::new(key)));
            self.overlay.check_potential_target(key);
        }
        NodeRw::new(key, &mut self.overlay)
    }

    fn delete_node(&mut self, key: &str) -> bool {
        let Some(node) = self.overlay.nodes.remove(key) else {
            return false;
        };
        trace!("Deleting node {key}");
        self.overlay.detach_node(&node);
        self.overlay.redefined.remove(key);
        self.overlay.touched.insert(key.to_string());
        true
    }

    #[instrument(level = "debug", skip(self), fields(changed = self.overlay.touched.len()))]
    fn save(&mut self) {
        let mut guard = self.graph.state.write();
        let state = &mut *guard;

        // propagate newly registered mappings, the first registration wins
        for map_name in std::mem::take(&mut self.new_mappings) {
            let Some(mapping) = self.mappings.get(&map_name).cloned() else {
                continue;
            };
            if !state.mappings.contains_key(&map_name) {
                history::attach_bound_nodes(&mut state.nodes, &map_name, &*mapping);
                state.mappings.insert(map_name.clone(), Arc::clone(&mapping));
            }
            if let Some(registered) = state.mappings.get(&map_name) {
                self.mappings.insert(map_name, Arc::clone(registered));
            }
        }

        // other writers may have saved since the overlay was copied: replay
        // the changes of this overlay onto the published graph so that edges
        // are evaluated against the nodes actually published
        let mut published = Overlay::new(std::mem::take(&mut state.nodes));
        let mut deleted = 0usize;
        for key in std::mem::take(&mut self.overlay.touched) {
            let Some(own) = self.overlay.nodes.get(&key) else {
                if let Some(removed) = published.nodes.remove(&key) {
                    published.detach_node(&removed);
                    published.touched.insert(key.clone());
                    history::remove_metadata(&removed, &state.mappings);
                    deleted += 1;
                }
                continue;
            };
            let created = self.overlay.created.contains(&key);
            let redefined = self.overlay.redefined.contains(&key);
            if !created && !redefined && !own.data_updated {
                // edge bookkeeping only, recomputed by the replay
                continue;
            }

            let previous = published.nodes.get(&key).cloned();
            match &previous {
                Some(node) if created => {
                    // replaced by a node created in this overlay
                    published.nodes.remove(&key);
                    published.detach_node(node);
                    published.insert_detached(own);
                }
                Some(_) => {
                    if own.data_updated {
                        if let Some(node) = published.node_mut(&key) {
                            node.assign_data(own);
                        }
                    }
                    if redefined {
                        published.set_targets(&key, own.targets_def.clone());
                    }
                }
                None => published.insert_detached(own),
            }
            if let Some(node) = published.node_mut(&key) {
                history::sync_metadata(node, previous.as_deref(), &state.mappings);
            }
        }
        self.overlay.created.clear();
        self.overlay.redefined.clear();

        let mut updated = 0usize;
        for key in std::mem::take(&mut published.touched) {
            let Some(node) = published.nodes.get_mut(&key) else {
                self.new_revs.insert(key, true);
                continue;
            };
            if !node.is_dirty() {
                continue;
            }
            let node = Arc::make_mut(node);
            // only changes of data or targets make a new revision
            if node.data_updated || node.targets_updated {
                let data_updated = self.new_revs.entry(key).or_insert(false);
                *data_updated |= node.data_updated;
            }
            node.mark_saved();
            updated += 1;
        }
        state.nodes = published.nodes;
        // continue from what was published; nodes stay shared until modified
        self.overlay.nodes = state.nodes.clone();
        debug!("Saved {updated} updated and {deleted} deleted nodes");
    }
}

impl ReadAccess for GraphWriter<'_> {
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
        let state = self.graph.state.read_recursive();
        history::flag_stats(&state.timeline, flag_name, key_selector)
    }

    fn get_node_timeline(&self, key: &str) -> Vec<RecordedNode> {
        let state = self.graph.state.read_recursive();
        state.timeline.get(key).cloned().unwrap_or_default()
    }

    fn get_snapshot(&self, time: DateTime<Utc>) -> Vec<RecordedNode> {
        let state = self.graph.state.read_recursive();
        history::snapshot(&state.timeline, time)
    }

    fn dump(&self) -> String {
        self.view().dump()
    }

    fn validate_edges(&self) -> Result<(), GraphError> {
        self.view().validate_edges()
    }
}
