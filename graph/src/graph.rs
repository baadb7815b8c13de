// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The shared graph and its handle factories

use chrono::{DateTime, Utc};
use idxmap::NamedMappingRw;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::history::RecordedNode;
use crate::node::NodeMap;
use crate::opts::GraphOpts;
use crate::read::GraphReader;
use crate::write::GraphWriter;

/// Registered metadata maps, by name.
pub(crate) type MappingMap = BTreeMap<String, Arc<dyn NamedMappingRw>>;

/// Node revisions, per key, from the oldest to the newest.
pub(crate) type Timeline = BTreeMap<String, Vec<RecordedNode>>;

/// The published state of the graph, protected by the graph lock.
pub(crate) struct GraphState {
    pub(crate) nodes: NodeMap,
    pub(crate) mappings: MappingMap,
    pub(crate) timeline: Timeline,
    pub(crate) last_rev_trimming: DateTime<Utc>,
}

/// A graph of key-value pairs shared between one or more readers and writers.
///
/// Readers obtain a [`GraphReader`] with [`KvGraph::read`], which holds the
/// graph lock in shared mode until released. Writers obtain a [`GraphWriter`]
/// with [`KvGraph::write`]: the writer prepares its changes on a private copy
/// of the graph and only takes the lock in exclusive mode while saving them.
pub struct KvGraph {
    pub(crate) state: RwLock<GraphState>,
    opts: GraphOpts,
    start_time: DateTime<Utc>,
}

impl KvGraph {
    #[must_use]
    pub fn new(opts: GraphOpts) -> Self {
        debug!("Creating graph with options: {opts:?}");
        let start_time = Utc::now();
        Self {
            state: RwLock::new(GraphState {
                nodes: NodeMap::new(),
                mappings: MappingMap::new(),
                timeline: Timeline::new(),
                last_rev_trimming: start_time,
            }),
            opts,
            start_time,
        }
    }

    /// Obtain a read-only handle to the graph. The graph cannot be saved into
    /// until the handle is released.
    pub fn read(&self) -> GraphReader<'_> {
        GraphReader::new(self.state.read())
    }

    /// Obtain a read-write handle to a private copy of the graph. With
    /// `record`, the changes saved through the handle are appended to the
    /// timelines of the nodes when the handle is released.
    pub fn write(&self, record: bool) -> GraphWriter<'_> {
        let (nodes, mappings) = {
            let state = self.state.read();
            (state.nodes.clone(), state.mappings.clone())
        };
        GraphWriter::new(self, nodes, mappings, record)
    }

    #[must_use]
    pub fn opts(&self) -> &GraphOpts {
        &self.opts
    }

    /// Time of creation of the graph.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }
}

impl Default for KvGraph {
    fn default() -> Self {
        Self::new(GraphOpts::default())
    }
}
