// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A graph of key-value pairs with relations, used to track configuration
//! items and their dependencies.
//!
//! Every node is identified by a key and carries a [`Value`], a set of
//! [`Flag`]s and optional metadata. Nodes point to other nodes through
//! relations defined with [`RelationTargetDef`]s; the reverse edges (sources)
//! are maintained by the graph.
//!
//! Changes are prepared on a private copy of the graph obtained with
//! [`KvGraph::write`] and published atomically with [`RwAccess::save`].
//! Saved revisions of the nodes can be recorded into per-key timelines, which
//! can be queried later, e.g. to build a snapshot of the graph at a given time.
//!
//! ```
//! use kvscheduler_graph::{KvGraph, ReadAccess, RelationTargetDef, RwAccess};
//!
//! let graph = KvGraph::default();
//! let mut writer = graph.write(true);
//! writer
//!     .set_node("/interfaces/eth0")
//!     .set_targets(vec![RelationTargetDef::with_key("depends-on", "vrf", "/vrfs/red")]);
//! writer.set_node("/vrfs/red");
//! writer.save();
//! writer.release();
//!
//! let reader = graph.read();
//! let eth0 = reader.get_node("/interfaces/eth0").unwrap();
//! let deps = eth0.get_targets("depends-on");
//! assert_eq!(deps.get_target_for_label("vrf").unwrap().nodes[0].get_key(), "/vrfs/red");
//! reader.release();
//! ```

#![deny(clippy::all, clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod display;
mod edges;
mod errors;
mod flags;
mod graph;
mod history;
mod node;
mod opts;
mod read;
mod targets;
mod value;
mod write;

#[cfg(test)]
mod tests;

// re-exports
pub use errors::GraphError;
pub use flags::{Flag, FlagSelector, FlagStats, RecordedFlags};
pub use graph::KvGraph;
pub use history::RecordedNode;
pub use idxmap::{Fields, NamedMapping, NamedMappingRw};
pub use node::{Metadata, NodeRef, NodeRw};
pub use opts::{
    GraphOpts, GraphOptsBuilder, GraphOptsBuilderError, MINUTES_IN_ONE_DAY, MINUTES_IN_ONE_HOUR,
};
pub use read::{GraphReader, ReadAccess};
pub use targets::{
    KeySelector, KeySet, RelationTargetDef, RuntimeTarget, RuntimeTargets, Target, TargetRef,
    TargetSelector, Targets,
};
pub use value::{RecordedValue, Value};
pub use write::{GraphWriter, RwAccess};
