// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Graph tests and their common helpers

mod metadata;

use idxmap::{Fields, IndexFn, MemNamedMapping};
use std::fmt::Display;
use std::sync::Arc;

use crate::graph::KvGraph;
use crate::node::Metadata;
use crate::opts::GraphOpts;
use crate::value::Value;

pub(crate) const PREFIX_A: &str = "/prefixA/";
pub(crate) const PREFIX_B: &str = "/prefixB/";
pub(crate) const RELATION1: &str = "relation1";
pub(crate) const RELATION2: &str = "relation2";
pub(crate) const METADATA_MAP_A: &str = "mapA";
pub(crate) const METADATA_MAP_B: &str = "mapB";
pub(crate) const INTEGER_FIELD: &str = "integer";

pub(crate) fn key_a(i: u32) -> String {
    format!("{PREFIX_A}key{i}")
}

pub(crate) fn key_b(i: u32) -> String {
    format!("{PREFIX_B}key{i}")
}

/// Value with a label and a string payload.
#[derive(Debug)]
pub(crate) struct StringValue {
    label: String,
    payload: String,
}

pub(crate) fn string_value(label: &str, payload: &str) -> Arc<dyn Value> {
    Arc::new(StringValue {
        label: label.to_string(),
        payload: payload.to_string(),
    })
}

impl Display for StringValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.payload)
    }
}

impl Value for StringValue {
    fn label(&self) -> &str {
        &self.label
    }
    fn value_type(&self) -> &str {
        "string"
    }
}

/// Metadata carrying a single integer, exposed as a secondary field.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct OnlyInteger {
    pub(crate) integer: i32,
}

pub(crate) fn integer_meta(integer: i32) -> Metadata {
    Arc::new(OnlyInteger { integer })
}

pub(crate) fn integer_index() -> IndexFn {
    Box::new(|item| {
        let mut fields = Fields::new();
        if let Some(meta) = item.downcast_ref::<OnlyInteger>() {
            fields.insert(INTEGER_FIELD.to_string(), vec![meta.integer.to_string()]);
        }
        fields
    })
}

pub(crate) fn integer_map(title: &str) -> Arc<MemNamedMapping> {
    Arc::new(MemNamedMapping::with_index(title, integer_index()))
}

pub(crate) fn new_graph() -> KvGraph {
    KvGraph::new(GraphOpts::default())
}

/// Keys of the nodes, in the order given.
pub(crate) fn keys_of<'a>(nodes: impl IntoIterator<Item = crate::node::NodeRef<'a>>) -> Vec<String> {
    nodes.into_iter().map(|n| n.get_key().to_string()).collect()
}
