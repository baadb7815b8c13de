// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors reported by the graph
//!
//! Graph queries and updates never fail: absence is reported with `None` or
//! an empty result. Errors only come from option handling and from the
//! consistency checks of the edges.

use thiserror::Error;

use crate::opts::GraphOptsBuilderError;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Broken target {0} -> {1}")]
    BrokenTarget(String, String),
    #[error("Missing source for target {0} -> {1}")]
    MissingSource(String, String),
    #[error("Broken source {0} -> {1}")]
    BrokenSource(String, String),
    #[error("Missing target for source {0} -> {1}")]
    MissingTarget(String, String),
    #[error("Node {0} has an edge to itself")]
    SelfEdge(String),

    #[error("Invalid graph options: {0}")]
    InvalidOpts(#[from] serde_yaml_ng::Error),
    #[error("Failed to build graph options: {0}")]
    Builder(#[from] GraphOptsBuilderError),
}
