// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Values carried by graph nodes

use serde::Serialize;
use std::fmt::{Debug, Display};

/// A configuration item tracked by the graph.
///
/// The graph never interprets the payload: it only needs a label (the name
/// used to associate metadata with the value), a type discriminator and a
/// string form (via [`Display`]) for history records and dumps.
pub trait Value: Debug + Display + Send + Sync {
    /// Label of the value, unique among values of the same type.
    fn label(&self) -> &str;

    /// Type discriminator, e.g. the name of the model the value belongs to.
    fn value_type(&self) -> &str;
}

/// A value as captured in a history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedValue {
    pub label: String,
    pub value_type: String,
    pub repr: String,
}

impl RecordedValue {
    #[must_use]
    pub fn new(value: &dyn Value) -> Self {
        Self {
            label: value.label().to_string(),
            value_type: value.value_type().to_string(),
            repr: value.to_string(),
        }
    }
}

impl Display for RecordedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.value_type, self.repr)
    }
}
