// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Graph options

use chrono::TimeDelta;
use derive_builder::Builder;
use serde::Deserialize;
use std::fmt::Display;

use crate::errors::GraphError;

pub const MINUTES_IN_ONE_HOUR: u32 = 60;
pub const MINUTES_IN_ONE_DAY: u32 = 24 * MINUTES_IN_ONE_HOUR;

/// Options of a graph. We derive a builder type `GraphOptsBuilder` with
/// defaults for each field; options can also be read from YAML, where
/// omitted fields take the same defaults.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Deserialize)]
#[builder(default)]
#[serde(default, deny_unknown_fields)]
pub struct GraphOpts {
    /// Keep the timelines of node revisions.
    pub record_old_revs: bool,

    /// Age (in minutes) after which a revision outside of the permanent init
    /// period is removed from its timeline.
    pub record_age_limit: u32,

    /// Revisions created within this many minutes after the graph was
    /// created are never removed.
    pub permanent_init_period: u32,
}

impl Default for GraphOpts {
    fn default() -> Self {
        Self {
            record_old_revs: true,
            record_age_limit: MINUTES_IN_ONE_DAY,
            permanent_init_period: MINUTES_IN_ONE_HOUR,
        }
    }
}

impl GraphOpts {
    /// Parse options from a YAML document.
    ///
    /// # Errors
    ///
    /// Fails if the document is not valid YAML or has unknown or mistyped fields.
    pub fn from_yaml(yaml: &str) -> Result<Self, GraphError> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub(crate) fn record_age_limit(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.record_age_limit))
    }

    pub(crate) fn permanent_init_period(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.permanent_init_period))
    }
}

impl GraphOptsBuilder {
    /// Build the options, with the error type of the graph.
    ///
    /// # Errors
    ///
    /// Never in practice, since every field has a default.
    pub fn finish(&self) -> Result<GraphOpts, GraphError> {
        Ok(self.build()?)
    }
}

impl Display for GraphOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Graph options")?;
        writeln!(f, "  record revisions     : {}", self.record_old_revs)?;
        writeln!(f, "  record age limit     : {} min", self.record_age_limit)?;
        writeln!(f, "  permanent init period: {} min", self.permanent_init_period)
    }
}
