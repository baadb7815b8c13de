// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Node flags and flag-based node selection

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;

/// A `name:value` annotation of a node. At most one flag of a given name is
/// associated with a node at any time. The value may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Flag {
    name: String,
    value: String,
}

impl Flag {
    /// Flag with a value.
    #[must_use]
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Flag which is only relevant by its presence.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self::new(name, "")
    }

    #[must_use]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get_value(&self) -> &str {
        &self.value
    }

    /// Check if `other`, a flag that a node has, satisfies this flag used as a
    /// selection criterion. An empty value matches any value.
    pub(crate) fn is_matched_by(&self, other: &Flag) -> bool {
        self.name == other.name && (self.value.is_empty() || self.value == other.value)
    }
}

impl Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:<{}>", self.name, self.value)
        }
    }
}

/// Selects nodes with (or without) a given set of flags.
///
/// A flag of the selector with an empty value matches a node flag of the same
/// name regardless of its value.
#[derive(Debug, Clone)]
pub struct FlagSelector {
    with: bool,
    flags: Vec<Flag>,
}

impl FlagSelector {
    /// Select nodes that have all the listed flags.
    #[must_use]
    pub fn with_flags(flags: impl IntoIterator<Item = Flag>) -> Self {
        Self {
            with: true,
            flags: flags.into_iter().collect(),
        }
    }

    /// Select nodes that have none of the listed flags.
    #[must_use]
    pub fn without_flags(flags: impl IntoIterator<Item = Flag>) -> Self {
        Self {
            with: false,
            flags: flags.into_iter().collect(),
        }
    }

    pub(crate) fn selects(&self, node_flags: &[Flag]) -> bool {
        self.flags.iter().all(|wanted| {
            let has = node_flags.iter().any(|flag| wanted.is_matched_by(flag));
            has == self.with
        })
    }
}

/// Flags of a node at the time it was recorded: name -> value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecordedFlags(BTreeMap<String, String>);

impl RecordedFlags {
    pub(crate) fn new(flags: &[Flag]) -> Self {
        Self(
            flags
                .iter()
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect(),
        )
    }

    /// Value of the given flag, or `None` if the node didn't have the flag.
    #[must_use]
    pub fn get_flag(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Summary of the usage of a given flag across recorded node revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagStats {
    /// Number of revisions with the flag assigned.
    pub total_count: u64,
    /// Number of revisions with the flag having the given value.
    pub per_value_count: BTreeMap<String, u64>,
}

/// Helper to update the flags of a node: flags are replaced by name.
pub(crate) fn set_flags(flags: &mut Vec<Flag>, new: impl IntoIterator<Item = Flag>) {
    for flag in new {
        match flags.iter_mut().find(|f| f.name == flag.name) {
            Some(existing) => *existing = flag,
            None => flags.push(flag),
        }
    }
}

/// Helper to remove the flags of the given names. Unknown names are ignored.
pub(crate) fn del_flags(flags: &mut Vec<Flag>, names: &[&str]) -> bool {
    let before = flags.len();
    flags.retain(|f| !names.contains(&f.name.as_str()));
    before != flags.len()
}
