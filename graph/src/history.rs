// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Recording of node revisions and upkeep of metadata maps
//!
//! Every saved change of the data or of the targets of a node produces a new
//! revision of the node, appended to its timeline when the write handle is
//! released. Revisions are valid from `since` (included) to `until`
//! (excluded). The last revision of a node present in the graph is open
//! (no `until`); the timeline of a deleted node ends with a closed revision.

use chrono::{DateTime, TimeDelta, Utc};
use idxmap::{Fields, NamedMappingRw};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, trace, warn};

use crate::flags::{FlagStats, RecordedFlags};
use crate::graph::{GraphState, MappingMap, Timeline};
use crate::node::{NodeData, NodeMap};
use crate::opts::GraphOpts;
use crate::targets::Targets;
use crate::value::RecordedValue;

/// Minimum time between two trimmings of old revisions.
pub(crate) fn trimming_period() -> TimeDelta {
    TimeDelta::minutes(1)
}

/// A revision of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedNode {
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
    pub key: String,
    pub label: String,
    pub value: Option<RecordedValue>,
    pub flags: RecordedFlags,
    /// Secondary fields of the metadata, as computed by the metadata map.
    pub metadata_fields: Fields,
    pub targets: Targets,
    /// The revision was caused only by a change of the targets.
    pub target_update_only: bool,
}

impl RecordedNode {
    /// Value of the given flag in this revision.
    #[must_use]
    pub fn get_flag(&self, name: &str) -> Option<&str> {
        self.flags.get_flag(name)
    }

    /// Check if the revision was current at the given time.
    #[must_use]
    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        self.since <= time && self.until.is_none_or(|until| time < until)
    }
}

/// Secondary fields of the metadata stored for a node.
pub(crate) fn metadata_fields(node: &NodeData, mappings: &MappingMap) -> Fields {
    let (Some(map_name), Some(label)) = (&node.metadata_map, &node.metadata_label) else {
        return Fields::new();
    };
    mappings
        .get(map_name)
        .map(|mapping| mapping.list_fields(label))
        .unwrap_or_default()
}

fn record_node(
    node: &NodeData,
    mappings: &MappingMap,
    target_update_only: bool,
    since: DateTime<Utc>,
) -> RecordedNode {
    RecordedNode {
        since,
        until: None,
        key: node.key.clone(),
        label: node.label().to_string(),
        value: node.value.as_deref().map(RecordedValue::new),
        flags: RecordedFlags::new(&node.flags),
        metadata_fields: metadata_fields(node, mappings),
        targets: node.targets.clone(),
        target_update_only,
    }
}

/// Append the revisions of the saved nodes (key -> data updated) to their
/// timelines, closing the revisions they replace.
pub(crate) fn append_revisions(
    state: &mut GraphState,
    new_revs: BTreeMap<String, bool>,
    now: DateTime<Utc>,
) {
    let mut appended = 0usize;
    for (key, data_updated) in new_revs {
        let node = state.nodes.get(&key);
        if node.is_none() && !state.timeline.contains_key(&key) {
            // deleted, but never recorded
            continue;
        }
        let records = state.timeline.entry(key).or_default();
        if let Some(last) = records.last_mut() {
            if last.until.is_none() {
                last.until = Some(now);
            }
        }
        if let Some(node) = node {
            records.push(record_node(node, &state.mappings, !data_updated, now));
            appended += 1;
        }
    }
    debug!("Recorded {appended} node revisions");
}

/// Remove the revisions that are too old to keep. Revisions created during
/// the permanent init period after `start_time` are kept forever.
pub(crate) fn trim_old_revisions(
    timeline: &mut Timeline,
    now: DateTime<Utc>,
    start_time: DateTime<Utc>,
    opts: &GraphOpts,
) {
    let init_period = opts.permanent_init_period();
    let age_limit = opts.record_age_limit();
    let mut trimmed = 0usize;

    timeline.retain(|key, records| {
        // first revision after the init period
        let first = records
            .iter()
            .position(|r| r.since - start_time > init_period)
            .unwrap_or(records.len());
        // first revision after the init period to keep
        let keep = records[first..]
            .iter()
            .position(|r| r.until.is_none_or(|until| now - until <= age_limit))
            .map_or(records.len(), |pos| first + pos);
        if keep > first {
            trace!("Trimming {} revisions of {key}", keep - first);
            trimmed += keep - first;
            records.drain(first..keep);
        }
        !records.is_empty()
    });
    if trimmed > 0 {
        debug!("Trimmed {trimmed} old revisions");
    }
}

pub(crate) fn flag_stats(
    timeline: &Timeline,
    flag_name: &str,
    key_selector: Option<&dyn Fn(&str) -> bool>,
) -> FlagStats {
    let mut stats = FlagStats::default();
    let records = timeline
        .iter()
        .filter(|(key, _)| key_selector.is_none_or(|select| select(key.as_str())))
        .flat_map(|(_, records)| records.iter())
        .filter(|record| !record.target_update_only);
    for record in records {
        if let Some(value) = record.get_flag(flag_name) {
            stats.total_count += 1;
            *stats.per_value_count.entry(value.to_string()).or_default() += 1;
        }
    }
    stats
}

pub(crate) fn snapshot(timeline: &Timeline, time: DateTime<Utc>) -> Vec<RecordedNode> {
    timeline
        .values()
        .filter_map(|records| records.iter().find(|r| r.is_valid_at(time)))
        .cloned()
        .collect()
}

fn bound_mapping<'m>(
    mappings: &'m MappingMap,
    map_name: &str,
    key: &str,
) -> Option<&'m Arc<dyn NamedMappingRw>> {
    let mapping = mappings.get(map_name);
    if mapping.is_none() {
        warn!("Node {key} is bound to metadata map {map_name} which is not registered");
    }
    mapping
}

/// Bring the metadata map the node is bound to in line with the metadata of
/// the node. `published` is the revision of the node being replaced, which
/// tells under which map and label the metadata is currently stored.
pub(crate) fn sync_metadata(
    node: &mut NodeData,
    published: Option<&NodeData>,
    mappings: &MappingMap,
) {
    let stored = published.and_then(|p| p.metadata_map.clone().zip(p.metadata_label.clone()));
    let current = node.metadata_map.clone().zip(node.metadata_label.clone());
    if node.meta_in_sync && stored == current {
        return;
    }
    let wanted = match (&node.metadata, &node.metadata_map) {
        (Some(_), Some(map_name)) => Some((map_name.clone(), node.label().to_string())),
        _ => None,
    };

    if let Some((map_name, label)) = &stored {
        if wanted.as_ref() != stored.as_ref() {
            if let Some(mapping) = bound_mapping(mappings, map_name, &node.key) {
                trace!("Removing metadata of {label} from {map_name}");
                mapping.delete(label);
            }
        }
    }

    node.metadata_label = None;
    let (Some((map_name, label)), Some(metadata)) = (wanted, &node.metadata) else {
        return;
    };
    let Some(mapping) = bound_mapping(mappings, &map_name, &node.key) else {
        return;
    };
    let stored_here = stored
        .as_ref()
        .is_some_and(|(m, l)| *m == map_name && *l == label);
    if !stored_here || !mapping.update(&label, metadata.clone()) {
        trace!("Adding metadata of {label} into {map_name}");
        mapping.put(&label, metadata.clone());
    }
    node.metadata_label = Some(label);
}

/// Store the metadata of the published nodes bound to a map registered only
/// after the metadata was set.
pub(crate) fn attach_bound_nodes(
    nodes: &mut NodeMap,
    map_name: &str,
    mapping: &dyn NamedMappingRw,
) {
    for node in nodes.values_mut() {
        let pending = node.metadata.is_some()
            && node.metadata_label.is_none()
            && node.metadata_map.as_deref() == Some(map_name);
        if !pending {
            continue;
        }
        let node = Arc::make_mut(node);
        let label = node.label().to_string();
        if let Some(metadata) = &node.metadata {
            trace!("Adding metadata of {label} into {map_name}");
            mapping.put(&label, metadata.clone());
        }
        node.metadata_label = Some(label);
    }
}

/// Remove the metadata of a node deleted from the graph.
pub(crate) fn remove_metadata(node: &NodeData, mappings: &MappingMap) {
    let (Some(map_name), Some(label)) = (&node.metadata_map, &node.metadata_label) else {
        return;
    };
    if let Some(mapping) = mappings.get(map_name) {
        trace!("Removing metadata of {label} from {map_name}");
        mapping.delete(label);
    }
}
