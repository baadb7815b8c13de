// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Human-readable dump of the graph content

use std::fmt::Display;

use crate::flags::Flag;
use crate::graph::MappingMap;
use crate::history;
use crate::node::{NodeData, NodeMap};
use crate::targets::Targets;

/// Width of the dump frame, between the corner characters.
const FRAME_WIDTH: usize = 100;

/// Horizontal rule of the dump frame: `=` around the header, `-` between
/// nodes.
fn rule(f: &mut std::fmt::Formatter<'_>, fill: char) -> std::fmt::Result {
    writeln!(f, "+{}+", fill.to_string().repeat(FRAME_WIDTH))
}

/// Framed header naming the dump on the left and the node count on the right.
fn banner(f: &mut std::fmt::Formatter<'_>, count: usize) -> std::fmt::Result {
    const TITLE: &str = "GRAPH DUMP";
    let count = format!("{count} nodes");
    let width = FRAME_WIDTH.saturating_sub(TITLE.len() + 2);
    rule(f, '=')?;
    writeln!(f, "| {TITLE}{count:>width$} |")?;
    rule(f, '=')
}

fn fmt_flags(flags: &[Flag]) -> String {
    flags
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Targets, with edges whose label is the key of their only node shortened
/// to the label.
fn fmt_targets(targets: &Targets) -> String {
    let mut out = String::new();
    let mut relation: Option<&str> = None;
    for target in targets.iter() {
        if relation == Some(target.relation.as_str()) {
            out += ", ";
        } else {
            if relation.is_some() {
                out += "}, ";
            }
            out += &format!("[{}]{{", target.relation);
            relation = Some(target.relation.as_str());
        }
        if target.matching_keys.len() == 1 && target.matching_keys.contains(&target.label) {
            out += &target.label;
        } else {
            out += &format!(
                "{} -> {}",
                target.label,
                crate::targets::fmt_keys(&target.matching_keys)
            );
        }
    }
    if relation.is_some() {
        out += "}";
    }
    out
}

struct GraphDump<'a> {
    nodes: &'a NodeMap,
    mappings: &'a MappingMap,
}

impl GraphDump<'_> {
    fn fmt_node(&self, f: &mut std::fmt::Formatter<'_>, node: &NodeData) -> std::fmt::Result {
        writeln!(f, "| Key     : {:?}", node.key)?;
        if node.label() != node.key {
            writeln!(f, "| Label   : {}", node.label())?;
        }
        match &node.value {
            Some(value) => writeln!(f, "| Value   : [{}] {value}", value.value_type())?,
            None => writeln!(f, "| Value   : <NONE>")?,
        }
        writeln!(f, "| Flags   : {}", fmt_flags(&node.flags))?;
        if !node.targets.is_empty() {
            writeln!(f, "| Targets : {}", fmt_targets(&node.targets))?;
        }
        if !node.sources.is_empty() {
            writeln!(f, "| Sources : {}", fmt_targets(&node.sources))?;
        }
        let metadata = history::metadata_fields(node, self.mappings);
        if !metadata.is_empty() {
            writeln!(f, "| Metadata: {metadata:?}")?;
        }
        Ok(())
    }
}

impl Display for GraphDump<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        banner(f, self.nodes.len())?;
        for node in self.nodes.values() {
            self.fmt_node(f, node)?;
            rule(f, '-')?;
        }
        Ok(())
    }
}

pub(crate) fn dump(nodes: &NodeMap, mappings: &MappingMap) -> String {
    GraphDump { nodes, mappings }.to_string()
}
