// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Named mappings: registries associating a name (typically the label of a
//! configuration value) with an opaque item (typically metadata produced when
//! the value was applied).
//!
//! Besides primary lookups by name, a mapping may maintain secondary indexes.
//! An [`IndexFn`] computes, for every stored item, a set of `field -> values`
//! pairs; items can then be looked up by field value with
//! [`NamedMapping::list_names`].

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod mem;

pub use mem::MemNamedMapping;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

/// An item stored in a mapping. Mappings never look inside.
pub type Item = Arc<dyn Any + Send + Sync>;

/// Secondary fields of an item: field name -> field values.
pub type Fields = BTreeMap<String, Vec<String>>;

/// Function computing the secondary fields of an item.
pub type IndexFn = Box<dyn Fn(&Item) -> Fields + Send + Sync>;

/// Callback invoked for every change of a watched mapping.
pub type WatchFn = Box<dyn Fn(&MappingEvent) + Send + Sync>;

/// Type of change notified to watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingEventKind {
    Put,
    Update,
    Delete,
}

impl Display for MappingEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingEventKind::Put => write!(f, "put"),
            MappingEventKind::Update => write!(f, "update"),
            MappingEventKind::Delete => write!(f, "delete"),
        }
    }
}

/// A change of a single entry of a mapping.
#[derive(Clone)]
pub struct MappingEvent {
    /// Title of the mapping that changed.
    pub registry: String,
    /// Name of the entry.
    pub name: String,
    pub kind: MappingEventKind,
    /// The new item (put/update) or the removed one (delete).
    pub value: Item,
}

impl std::fmt::Debug for MappingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingEvent")
            .field("registry", &self.registry)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Read-only access to a named mapping.
pub trait NamedMapping: Send + Sync {
    /// Title of the registry, for logging and debugging.
    fn title(&self) -> &str;

    /// Item stored under the given name.
    fn get_value(&self, name: &str) -> Option<Item>;

    /// All names in the mapping, sorted.
    fn list_all_names(&self) -> Vec<String>;

    /// Names of the items whose secondary field `field` contains `value`, sorted.
    fn list_names(&self, field: &str, value: &str) -> Vec<String>;

    /// Secondary fields of the item stored under the given name. Empty if the
    /// name is unknown or the mapping has no index function.
    fn list_fields(&self, name: &str) -> Fields;

    /// Register a callback to be notified of every subsequent change.
    /// Registering again under the same subscriber replaces the callback.
    fn watch(&self, subscriber: &str, callback: WatchFn);
}

/// Read-write access to a named mapping.
pub trait NamedMappingRw: NamedMapping {
    /// Insert or replace the item stored under `name`.
    fn put(&self, name: &str, value: Item);

    /// Replace the item stored under `name`. Returns false if there was none.
    fn update(&self, name: &str, value: Item) -> bool;

    /// Remove the item stored under `name`, returning it.
    fn delete(&self, name: &str) -> Option<Item>;

    /// Remove all items. Watchers are notified once per removed item.
    fn clear(&self);
}
