// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory implementation of a named mapping

use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
#[allow(unused)]
use tracing::{debug, trace, warn};

use crate::{
    Fields, IndexFn, Item, MappingEvent, MappingEventKind, NamedMapping, NamedMappingRw, WatchFn,
};

struct Entry {
    value: Item,
    fields: Fields,
}

/// field -> field value -> names
type SecondaryIndex = HashMap<String, HashMap<String, BTreeSet<String>, RandomState>, RandomState>;

struct MappingData {
    entries: BTreeMap<String, Entry>,
    index: SecondaryIndex,
}

impl MappingData {
    fn index_entry(&mut self, name: &str, fields: &Fields) {
        for (field, values) in fields {
            let by_value = self
                .index
                .entry(field.clone())
                .or_insert_with(|| HashMap::with_hasher(RandomState::with_seed(0)));
            for value in values {
                by_value
                    .entry(value.clone())
                    .or_default()
                    .insert(name.to_string());
            }
        }
    }
    fn unindex_entry(&mut self, name: &str, fields: &Fields) {
        for (field, values) in fields {
            let Some(by_value) = self.index.get_mut(field) else {
                continue;
            };
            for value in values {
                if let Some(names) = by_value.get_mut(value) {
                    names.remove(name);
                    if names.is_empty() {
                        by_value.remove(value);
                    }
                }
            }
            if by_value.is_empty() {
                self.index.remove(field);
            }
        }
    }
}

/// A [`NamedMappingRw`] keeping everything in memory.
///
/// All methods take `&self`; the mapping is internally synchronized and meant
/// to be shared behind an `Arc`. Watchers are called after the internal lock
/// has been released, so a callback may safely read the mapping.
pub struct MemNamedMapping {
    title: String,
    index_fn: Option<IndexFn>,
    data: RwLock<MappingData>,
    watchers: RwLock<BTreeMap<String, WatchFn>>,
}

impl MemNamedMapping {
    /// Create a mapping without secondary indexes.
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            index_fn: None,
            data: RwLock::new(MappingData {
                entries: BTreeMap::new(),
                index: HashMap::with_hasher(RandomState::with_seed(0)),
            }),
            watchers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a mapping maintaining secondary indexes computed by `index_fn`.
    #[must_use]
    pub fn with_index(title: &str, index_fn: IndexFn) -> Self {
        Self {
            index_fn: Some(index_fn),
            ..Self::new(title)
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().entries.is_empty()
    }

    fn compute_fields(&self, value: &Item) -> Fields {
        match &self.index_fn {
            Some(index_fn) => index_fn(value),
            None => Fields::new(),
        }
    }

    fn notify(&self, name: &str, kind: MappingEventKind, value: Item) {
        let watchers = self.watchers.read();
        if watchers.is_empty() {
            return;
        }
        let event = MappingEvent {
            registry: self.title.clone(),
            name: name.to_string(),
            kind,
            value,
        };
        for (subscriber, callback) in watchers.iter() {
            trace!("Notifying {subscriber} of {kind} of '{name}' in {}", self.title);
            callback(&event);
        }
    }

    /// Store the entry, returning true if it replaced an existing one.
    fn store(&self, name: &str, value: &Item) -> bool {
        let fields = self.compute_fields(value);
        let mut data = self.data.write();
        let replaced = data.entries.remove(name);
        if let Some(old) = &replaced {
            data.unindex_entry(name, &old.fields);
        }
        data.index_entry(name, &fields);
        data.entries.insert(
            name.to_string(),
            Entry {
                value: value.clone(),
                fields,
            },
        );
        replaced.is_some()
    }
}

impl NamedMapping for MemNamedMapping {
    fn title(&self) -> &str {
        &self.title
    }

    fn get_value(&self, name: &str) -> Option<Item> {
        self.data.read().entries.get(name).map(|e| e.value.clone())
    }

    fn list_all_names(&self) -> Vec<String> {
        self.data.read().entries.keys().cloned().collect()
    }

    fn list_names(&self, field: &str, value: &str) -> Vec<String> {
        let data = self.data.read();
        data.index
            .get(field)
            .and_then(|by_value| by_value.get(value))
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn list_fields(&self, name: &str) -> Fields {
        self.data
            .read()
            .entries
            .get(name)
            .map(|e| e.fields.clone())
            .unwrap_or_default()
    }

    fn watch(&self, subscriber: &str, callback: WatchFn) {
        debug!("{subscriber} is now watching {}", self.title);
        self.watchers.write().insert(subscriber.to_string(), callback);
    }
}

impl NamedMappingRw for MemNamedMapping {
    fn put(&self, name: &str, value: Item) {
        let replaced = self.store(name, &value);
        let kind = if replaced {
            MappingEventKind::Update
        } else {
            MappingEventKind::Put
        };
        self.notify(name, kind, value);
    }

    fn update(&self, name: &str, value: Item) -> bool {
        if !self.data.read().entries.contains_key(name) {
            return false;
        }
        self.store(name, &value);
        self.notify(name, MappingEventKind::Update, value);
        true
    }

    fn delete(&self, name: &str) -> Option<Item> {
        let removed = {
            let mut data = self.data.write();
            let removed = data.entries.remove(name)?;
            data.unindex_entry(name, &removed.fields);
            removed.value
        };
        self.notify(name, MappingEventKind::Delete, removed.clone());
        Some(removed)
    }

    fn clear(&self) {
        let removed = {
            let mut data = self.data.write();
            data.index.clear();
            std::mem::take(&mut data.entries)
        };
        for (name, entry) in removed {
            self.notify(&name, MappingEventKind::Delete, entry.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    struct IfMeta {
        sw_if_index: u32,
        ip_addresses: Vec<&'static str>,
    }

    fn if_meta(sw_if_index: u32, ip_addresses: &[&'static str]) -> Item {
        Arc::new(IfMeta {
            sw_if_index,
            ip_addresses: ip_addresses.to_vec(),
        })
    }

    fn if_index_fn() -> IndexFn {
        Box::new(|item: &Item| {
            let mut fields = Fields::new();
            if let Some(meta) = item.downcast_ref::<IfMeta>() {
                fields.insert(
                    "ip-address".to_string(),
                    meta.ip_addresses.iter().map(ToString::to_string).collect(),
                );
            }
            fields
        })
    }

    fn sw_if_index(mapping: &MemNamedMapping, name: &str) -> Option<u32> {
        mapping
            .get_value(name)
            .and_then(|item| item.downcast_ref::<IfMeta>().map(|m| m.sw_if_index))
    }

    #[test]
    fn test_put_get_delete() {
        let mapping = MemNamedMapping::new("interfaces");
        assert!(mapping.is_empty());

        mapping.put("loop0", if_meta(1, &[]));
        mapping.put("tap0", if_meta(2, &[]));
        assert_eq!(mapping.len(), 2);
        assert_eq!(sw_if_index(&mapping, "loop0"), Some(1));
        assert_eq!(mapping.list_all_names(), vec!["loop0", "tap0"]);

        mapping.put("loop0", if_meta(5, &[]));
        assert_eq!(sw_if_index(&mapping, "loop0"), Some(5));
        assert_eq!(mapping.len(), 2);

        let removed = mapping.delete("loop0");
        assert!(removed.is_some());
        assert!(mapping.get_value("loop0").is_none());
        assert!(mapping.delete("loop0").is_none());
        assert_eq!(mapping.list_all_names(), vec!["tap0"]);
    }

    #[test]
    fn test_update_requires_existing_entry() {
        let mapping = MemNamedMapping::new("interfaces");
        assert!(!mapping.update("loop0", if_meta(1, &[])));
        assert!(mapping.get_value("loop0").is_none());

        mapping.put("loop0", if_meta(1, &[]));
        assert!(mapping.update("loop0", if_meta(2, &[])));
        assert_eq!(sw_if_index(&mapping, "loop0"), Some(2));
    }

    #[test]
    fn test_secondary_index() {
        let mapping = MemNamedMapping::with_index("interfaces", if_index_fn());
        mapping.put("loop0", if_meta(1, &["10.0.0.1/24", "10.0.1.1/24"]));
        mapping.put("tap0", if_meta(2, &["10.0.0.1/24"]));

        assert_eq!(mapping.list_names("ip-address", "10.0.0.1/24"), vec!["loop0", "tap0"]);
        assert_eq!(mapping.list_names("ip-address", "10.0.1.1/24"), vec!["loop0"]);
        assert!(mapping.list_names("ip-address", "192.168.0.1/24").is_empty());
        assert!(mapping.list_names("no-such-field", "10.0.0.1/24").is_empty());

        let fields = mapping.list_fields("loop0");
        assert_eq!(
            fields.get("ip-address"),
            Some(&vec!["10.0.0.1/24".to_string(), "10.0.1.1/24".to_string()])
        );

        // re-indexed on update
        mapping.update("loop0", if_meta(1, &["10.0.2.1/24"]));
        assert_eq!(mapping.list_names("ip-address", "10.0.0.1/24"), vec!["tap0"]);
        assert_eq!(mapping.list_names("ip-address", "10.0.2.1/24"), vec!["loop0"]);

        // un-indexed on delete
        mapping.delete("tap0");
        assert!(mapping.list_names("ip-address", "10.0.0.1/24").is_empty());
        assert!(mapping.list_fields("tap0").is_empty());
    }

    #[test]
    fn test_list_fields_without_index() {
        let mapping = MemNamedMapping::new("plain");
        mapping.put("a", if_meta(1, &["10.0.0.1/24"]));
        assert!(mapping.list_fields("a").is_empty());
    }

    #[test]
    #[traced_test]
    fn test_watch() {
        let mapping = MemNamedMapping::new("interfaces");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        mapping.watch(
            "test",
            Box::new(move |event| {
                if let Ok(mut sink) = sink.lock() {
                    sink.push((event.name.clone(), event.kind));
                }
            }),
        );

        mapping.put("loop0", if_meta(1, &[]));
        mapping.put("loop0", if_meta(2, &[]));
        mapping.update("loop0", if_meta(3, &[]));
        mapping.update("tap0", if_meta(3, &[]));
        mapping.put("tap0", if_meta(4, &[]));
        mapping.delete("loop0");
        mapping.clear();

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                ("loop0".to_string(), MappingEventKind::Put),
                ("loop0".to_string(), MappingEventKind::Update),
                ("loop0".to_string(), MappingEventKind::Update),
                ("tap0".to_string(), MappingEventKind::Put),
                ("loop0".to_string(), MappingEventKind::Delete),
                ("tap0".to_string(), MappingEventKind::Delete),
            ]
        );
        assert!(mapping.is_empty());
        assert!(logs_contain("test is now watching interfaces"));
    }

    #[test]
    fn test_watcher_may_read_mapping() {
        let mapping = Arc::new(MemNamedMapping::new("interfaces"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (reader, sink) = (Arc::downgrade(&mapping), seen.clone());
        mapping.watch(
            "reader",
            Box::new(move |event| {
                if let (Some(mapping), Ok(mut sink)) = (reader.upgrade(), sink.lock()) {
                    sink.push((event.name.clone(), mapping.get_value(&event.name).is_some()));
                }
            }),
        );
        mapping.put("loop0", if_meta(1, &[]));
        mapping.delete("loop0");
        assert_eq!(
            seen.lock().unwrap().clone(),
            vec![("loop0".to_string(), true), ("loop0".to_string(), false)]
        );
    }
}
