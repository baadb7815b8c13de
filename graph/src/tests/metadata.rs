// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use idxmap::{MappingEvent, MemNamedMapping, NamedMapping};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tracing_test::traced_test;

use super::*;
use crate::read::ReadAccess;
use crate::write::RwAccess;

fn stored_integer(mapping: &(impl NamedMapping + ?Sized), label: &str) -> Option<i32> {
    mapping
        .get_value(label)
        .and_then(|item| item.downcast_ref::<OnlyInteger>().map(|m| m.integer))
}

#[test]
fn test_metadata_saved_into_map() {
    let graph = new_graph();
    let map_a = integer_map(METADATA_MAP_A);
    let mut writer = graph.write(true);
    writer.register_metadata_map(METADATA_MAP_A, map_a.clone());
    {
        let mut node = writer.set_node(&key_a(1));
        node.set_value(string_value("label1", "value1"));
        node.set_metadata_map(METADATA_MAP_A);
        node.set_metadata(Some(integer_meta(1)));
    }
    // nothing stored before the save
    assert!(map_a.is_empty());
    writer.save();
    writer.release();

    let reader = graph.read();
    let mapping = reader.get_metadata_map(METADATA_MAP_A).unwrap();
    assert_eq!(mapping.list_all_names(), vec!["label1".to_string()]);
    assert_eq!(stored_integer(&*mapping, "label1"), Some(1));
    assert_eq!(mapping.list_names(INTEGER_FIELD, "1"), vec!["label1".to_string()]);

    let node = reader.get_node(&key_a(1)).unwrap();
    assert_eq!(node.get_metadata_map(), Some(METADATA_MAP_A));
    let metadata = node.get_metadata().unwrap();
    assert_eq!(metadata.downcast_ref::<OnlyInteger>(), Some(&OnlyInteger { integer: 1 }));

    let timeline = reader.get_node_timeline(&key_a(1));
    assert_eq!(
        timeline[0].metadata_fields.get(INTEGER_FIELD),
        Some(&vec!["1".to_string()])
    );
}

#[test]
fn test_metadata_updates() {
    let graph = new_graph();
    let map_a = integer_map(METADATA_MAP_A);
    let mut writer = graph.write(false);
    writer.register_metadata_map(METADATA_MAP_A, map_a.clone());
    {
        let mut node = writer.set_node(&key_a(1));
        node.set_value(string_value("label1", "value1"));
        node.set_metadata_map(METADATA_MAP_A);
        node.set_metadata(Some(integer_meta(1)));
    }
    writer.save();

    // new metadata for the same label
    writer.set_node(&key_a(1)).set_metadata(Some(integer_meta(2)));
    writer.save();
    assert_eq!(stored_integer(&*map_a, "label1"), Some(2));
    assert!(map_a.list_names(INTEGER_FIELD, "1").is_empty());

    // new label: the metadata moves with it
    writer.set_node(&key_a(1)).set_value(string_value("label2", "value2"));
    writer.save();
    assert_eq!(map_a.list_all_names(), vec!["label2".to_string()]);
    assert_eq!(stored_integer(&*map_a, "label2"), Some(2));

    // metadata removed
    writer.set_node(&key_a(1)).set_metadata(None);
    writer.save();
    assert!(map_a.is_empty());
    writer.release();

    assert!(graph.read().get_node(&key_a(1)).unwrap().get_metadata().is_none());
}

#[test]
fn test_metadata_removed_with_node() {
    let graph = new_graph();
    let map_a = integer_map(METADATA_MAP_A);
    let mut writer = graph.write(false);
    writer.register_metadata_map(METADATA_MAP_A, map_a.clone());
    for i in 1..=2 {
        let mut node = writer.set_node(&key_a(i));
        node.set_value(string_value(&format!("label{i}"), "value"));
        node.set_metadata_map(METADATA_MAP_A);
        node.set_metadata(Some(integer_meta(i32::try_from(i).unwrap())));
    }
    writer.save();
    assert_eq!(map_a.len(), 2);

    writer.delete_node(&key_a(1));
    writer.save();
    assert_eq!(map_a.list_all_names(), vec!["label2".to_string()]);

    // deleted and re-created without metadata within the same save
    writer.delete_node(&key_a(2));
    writer.set_node(&key_a(2)).set_value(string_value("label2", "value"));
    writer.save();
    writer.release();
    assert!(map_a.is_empty());
}

#[test]
fn test_metadata_map_binding_is_sticky() {
    let graph = new_graph();
    let map_a = integer_map(METADATA_MAP_A);
    let map_b = integer_map(METADATA_MAP_B);
    let mut writer = graph.write(false);
    writer.register_metadata_map(METADATA_MAP_A, map_a.clone());
    writer.register_metadata_map(METADATA_MAP_B, map_b.clone());
    {
        let mut node = writer.set_node(&key_a(1));
        node.set_value(string_value("label1", "value1"));
        node.set_metadata_map(METADATA_MAP_A);
        node.set_metadata_map(METADATA_MAP_B);
        node.set_metadata(Some(integer_meta(1)));
    }
    writer.save();
    writer.set_node(&key_a(1)).set_metadata_map(METADATA_MAP_B);
    writer.save();
    writer.release();

    let reader = graph.read();
    let node = reader.get_node(&key_a(1)).unwrap();
    assert_eq!(node.get_metadata_map(), Some(METADATA_MAP_A));
    assert_eq!(map_a.list_all_names(), vec!["label1".to_string()]);
    assert!(map_b.is_empty());
}

#[test]
fn test_first_registration_wins() {
    let graph = new_graph();
    let first = integer_map(METADATA_MAP_A);
    let second = integer_map(METADATA_MAP_A);

    let mut writer1 = graph.write(false);
    let mut writer2 = graph.write(false);
    writer1.register_metadata_map(METADATA_MAP_A, first.clone());
    writer2.register_metadata_map(METADATA_MAP_A, second.clone());
    // within one handle, the first registration wins too
    writer2.register_metadata_map(METADATA_MAP_A, integer_map(METADATA_MAP_A));
    writer1.save();
    writer1.release();

    {
        let mut node = writer2.set_node(&key_a(1));
        node.set_value(string_value("label1", "value1"));
        node.set_metadata_map(METADATA_MAP_A);
        node.set_metadata(Some(integer_meta(1)));
    }
    writer2.save();
    writer2.release();

    assert_eq!(first.list_all_names(), vec!["label1".to_string()]);
    assert!(second.is_empty());
    let registered = graph.read().get_metadata_map(METADATA_MAP_A).unwrap();
    let first: Arc<dyn idxmap::NamedMappingRw> = first;
    assert!(Arc::ptr_eq(&registered, &first));
}

#[test]
#[traced_test]
fn test_unregistered_metadata_map() {
    let graph = new_graph();
    let mut writer = graph.write(false);
    {
        let mut node = writer.set_node(&key_a(1));
        node.set_value(string_value("label1", "value1"));
        node.set_metadata_map(METADATA_MAP_B);
        node.set_metadata(Some(integer_meta(1)));
    }
    writer.save();
    writer.release();

    let reader = graph.read();
    assert!(reader.get_metadata_map(METADATA_MAP_B).is_none());
    assert!(reader.get_node(&key_a(1)).unwrap().get_metadata().is_some());
    assert!(logs_contain("which is not registered"));
}

#[test]
fn test_metadata_stored_once_map_registered() {
    let graph = new_graph();
    let mut writer = graph.write(false);
    {
        let mut node = writer.set_node(&key_a(1));
        node.set_value(string_value("label1", "value1"));
        node.set_metadata_map(METADATA_MAP_B);
        node.set_metadata(Some(integer_meta(1)));
    }
    writer.save();
    writer.release();

    let map_b = integer_map(METADATA_MAP_B);
    let mut writer = graph.write(false);
    writer.register_metadata_map(METADATA_MAP_B, map_b.clone());
    writer.save();
    assert_eq!(map_b.list_all_names(), vec!["label1".to_string()]);
    assert_eq!(stored_integer(&*map_b, "label1"), Some(1));

    // kept in sync from then on
    writer.set_node(&key_a(1)).set_value(string_value("label2", "value2"));
    writer.save();
    writer.release();
    assert_eq!(map_b.list_all_names(), vec!["label2".to_string()]);
}

#[test]
fn test_metadata_map_watchers() {
    let graph = new_graph();
    let map_a = Arc::new(MemNamedMapping::new(METADATA_MAP_A));
    let events = Arc::new(parking_lot::Mutex::new(vec![]));
    let sink = events.clone();
    map_a.watch(
        "test",
        Box::new(move |event: &MappingEvent| sink.lock().push((event.name.clone(), event.kind))),
    );

    let mut writer = graph.write(false);
    writer.register_metadata_map(METADATA_MAP_A, map_a.clone());
    {
        let mut node = writer.set_node(&key_a(1));
        node.set_value(string_value("label1", "value1"));
        node.set_metadata_map(METADATA_MAP_A);
        node.set_metadata(Some(integer_meta(1)));
    }
    writer.save();
    writer.set_node(&key_a(1)).set_metadata(Some(integer_meta(2)));
    writer.save();
    writer.delete_node(&key_a(1));
    writer.save();
    writer.release();

    use idxmap::MappingEventKind::{Delete, Put, Update};
    let label = "label1".to_string();
    assert_eq!(
        *events.lock(),
        vec![(label.clone(), Put), (label.clone(), Update), (label, Delete)]
    );
}
