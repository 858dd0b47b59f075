//! Document state integration tests
//!
//! Covers the modification clock, the version map, document client data, the
//! observation number counter and sweeping of detached nodes.

use std::sync::Arc;

use serde_json::json;
use sptree::{FixedClock, LifespanId, LockRegistry, NodeKey, VersionMap, VersionVector};

use crate::helpers::*;

// ===== MODIFICATION CLOCK =====

#[test]
fn test_last_modified_follows_clock() {
    let clock = Arc::new(FixedClock::new(5_000));
    let factory = test_factory_with(clock.clone(), Arc::new(LockRegistry::new()));
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document().clone();
    assert_eq!(doc.last_modified(), 5_000);

    clock.set(9_000);
    let _hold = clock.hold();
    let obs = factory.create_observation(&program, None, None).unwrap();
    program.add_observation(&obs).unwrap();
    assert_eq!(doc.last_modified(), 9_000);
    assert_eq!(doc.last_modified_rfc3339(), "1970-01-01T00:00:09+00:00");
}

#[test]
fn test_unversioned_change_keeps_clock() {
    let clock = Arc::new(FixedClock::new(1_000));
    let factory = test_factory_with(clock.clone(), Arc::new(LockRegistry::new()));
    let program = factory.create_program(None, None).unwrap();
    let before = program.document().last_modified();

    // a detached observation is scratch state
    let obs = factory.create_observation(&program, None, None).unwrap();
    obs.set_data_object(Box::new(ObsData::titled("draft"))).unwrap();
    assert_eq!(program.document().last_modified(), before);
}

// ===== VERSIONS =====

#[test]
fn test_transient_node_has_no_version_until_attached() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document();

    let obs = factory.create_observation(&program, None, None).unwrap();
    obs.set_data_object(Box::new(ObsData::titled("draft"))).unwrap();
    assert!(!doc.contains_version(&obs.key()));
    assert!(doc.next_version(&obs).is_empty());

    program.add_observation(&obs).unwrap();
    assert!(doc.contains_version(&obs.key()));
    assert_eq!(obs.local_version(), 1);
}

#[test]
fn test_root_is_always_versioned() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document();
    assert!(!doc.contains_version(&program.key()));

    doc.mark_modified(&program).unwrap();
    assert_eq!(program.local_version(), 1);
    assert_eq!(doc.local_version(&program.key()), 1);
}

#[test]
fn test_mark_modified_needs_write_access() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document();

    let _r = doc.read_operation();
    let err = doc.mark_modified(&program).unwrap_err();
    assert!(err.is_lock_error());
}

#[test]
fn test_set_version_vector_and_bulk_replace() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document();
    let remote = LifespanId::random();
    let other = NodeKey::new();

    let vv = VersionVector::new().with(remote, 3);
    doc.set_version_vector(program.key(), vv.clone()).unwrap();
    assert_eq!(doc.version_vector(&program.key()), vv);

    doc.set_version_vector(program.key(), VersionVector::new())
        .unwrap();
    assert!(!doc.contains_version(&program.key()));

    let mut map = VersionMap::new();
    map.insert(other, vv.clone());
    map.insert(program.key(), VersionVector::new());
    doc.set_versions(map).unwrap();
    let versions = doc.versions();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions.get(&other), Some(&vv));
}

#[test]
fn test_mark_modified_with_skips_empty_vectors() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document();
    let before = doc.last_modified();

    doc.mark_modified_with(program.key(), VersionVector::new())
        .unwrap();
    assert!(!doc.contains_version(&program.key()));
    assert_eq!(doc.last_modified(), before);
}

// ===== CLIENT DATA =====

#[test]
fn test_document_client_data() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document();

    doc.put_client_data("zeta", json!(1)).unwrap();
    doc.put_client_data("alpha", json!({"x": true})).unwrap();
    assert_eq!(doc.client_data_keys(), vec!["alpha", "zeta"]);
    assert_eq!(doc.client_data("alpha"), Some(json!({"x": true})));

    assert_eq!(doc.remove_client_data("zeta").unwrap(), Some(json!(1)));
    assert_eq!(doc.remove_client_data("zeta").unwrap(), None);
    assert!(doc.client_data("zeta").is_none());
}

// ===== OBSERVATION NUMBERS =====

#[test]
fn test_observation_counter() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document();

    assert_eq!(doc.max_observation_number(), 0);
    assert_eq!(doc.next_observation_number().unwrap(), 1);
    doc.ensure_observation_number_at_least(10).unwrap();
    doc.ensure_observation_number_at_least(4).unwrap();
    assert_eq!(doc.max_observation_number(), 10);
    assert_eq!(doc.next_observation_number().unwrap(), 11);
}

// ===== ARENA =====

#[test]
fn test_sweep_drops_unreachable_nodes() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document().clone();

    let kept = factory.create_observation(&program, None, None).unwrap();
    program.add_observation(&kept).unwrap();
    let held = factory.create_group(&program, None).unwrap();
    let dropped = factory.create_group(&program, None).unwrap();
    let dropped_key = dropped.key();
    drop(dropped);
    let kept_key = kept.key();
    drop(kept);

    assert_eq!(doc.node_count(), 4);
    assert_eq!(doc.sweep().unwrap(), 1);
    assert_eq!(doc.node_count(), 3);
    assert!(doc.node(&dropped_key).is_none());
    assert!(doc.node(&kept_key).is_some());
    assert!(doc.node(&held.key()).is_some());
    assert_eq!(doc.root(), Some(program));
}

#[test]
fn test_sweep_keeps_the_parent_of_a_held_node() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let doc = program.document().clone();

    let group = factory.create_group(&program, None).unwrap();
    let obs = factory.create_observation(&program, None, None).unwrap();
    group.add_observation(&obs).unwrap();
    let group_key = group.key();
    drop(group);

    assert_eq!(doc.sweep().unwrap(), 0);
    let group = obs.parent().unwrap();
    assert_eq!(group.key(), group_key);

    // the observation can still leave its group and join the program
    group.remove_observation(&obs).unwrap();
    drop(group);
    assert_eq!(doc.sweep().unwrap(), 1);
    program.add_observation(&obs).unwrap();
    assert_eq!(obs.parent(), Some(program));
}
