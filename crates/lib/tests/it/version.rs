//! Version vector integration tests
//!
//! Covers causal ordering between replicas and the way node edits move a
//! node's vector forward.

use sptree::{LifespanId, VersionVector};

use crate::helpers::*;

// ===== CAUSAL ORDER =====

#[test]
fn test_replicas_diverge_and_sync() {
    let a = LifespanId::random();
    let b = LifespanId::random();
    let base = VersionVector::new().incr(a);

    let left = base.incr(a);
    let right = base.incr(b);
    assert!(base.happened_before(&left));
    assert!(base.happened_before(&right));
    assert!(left.is_concurrent(&right));

    let merged = left.sync(&right);
    assert!(merged.after(&left));
    assert!(merged.after(&right));
    assert_eq!(merged.get(&a), 2);
    assert_eq!(merged.get(&b), 1);
}

#[test]
fn test_vector_json_form() {
    let a = LifespanId::random();
    let vv = VersionVector::new().incr(a).incr(a);
    let json = serde_json::to_value(&vv).unwrap();
    assert_eq!(json[a.to_string()], 2);

    let back: VersionVector = serde_json::from_value(json).unwrap();
    assert_eq!(back, vv);
}

// ===== NODE VERSIONS =====

#[test]
fn test_local_counter_never_decreases() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let obs = factory.create_observation(&program, None, None).unwrap();
    program.add_observation(&obs).unwrap();

    let mut last = obs.local_version();
    for i in 0..5 {
        obs.set_data_object(Box::new(ObsData::titled(&format!("take {i}"))))
            .unwrap();
        let now = obs.local_version();
        assert!(now > last, "{now} should exceed {last}");
        last = now;
    }
}

#[test]
fn test_unchanged_data_object_keeps_version() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let obs = factory.create_observation(&program, None, None).unwrap();
    program.add_observation(&obs).unwrap();

    obs.set_data_object(Box::new(ObsData::titled("same"))).unwrap();
    let version = obs.version_vector();
    let id = obs
        .set_data_object(Box::new(ObsData::titled("same")))
        .unwrap();
    assert!(id.is_empty());
    assert_eq!(obs.version_vector(), version);
}

#[test]
fn test_forced_version() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let obs = factory.create_observation(&program, None, None).unwrap();
    program.add_observation(&obs).unwrap();

    let remote = LifespanId::random();
    let forced = VersionVector::new().with(remote, 7);
    obs.set_data_object_and_version(Box::new(ObsData::titled("restored")), forced.clone())
        .unwrap();
    assert_eq!(obs.version_vector(), forced);
    assert_eq!(obs.local_version(), 0);
}
