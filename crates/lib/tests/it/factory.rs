//! Factory integration tests
//!
//! Creation of documents and nodes, initializers, and the copy operations.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;
use sptree::{
    DatabaseId, Factory, FactoryConfig, FactoryError, NodeKey, NodeType, ProgramId, VersionVector,
};

use crate::helpers::*;

// ===== CREATION =====

#[test]
fn test_create_program() {
    let factory = test_factory();
    let key = NodeKey::new();
    let program = factory
        .create_program(Some(key), Some("GN-2024B-Q-7".into()))
        .unwrap();

    assert_eq!(program.key(), key);
    assert_eq!(program.node_type(), NodeType::Program);
    assert_eq!(program.program_key(), key);
    assert_eq!(program.program_id(), Some(ProgramId::new("GN-2024B-Q-7")));
    assert_eq!(program.document().root(), Some(program.clone()));
    assert_eq!(program.document().database_id(), factory.database_id());
    assert!(program.parent().is_none());
}

#[test]
fn test_create_nightly_record() {
    let factory = test_factory();
    let record = factory.create_nightly_record(None, None).unwrap();
    assert_eq!(record.node_type(), NodeType::NightlyRecord);
    assert!(record.program_id().is_none());

    let obs = factory.create_observation(&record, None, None).unwrap();
    record.add_observation(&obs).unwrap();
    assert_eq!(record.observations(), vec![obs]);
}

#[test]
fn test_created_nodes_are_detached() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let group = factory.create_group(&program, None).unwrap();

    assert!(group.parent().is_none());
    assert!(group.version_vector().is_empty());
    assert_eq!(program.document().node(&group.key()), Some(group.clone()));
    assert!(program.children().is_empty());
}

#[test]
fn test_observation_numbers_from_factory() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();

    let first = factory.create_observation(&program, None, None).unwrap();
    let second = factory.create_observation(&program, None, None).unwrap();
    assert_eq!(first.observation_number(), Some(1));
    assert_eq!(second.observation_number(), Some(2));

    let tenth = factory.create_observation(&program, Some(10), None).unwrap();
    assert_eq!(tenth.observation_number(), Some(10));
    let next = factory.create_observation(&program, None, None).unwrap();
    assert_eq!(next.observation_number(), Some(11));

    // an explicit lower number does not lower the counter
    factory.create_observation(&program, Some(5), None).unwrap();
    assert_eq!(program.document().max_observation_number(), 11);
}

#[test]
fn test_invalid_observation_number() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();

    let err = factory
        .create_observation(&program, Some(0), None)
        .unwrap_err();
    assert!(err.is_validation_error());
    assert!(matches!(
        err,
        sptree::Error::Factory(FactoryError::InvalidObservationNumber { number: 0 })
    ));
    assert_eq!(err.module(), "factory");
}

#[test]
fn test_nodes_are_created_in_a_root() {
    let factory = test_factory();
    let s = sample_program(&factory);

    let err = factory.create_group(&s.obs1, None).unwrap_err();
    assert!(err.is_precondition());
    assert!(matches!(
        err,
        sptree::Error::Factory(FactoryError::NotARoot {
            node_type: NodeType::Observation,
            ..
        })
    ));
}

#[test]
fn test_duplicate_key_is_rejected() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let err = factory
        .create_group(&s.program, Some(s.group.key()))
        .unwrap_err();
    assert!(matches!(
        err,
        sptree::Error::Node(sptree::NodeError::DuplicateKey { .. })
    ));
}

// ===== INITIALIZERS =====

#[test]
fn test_initializers_populate_new_nodes() {
    let (factory, _) = initialized_factory();
    let program = factory.create_program(None, None).unwrap();

    let obs = factory.create_observation(&program, None, None).unwrap();
    assert_eq!(
        obs.data_object_as::<ObsData>(),
        Some(ObsData::titled("Observation 1"))
    );
    // initializing a detached node leaves it unversioned
    assert!(obs.version_vector().is_empty());

    let gmos_comp = factory.create_obs_component(&program, gmos(), None).unwrap();
    assert_eq!(gmos_comp.data_object_as::<Instrument>().unwrap().exposure, 60.0);

    // no initializer for this component type or for groups
    let other = factory
        .create_obs_component(&program, offset(), None)
        .unwrap();
    assert!(other.data_object().is_none());
    assert!(factory.create_group(&program, None).unwrap().data_object().is_none());
}

#[test]
fn test_initializers_registered_later() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    assert!(
        factory
            .create_seq_component(&program, offset(), None)
            .unwrap()
            .data_object()
            .is_none()
    );

    factory.register_seq_component_initializer(offset(), Arc::new(InstrumentInit));
    factory.register_initializer(NodeType::Group, Arc::new(InstrumentInit));

    let seq = factory.create_seq_component(&program, offset(), None).unwrap();
    assert!(seq.data_object_as::<Instrument>().is_some());
    let group = factory.create_group(&program, None).unwrap();
    assert!(group.data_object_as::<Instrument>().is_some());
}

// ===== CONFIGURATION =====

#[test]
fn test_builder_and_config() {
    let database_id = DatabaseId::random();
    let config: FactoryConfig = serde_json::from_value(json!({
        "database_id": database_id,
        "creatable_obs_components": [{ "broad": "Instrument", "narrow": "GMOS-N" }],
    }))
    .unwrap();
    let factory = Factory::builder().config(config).build();

    assert_eq!(factory.database_id(), database_id);
    assert_eq!(factory.creatable_obs_components(), vec![gmos()]);
    assert!(factory.creatable_seq_components().is_empty());

    factory.set_creatable_seq_components(vec![offset()]);
    assert_eq!(factory.creatable_seq_components(), vec![offset()]);

    let program = factory.create_program(None, None).unwrap();
    assert_eq!(program.document().database_id(), database_id);
    assert!(format!("{factory:?}").contains("Factory"));
}

#[test]
fn test_factories_sharing_a_registry_share_locks() {
    let locks = Arc::new(sptree::LockRegistry::new());
    let clock = Arc::new(sptree::FixedClock::default());
    let a = test_factory_with(clock.clone(), locks.clone());
    let b = test_factory_with(clock, locks);

    let program = a.create_program(None, None).unwrap();
    let copy = b.copy_with_same_keys(&program).unwrap();
    assert!(Arc::ptr_eq(program.document().lock(), copy.document().lock()));
}

// ===== SUBTREE COPIES =====

#[test]
fn test_copy_node_with_new_keys() {
    let (factory, obs_init) = initialized_factory();
    let s = sample_program(&factory);
    let before = obs_init.updates.load(Ordering::SeqCst);

    let copy = factory.copy_node(&s.program, &s.obs1, false).unwrap();
    assert_ne!(copy.key(), s.obs1.key());
    assert!(copy.parent().is_none());
    assert_eq!(copy.observation_number(), Some(4));
    assert_eq!(copy.data_object_as::<ObsData>(), s.obs1.data_object_as::<ObsData>());

    let components = copy.obs_components();
    assert_eq!(components.len(), 1);
    assert_ne!(components[0].key(), s.instrument.key());
    assert_eq!(components[0].component_type(), Some(&gmos()));
    assert_eq!(
        components[0].data_object_as::<Instrument>(),
        s.instrument.data_object_as::<Instrument>()
    );
    assert_eq!(obs_init.updates.load(Ordering::SeqCst), before + 1);

    s.program.add_observation(&copy).unwrap();
    assert_eq!(s.program.observations().len(), 3);
}

#[test]
fn test_copy_node_preserving_keys() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let other = factory.create_program(None, None).unwrap();

    let copy = factory.copy_node(&other, &s.group, true).unwrap();
    assert_eq!(copy.key(), s.group.key());
    assert_eq!(copy.observations()[0].key(), s.obs3.key());
    assert_eq!(copy.observations()[0].observation_number(), Some(3));
    assert_eq!(other.document().max_observation_number(), 3);
    assert_eq!(copy.program_key(), other.key());

    // the same keys cannot exist twice in one document
    let err = factory.copy_node(&s.program, &s.group, true).unwrap_err();
    assert!(matches!(
        err,
        sptree::Error::Node(sptree::NodeError::DuplicateKey { .. })
    ));
}

#[test]
fn test_copy_node_rejects_roots() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let other = factory.create_program(None, None).unwrap();
    let err = factory.copy_node(&other, &s.program, false).unwrap_err();
    assert!(err.is_precondition());
    assert!(matches!(
        err,
        sptree::Error::Factory(FactoryError::WrongNodeType { .. })
    ));
}

// ===== DOCUMENT COPIES =====

#[test]
fn test_copy_with_same_keys() {
    let factory = test_factory();
    let s = sample_program(&factory);
    s.program
        .document()
        .put_client_data("proposal", json!({ "band": 1 }))
        .unwrap();

    let copy = factory.copy_with_same_keys(&s.program).unwrap();
    let (src, dst) = (s.program.document(), copy.document());

    assert!(!src.same_document(dst));
    assert_eq!(copy.key(), s.program.key());
    assert_eq!(dst.lifespan_id(), src.lifespan_id());
    assert!(Arc::ptr_eq(src.lock(), dst.lock()));
    assert_eq!(subtree_keys(&copy), subtree_keys(&s.program));
    assert_eq!(subtree_shape(&copy), subtree_shape(&s.program));
    assert_eq!(dst.versions(), src.versions());
    assert_eq!(dst.last_modified(), src.last_modified());
    assert_eq!(dst.client_data("proposal"), Some(json!({ "band": 1 })));
    assert_eq!(copy.data_object_as::<Title>(), Some(Title("Sample".into())));

    // the copies are independent trees
    let copied_obs2 = dst.node(&s.obs2.key()).unwrap();
    copied_obs2
        .set_data_object(Box::new(ObsData::titled("changed")))
        .unwrap();
    assert!(s.obs2.data_object().is_none());
}

#[test]
fn test_copy_with_new_lifespan() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let copy = factory.copy_with_new_lifespan(&s.program).unwrap();
    let dst = copy.document();

    assert_eq!(copy.key(), s.program.key());
    assert_ne!(dst.lifespan_id(), s.program.lifespan_id());
    assert_eq!(subtree_keys(&copy), subtree_keys(&s.program));
    assert_eq!(dst.versions(), s.program.document().versions());

    // edits on both sides are concurrent
    s.obs1
        .set_data_object(Box::new(ObsData::titled("here")))
        .unwrap();
    let theirs = dst.node(&s.obs1.key()).unwrap();
    theirs
        .set_data_object(Box::new(ObsData::titled("there")))
        .unwrap();
    assert!(s.obs1.version_vector().is_concurrent(&theirs.version_vector()));
    assert_eq!(theirs.local_version(), 1);
}

#[test]
fn test_copy_with_new_keys() {
    let (factory, obs_init) = initialized_factory();
    let s = sample_program(&factory);
    let before = obs_init.updates.load(Ordering::SeqCst);

    let copy = factory
        .copy_with_new_keys(&s.program, Some("GS-2024A-Q-2".into()))
        .unwrap();

    let original: HashSet<NodeKey> = subtree_keys(&s.program).into_iter().collect();
    let copied: HashSet<NodeKey> = subtree_keys(&copy).into_iter().collect();
    assert_eq!(copied.len(), original.len());
    assert!(original.is_disjoint(&copied));
    assert_eq!(copy.key(), copy.program_key());
    assert_eq!(subtree_shape(&copy), subtree_shape(&s.program));
    assert_eq!(copy.program_id(), Some(ProgramId::new("GS-2024A-Q-2")));
    assert_ne!(copy.lifespan_id(), s.program.lifespan_id());
    assert_eq!(copy.document().max_observation_number(), 3);
    assert_eq!(obs_init.updates.load(Ordering::SeqCst), before + 3);
}

#[test]
fn test_copy_with_new_keys_renumbers_from_one() {
    let factory = test_factory();
    let program = factory.create_program(None, None).unwrap();
    let a = factory.create_observation(&program, Some(12), None).unwrap();
    let b = factory.create_observation(&program, Some(40), None).unwrap();
    program.set_observations(vec![b, a]).unwrap();

    let copy = factory.copy_with_new_keys(&program, None).unwrap();
    let numbers: Vec<_> = copy
        .observations()
        .iter()
        .map(|o| o.observation_number())
        .collect();
    assert_eq!(numbers, vec![Some(1), Some(2)]);
    assert!(copy.program_id().is_none());
}

#[test]
fn test_copy_requires_a_root() {
    let factory = test_factory();
    let s = sample_program(&factory);
    assert!(factory.copy_with_same_keys(&s.group).unwrap_err().is_precondition());
    assert!(
        factory
            .copy_with_new_keys(&s.obs1, None)
            .unwrap_err()
            .is_precondition()
    );
}

#[test]
fn test_rename_nightly_record() {
    let factory = test_factory();
    let record = factory
        .create_nightly_record(None, Some("GS-PLAN20240101".into()))
        .unwrap();
    let obs = factory.create_observation(&record, None, None).unwrap();
    record.add_observation(&obs).unwrap();

    let new_key = NodeKey::new();
    let renamed = factory
        .rename_nightly_record(&record, new_key, Some("GS-PLAN20240102".into()))
        .unwrap();

    assert_eq!(renamed.key(), new_key);
    assert_eq!(renamed.program_key(), new_key);
    assert_eq!(renamed.node_type(), NodeType::NightlyRecord);
    assert_eq!(renamed.program_id(), Some(ProgramId::new("GS-PLAN20240102")));
    assert_eq!(renamed.observations()[0].key(), obs.key());
    assert_ne!(renamed.lifespan_id(), record.lifespan_id());
    assert!(!Arc::ptr_eq(renamed.document().lock(), record.document().lock()));
    // the source is untouched
    assert_eq!(record.key(), record.program_key());
    assert_eq!(record.observations(), vec![obs]);
    assert_eq!(renamed.version_vector().len(), 1);
    assert_ne!(renamed.version_vector(), VersionVector::new());
}
