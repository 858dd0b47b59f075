//! Change notification integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use sptree::constants::{EVENTS_ACTIVATED, OBSERVATIONS_PROP, client_data_property_name};
use sptree::{
    ClientData, EventMonitor, Node, PropagationId, PropertyChange, StructureChange,
};

use crate::helpers::*;

fn counter() -> (Arc<AtomicUsize>, impl Fn(&PropertyChange) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = count.clone();
    (count, move |_: &PropertyChange| {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

fn recorder() -> (
    Arc<Mutex<Vec<PropertyChange>>>,
    impl Fn(&PropertyChange) + Send + Sync + 'static,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (events, move |e: &PropertyChange| {
        sink.lock().unwrap().push(e.clone());
    })
}

#[derive(Default)]
struct Monitor {
    seen: Mutex<Vec<String>>,
}

impl EventMonitor for Monitor {
    fn property_changed(&self, _node: &Node, event: &PropertyChange) {
        self.seen
            .lock()
            .unwrap()
            .push(format!("property {}", event.property));
    }

    fn structure_changed(&self, _node: &Node, event: &StructureChange) {
        self.seen
            .lock()
            .unwrap()
            .push(format!("structure {}", event.property));
    }
}

#[test]
fn test_property_listener_filter() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let (filtered, on_filtered) = counter();
    let (all, on_all) = counter();
    s.obs1.add_property_listener(
        Some(&client_data_property_name(sptree::constants::DATA_OBJECT_KEY)),
        on_filtered,
    );
    s.obs1.add_property_listener(None, on_all);

    s.obs1
        .set_data_object(Box::new(ObsData::titled("M31")))
        .unwrap();
    s.obs1
        .put_client_data("notes", ClientData::Extension(json!("seeing 0.6")))
        .unwrap();

    assert_eq!(filtered.load(Ordering::SeqCst), 1);
    assert_eq!(all.load(Ordering::SeqCst), 2);
}

#[test]
fn test_event_values() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let (events, on_change) = recorder();
    s.obs1.add_property_listener(None, on_change);

    s.obs1
        .set_data_object(Box::new(ObsData::titled("first")))
        .unwrap();
    s.obs1
        .set_data_object(Box::new(ObsData::titled("second")))
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].old_value.is_none());
    assert_eq!(events[1].source, s.obs1.key());
    let old = events[1]
        .old_value
        .as_data_object()
        .and_then(|d| d.downcast_ref::<ObsData>())
        .unwrap();
    assert_eq!(old.title, "first");
    assert!(events[1].propagation_id > events[0].propagation_id);
}

#[test]
fn test_unchanged_value_fires_nothing() {
    let factory = test_factory();
    let s = sample_program(&factory);
    s.obs1
        .set_data_object(Box::new(ObsData::titled("M31")))
        .unwrap();
    let (count, on_change) = counter();
    s.obs1.add_property_listener(None, on_change);

    let id = s
        .obs1
        .set_data_object(Box::new(ObsData::titled("M31")))
        .unwrap();
    assert!(id.is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_composite_listener_hears_descendants() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let (at_program, on_program) = recorder();
    let (at_obs, on_obs) = recorder();
    s.program.add_composite_listener(on_program);
    s.obs1.add_composite_listener(on_obs);

    let id = s
        .instrument
        .set_data_object(Box::new(Instrument {
            name: "GMOS-N".to_string(),
            exposure: 120.0,
        }))
        .unwrap();
    s.obs2
        .set_data_object(Box::new(ObsData::titled("NGC 300")))
        .unwrap();

    let at_program = at_program.lock().unwrap();
    let at_obs = at_obs.lock().unwrap();
    assert_eq!(at_program.len(), 2);
    assert_eq!(at_obs.len(), 1);
    assert_eq!(at_obs[0].source, s.instrument.key());
    assert_eq!(at_obs[0].propagation_id, id);
    assert_eq!(at_program[0].propagation_id, id);
    assert_eq!(at_program[1].source, s.obs2.key());
}

#[test]
fn test_structure_listener() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    s.program.add_structure_listener(move |e: &StructureChange| {
        sink.lock().unwrap().push(e.clone());
    });

    let obs = factory.create_observation(&s.program, None, None).unwrap();
    s.group.add_observation(&obs).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].parent, s.group.key());
    assert_eq!(seen[0].property, OBSERVATIONS_PROP);
    assert_eq!(seen[0].old_children, vec![s.obs3.key()]);
    assert_eq!(seen[0].new_children, vec![s.obs3.key(), obs.key()]);
}

#[test]
fn test_child_list_change_is_a_property_change() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let (events, on_change) = recorder();
    s.program
        .add_property_listener(Some(OBSERVATIONS_PROP), on_change);

    s.program
        .set_observations(vec![s.obs2.clone(), s.obs1.clone()])
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].new_value.as_children().unwrap(),
        &[s.obs2.key(), s.obs1.key()]
    );
}

#[test]
fn test_event_monitor() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let monitor = Arc::new(Monitor::default());
    s.program.register_event_monitor("audit", monitor.clone());

    s.obs3
        .set_data_object(Box::new(ObsData::titled("Crab")))
        .unwrap();
    s.group.remove_observation(&s.obs3).unwrap();

    let seen = monitor.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            format!("property {}", client_data_property_name("DataObject")),
            format!("property {OBSERVATIONS_PROP}"),
            format!("structure {OBSERVATIONS_PROP}"),
        ]
    );

    assert!(s.program.unregister_event_monitor("audit"));
    assert!(!s.program.unregister_event_monitor("audit"));
    s.obs1
        .set_data_object(Box::new(ObsData::titled("ignored")))
        .unwrap();
    assert_eq!(monitor.seen.lock().unwrap().len(), 3);
}

#[test]
fn test_suppressed_events_and_reactivation() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let (own, on_own) = counter();
    let (events, on_program) = recorder();
    s.obs1.add_property_listener(None, on_own);
    s.program.add_composite_listener(on_program);

    assert_eq!(s.obs1.set_sending_events(false).unwrap(), PropagationId::EMPTY);
    assert!(!s.obs1.is_sending_events());
    let id = s
        .obs1
        .set_data_object(Box::new(ObsData::titled("quiet")))
        .unwrap();
    assert!(id.is_empty());
    // the change itself still happened
    assert_eq!(s.obs1.data_object_as::<ObsData>().unwrap().title, "quiet");
    assert_eq!(own.load(Ordering::SeqCst), 0);
    assert!(events.lock().unwrap().is_empty());

    let id = s.obs1.set_sending_events(true).unwrap();
    assert!(!id.is_empty());
    assert!(s.obs1.set_sending_events(true).unwrap().is_empty());

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].property, EVENTS_ACTIVATED);
    assert_eq!(events[0].source, s.obs1.key());
}

#[test]
fn test_remove_listener() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let (count, on_change) = counter();
    let id = s.obs1.add_composite_listener(on_change);

    assert!(s.obs1.remove_listener(id));
    assert!(!s.obs1.remove_listener(id));
    s.obs1
        .set_data_object(Box::new(ObsData::titled("nobody listens")))
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_transient_changes_stay_local() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let (transient, on_transient) = counter();
    let (composite, on_composite) = counter();
    s.obs1
        .add_transient_property_listener(None, on_transient);
    s.program.add_composite_listener(on_composite);

    s.obs1
        .put_transient_client_data("selected", Arc::new(true))
        .unwrap();
    s.obs1.remove_transient_client_data("selected").unwrap();
    s.obs1.remove_transient_client_data("selected").unwrap();

    assert_eq!(transient.load(Ordering::SeqCst), 2);
    assert_eq!(composite.load(Ordering::SeqCst), 0);
}

#[test]
fn test_listener_can_read_tree() {
    let factory = test_factory();
    let s = sample_program(&factory);
    let titles = Arc::new(Mutex::new(Vec::new()));
    let sink = titles.clone();
    let obs = s.obs2.clone();
    s.obs2.add_property_listener(None, move |_: &PropertyChange| {
        let title = obs.data_object_as::<ObsData>().map(|d| d.title);
        sink.lock().unwrap().push(title);
    });

    s.obs2
        .set_data_object(Box::new(ObsData::titled("Vega")))
        .unwrap();
    assert_eq!(*titles.lock().unwrap(), vec![Some("Vega".to_string())]);
}
