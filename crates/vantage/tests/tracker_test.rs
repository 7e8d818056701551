mod common;

use common::{set, t, Harness};
use vantage::{Applied, RecordStore, State, StateFilter};

#[test]
fn test_created_then_activated_then_deleted() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);

    assert_eq!(h.tracker.object_created("p1", t(1), 1).unwrap(), Applied::Applied);
    let rows = h.lookup(t(0), "V", StateFilter::Any, "C");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entry_pid, "p1");
    assert_eq!(rows[0].state, State::Inactive);
    assert_eq!(rows[0].last_changed, t(1));

    h.tracker
        .object_state_changed("p1", t(2), Some(State::Active), 2)
        .unwrap();
    let active = h.lookup(t(0), "V", StateFilter::Active, "C");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].last_changed, t(2));
    assert_eq!(active[0].state, State::Active);
    let inactive = h.lookup(t(0), "V", StateFilter::Inactive, "C");
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].last_changed, t(1));

    h.tracker
        .object_state_changed("p1", t(3), Some(State::Deleted), 3)
        .unwrap();
    for filter in [StateFilter::Active, StateFilter::Inactive, StateFilter::Deleted] {
        let rows = h.lookup(t(0), "V", filter, "C");
        assert_eq!(rows.len(), 1, "{filter:?}");
        assert_eq!(rows[0].state, State::Deleted);
        assert_eq!(rows[0].last_changed, t(3));
    }

    assert_eq!(h.store.get_cursor().unwrap(), Some(3));
    let record = h.record("p1", "V", "C").unwrap();
    assert!(record.objects.is_empty());
}

#[test]
fn test_reapplying_an_event_is_idempotent() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    h.repo.bundle("p1", "V", &["p1", "m1"]);

    h.tracker.object_created("p1", t(1), 1).unwrap();
    h.tracker
        .object_state_changed("p1", t(2), Some(State::Active), 2)
        .unwrap();
    let once = h.record("p1", "V", "C").unwrap();

    // the same events delivered again under later keys
    h.tracker.object_created("p1", t(1), 3).unwrap();
    h.tracker
        .object_state_changed("p1", t(2), Some(State::Active), 4)
        .unwrap();
    let twice = h.record("p1", "V", "C").unwrap();

    assert_eq!(once, twice);
    assert_eq!(h.store.get_cursor().unwrap(), Some(4));
}

#[test]
fn test_stale_keys_are_ignored() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);

    h.tracker.object_created("p1", t(1), 5).unwrap();
    let before = h.record("p1", "V", "C").unwrap();

    let outcome = h
        .tracker
        .object_state_changed("p1", t(9), Some(State::Active), 3)
        .unwrap();
    assert_eq!(outcome, Applied::Stale { cursor: 5 });
    assert_eq!(
        h.tracker.object_relations_changed("p1", t(9), 5).unwrap(),
        Applied::Stale { cursor: 5 }
    );

    assert_eq!(h.record("p1", "V", "C").unwrap(), before);
    assert_eq!(h.store.get_cursor().unwrap(), Some(5));
}

#[test]
fn test_out_of_order_state_changes_converge() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);

    h.tracker.object_created("p1", t(1), 1).unwrap();
    // a newer activation arrives before an older deactivation
    h.tracker
        .object_state_changed("p1", t(5), Some(State::Active), 2)
        .unwrap();
    h.tracker
        .object_state_changed("p1", t(3), Some(State::Inactive), 3)
        .unwrap();

    let record = h.record("p1", "V", "C").unwrap();
    assert_eq!(record.active, Some(t(5)));
    assert_eq!(record.inactive, Some(t(3)));
    assert_eq!(record.state(), State::Active);
    assert_eq!(record.change_time(), Some(t(5)));
}

#[test]
fn test_view_bundle_round_trip() {
    let h = Harness::new();
    h.repo.entry("e", &["V"], &["C"]);

    h.repo.bundle("e", "V", &["e", "a", "b"]);
    h.tracker.object_relations_changed("e", t(1), 1).unwrap();
    assert_eq!(h.record("e", "V", "C").unwrap().objects, set(&["e", "a", "b"]));

    h.repo.bundle("e", "V", &["e", "a"]);
    h.tracker.object_relations_changed("e", t(2), 2).unwrap();

    let record = h.record("e", "V", "C").unwrap();
    assert_eq!(record.objects, set(&["e", "a"]));
    assert_eq!(record.inactive, Some(t(2)));
    assert_eq!(record.state(), State::Inactive);
}

#[test]
fn test_member_relation_change_repairs_containing_record() {
    let h = Harness::new();
    h.repo.entry("e", &["V"], &["C"]);
    h.repo.bundle("e", "V", &["e", "a"]);
    h.tracker.object_created("e", t(1), 1).unwrap();
    h.tracker
        .object_state_changed("e", t(2), Some(State::Active), 2)
        .unwrap();

    // "a" is not an entry itself; its new relation pulls "c" into e's view
    h.repo.bundle("e", "V", &["e", "a", "c"]);
    h.tracker.object_relations_changed("a", t(3), 3).unwrap();

    let record = h.record("e", "V", "C").unwrap();
    assert_eq!(record.objects, set(&["e", "a", "c"]));
    assert_eq!(record.active, Some(t(3)));
    assert!(h.record("a", "V", "C").is_none());
}

#[test]
fn test_plain_datastream_change_touches_containing_records() {
    let h = Harness::new();
    h.repo.entry("e", &["V"], &["C"]);
    h.repo.bundle("e", "V", &["e", "a"]);
    h.tracker.object_created("e", t(1), 1).unwrap();

    h.tracker
        .datastream_changed("a", t(4), Some("DC"), 2)
        .unwrap();

    let rows = h.lookup(t(4), "V", StateFilter::Any, "C");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entry_pid, "e");
    assert_eq!(rows[0].last_changed, t(4));
    assert_eq!(h.record("e", "V", "C").unwrap().objects, set(&["e", "a"]));
}

#[test]
fn test_relations_datastream_is_a_relation_change() {
    let h = Harness::new();
    h.repo.entry("e", &["V"], &["C"]);
    h.tracker.object_created("e", t(1), 1).unwrap();

    h.repo.bundle("e", "V", &["e", "x"]);
    h.tracker
        .datastream_changed("e", t(2), Some("RELS-EXT"), 2)
        .unwrap();
    assert_eq!(h.record("e", "V", "C").unwrap().objects, set(&["e", "x"]));

    // a flag change on the same datastream carries no id and only touches
    h.repo.bundle("e", "V", &["e"]);
    h.tracker.datastream_changed("e", t(3), None, 3).unwrap();
    let record = h.record("e", "V", "C").unwrap();
    assert_eq!(record.objects, set(&["e", "x"]));
    assert_eq!(record.inactive, Some(t(3)));
}

#[test]
fn test_deleting_a_member_drops_it_from_bundles() {
    let h = Harness::new();
    h.repo.entry("e", &["V"], &["C"]);
    h.repo.bundle("e", "V", &["e", "a"]);
    h.tracker.object_created("e", t(1), 1).unwrap();

    h.tracker.object_deleted("a", t(5), 2).unwrap();

    let record = h.record("e", "V", "C").unwrap();
    assert_eq!(record.objects, set(&["e"]));
    assert_eq!(record.inactive, Some(t(5)));
    assert_eq!(record.state(), State::Inactive);
}

#[test]
fn test_losing_a_collection_retires_the_record() {
    let h = Harness::new();
    h.repo.entry("e", &["V"], &["C1", "C2"]);
    h.tracker.object_created("e", t(1), 1).unwrap();
    assert!(h.record("e", "V", "C2").is_some());

    h.repo.set_collections("e", &["C1"]);
    h.tracker.object_relations_changed("e", t(2), 2).unwrap();

    let retired = h.record("e", "V", "C2").unwrap();
    assert_eq!(retired.state(), State::Deleted);
    assert_eq!(retired.deleted, Some(t(2)));
    assert_eq!(h.record("e", "V", "C1").unwrap().state(), State::Inactive);

    let gone = h.lookup(t(2), "V", StateFilter::Deleted, "C2");
    assert_eq!(gone.len(), 1);
}

#[test]
fn test_state_change_without_state_asks_repository() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    h.tracker.object_created("p1", t(1), 1).unwrap();

    h.repo.set_state("p1", State::Active);
    h.tracker.object_state_changed("p1", t(2), None, 2).unwrap();
    assert_eq!(h.record("p1", "V", "C").unwrap().state(), State::Active);
}

#[test]
fn test_object_without_collections_creates_no_records() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &[]);

    assert_eq!(h.tracker.object_created("p1", t(1), 1).unwrap(), Applied::Applied);
    assert!(h.record("p1", "V", "C").is_none());
    assert_eq!(h.store.stats().unwrap().records, 0);
    assert_eq!(h.store.get_cursor().unwrap(), Some(1));
}

#[test]
fn test_content_model_view_change_cascades_to_subscribers() {
    let h = Harness::new();
    h.repo.content_model("cm", &["x", "y"]);
    h.repo.entry("y", &[], &["C"]);
    h.tracker.object_created("y", t(1), 1).unwrap();
    assert!(h.record("y", "V", "C").is_none());

    // the content model now declares its objects entries for angle V
    h.repo.entry("x", &["V"], &["C"]);
    h.repo.entry("y", &["V"], &["C"]);
    h.tracker
        .datastream_changed("cm", t(2), Some("VIEW"), 2)
        .unwrap();

    assert!(h.repo.invalidated().contains(&"cm".to_string()));
    for pid in ["x", "y"] {
        let record = h.record(pid, "V", "C").unwrap();
        assert_eq!(record.state(), State::Inactive);
        assert_eq!(record.inactive, Some(t(2)));
    }
    // the content model itself is not an entry
    assert!(h.record("cm", "V", "C").is_none());
}

#[test]
fn test_created_content_model_only_cascades() {
    let h = Harness::new();
    h.repo.content_model("cm", &["x"]);
    h.repo.entry("cm", &["V"], &["C"]);
    h.repo.entry("x", &["V"], &["C"]);

    h.tracker.object_created("cm", t(1), 1).unwrap();

    assert!(h.record("cm", "V", "C").is_none());
    assert!(h.record("x", "V", "C").is_some());
}

#[test]
fn test_purged_content_model_cascades() {
    let h = Harness::new();
    h.repo.content_model("cm", &["x"]);
    h.repo.entry("x", &["V"], &["C"]);
    h.tracker.object_created("x", t(1), 1).unwrap();

    // subscriber loses its entry angle when the content model goes away
    h.repo.entry("x", &[], &["C"]);
    h.tracker.object_deleted("cm", t(2), 2).unwrap();

    assert!(h.repo.invalidated().contains(&"cm".to_string()));
    assert_eq!(h.record("x", "V", "C").unwrap().state(), State::Deleted);
}

#[test]
fn test_transient_failure_rolls_back_everything() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    // records are written before the bundle is asked for
    h.repo.fail("calc_view_bundle", 1);

    let err = h.tracker.object_created("p1", t(1), 1).unwrap_err();
    assert!(err.is_retryable());
    assert!(h.record("p1", "V", "C").is_none());
    assert_eq!(h.store.get_cursor().unwrap(), None);

    h.tracker.object_created("p1", t(1), 1).unwrap();
    assert!(h.record("p1", "V", "C").is_some());
    assert_eq!(h.store.get_cursor().unwrap(), Some(1));
}

#[test]
fn test_skip_only_moves_the_cursor() {
    let h = Harness::new();
    assert_eq!(h.tracker.skip(7).unwrap(), Applied::Applied);
    assert_eq!(h.tracker.skip(7).unwrap(), Applied::Stale { cursor: 7 });
    assert_eq!(h.store.get_cursor().unwrap(), Some(7));
    assert_eq!(h.store.stats().unwrap().records, 0);
}

#[test]
fn test_content_model_is_checked_just_before_its_purge() {
    let h = Harness::new();
    // gone at t(2): still a content model at t(2) - 1ms, no longer at t(2)
    h.repo.content_model_until("cm", &["x"], t(2));
    h.repo.entry("x", &["V"], &["C"]);
    h.tracker.object_created("x", t(1), 1).unwrap();

    h.repo.entry("x", &[], &["C"]);
    h.tracker.object_deleted("cm", t(2), 2).unwrap();

    assert!(h.repo.invalidated().contains(&"cm".to_string()));
    let record = h.record("x", "V", "C").unwrap();
    assert_eq!(record.state(), State::Deleted);
    assert_eq!(record.deleted, Some(t(2)));
}

#[test]
fn test_content_model_marked_deleted_cascades() {
    let h = Harness::new();
    h.repo.content_model("cm", &["x"]);
    h.repo.entry("x", &["V"], &["C"]);
    h.tracker.object_created("x", t(1), 1).unwrap();

    h.repo.entry("x", &[], &["C"]);
    h.tracker
        .object_state_changed("cm", t(2), Some(State::Deleted), 2)
        .unwrap();

    assert!(h.repo.invalidated().contains(&"cm".to_string()));
    assert_eq!(h.record("x", "V", "C").unwrap().state(), State::Deleted);
    assert!(h.record("cm", "V", "C").is_none());
}

#[test]
fn test_content_model_relations_datastream_cascades() {
    let h = Harness::new();
    h.repo.content_model("cm", &["x"]);
    h.repo.entry("x", &[], &["C"]);
    h.tracker.object_created("x", t(1), 1).unwrap();
    assert!(h.record("x", "V", "C").is_none());

    h.repo.entry("x", &["V"], &["C"]);
    h.tracker
        .datastream_changed("cm", t(2), Some("RELS-EXT"), 2)
        .unwrap();

    assert!(h.repo.invalidated().contains(&"cm".to_string()));
    let record = h.record("x", "V", "C").unwrap();
    assert_eq!(record.state(), State::Inactive);
    assert_eq!(record.inactive, Some(t(2)));
}
