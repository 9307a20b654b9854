use parking_lot::Mutex;
use std::sync::Arc;

use sticktable_core::{
    integer_key, Error, KeyKind, StickTable, StoreOutcome, SweepScheduler, TableConfig, Tick,
};

fn table(capacity: usize, ttl_ms: u32) -> StickTable {
    let mut cfg = TableConfig::new(KeyKind::Integer, capacity);
    cfg.ttl_ms = ttl_ms;
    StickTable::new(cfg).unwrap()
}

fn store(t: &StickTable, key: u32, sid: u32, now: Tick) {
    match t.store(t.make_entry(&integer_key(key)), sid, now).unwrap() {
        StoreOutcome::Inserted => {}
        StoreOutcome::Duplicate(_) => panic!("key {} stored twice", key),
    }
}

// ---- tick arithmetic ------------------------------------------------------

#[test]
fn ticks_wrap_and_compare() {
    let high = Tick::from_raw(u32::MAX - 10);
    let low = Tick::from_raw(10);
    assert!(high.is_lt(low));
    assert!(!low.is_lt(high));
    assert!(high.is_expired(low));
    assert!(!low.is_expired(high));
}

#[test]
fn tick_add_skips_the_sentinel() {
    assert_eq!(Tick::from_raw(u32::MAX).add_ms(1), Tick::from_raw(1));
    assert_eq!(Tick::from_raw(u32::MAX).add_ms(12), Tick::from_raw(11));
    assert!(!Tick::ETERNITY.is_set());
    assert!(!Tick::ETERNITY.is_expired(Tick::from_raw(5)));
}

#[test]
fn tick_first_prefers_set_and_earlier() {
    let a = Tick::from_raw(100);
    let b = Tick::from_raw(200);
    assert_eq!(a.first(b), a);
    assert_eq!(b.first(a), a);
    assert_eq!(Tick::ETERNITY.first(b), b);
    assert_eq!(a.first(Tick::ETERNITY), a);
}

// ---- sweep ----------------------------------------------------------------

#[test]
fn sweep_drains_everything_expired() {
    let t = table(64, 1_000);
    let t0 = Tick::from_raw(5_000);
    store(&t, 1, 1, t0);
    store(&t, 2, 2, t0.add_ms(10));
    assert_eq!(t.occupancy(), 2);
    assert_eq!(t.sweep_deadline(), t0.add_ms(1_000));

    let next = t.run_expiry_sweep(t0.add_ms(1_011));
    assert_eq!(next, Tick::ETERNITY);
    assert_eq!(t.occupancy(), 0);
    assert!(t.lookup(&integer_key(1)).is_none());
    assert!(t.lookup(&integer_key(2)).is_none());
}

#[test]
fn sweep_stops_at_the_first_future_deadline() {
    let t = table(64, 1_000);
    let t0 = Tick::from_raw(5_000);
    store(&t, 1, 1, t0);
    store(&t, 2, 2, t0.add_ms(500));

    let next = t.run_expiry_sweep(t0.add_ms(1_001));
    assert_eq!(next, t0.add_ms(1_500));
    assert_eq!(t.sweep_deadline(), t0.add_ms(1_500));
    assert!(t.lookup(&integer_key(1)).is_none());
    assert_eq!(t.lookup(&integer_key(2)).unwrap().server_id, 2);
    assert_eq!(t.occupancy(), 1);
}

#[test]
fn early_sweep_removes_nothing() {
    let t = table(64, 1_000);
    let t0 = Tick::from_raw(5_000);
    store(&t, 1, 1, t0);

    let next = t.run_expiry_sweep(t0.add_ms(500));
    assert_eq!(next, t0.add_ms(1_000));
    assert_eq!(t.occupancy(), 1);
}

// ---- re-stamping ----------------------------------------------------------

#[test]
fn touch_extends_past_the_sweep() {
    let t = table(64, 1_000);
    let t0 = Tick::from_raw(5_000);
    store(&t, 1, 1, t0);

    assert!(t.touch(&integer_key(1), t0.add_ms(900)));
    // old index position is reached, but the live deadline moved: the node
    // is re-stamped, not trashed
    let next = t.run_expiry_sweep(t0.add_ms(1_100));
    assert_eq!(next, t0.add_ms(1_900));
    assert_eq!(t.lookup(&integer_key(1)).unwrap().server_id, 1);
    assert_eq!(t.occupancy(), 1);

    // the extended deadline elapses like any other
    let next = t.run_expiry_sweep(t0.add_ms(1_901));
    assert_eq!(next, Tick::ETERNITY);
    assert!(t.lookup(&integer_key(1)).is_none());
}

#[test]
fn restamp_keeps_the_scan_in_time_order() {
    let t = table(64, 1_000);
    let t0 = Tick::from_raw(5_000);
    store(&t, 1, 1, t0);
    store(&t, 2, 2, t0.add_ms(100));
    store(&t, 3, 3, t0.add_ms(200));

    // extend only the middle entry; the one behind it must still be
    // collected by the same sweep pass
    assert!(t.touch(&integer_key(2), t0.add_ms(900)));
    let next = t.run_expiry_sweep(t0.add_ms(1_300));
    assert_eq!(next, t0.add_ms(1_900));
    assert!(t.lookup(&integer_key(1)).is_none());
    assert_eq!(t.lookup(&integer_key(2)).unwrap().server_id, 2);
    assert!(t.lookup(&integer_key(3)).is_none());
    assert_eq!(t.occupancy(), 1);
}

#[test]
fn touch_of_missing_key_reports_absence() {
    let t = table(8, 1_000);
    assert!(!t.touch(&integer_key(9), Tick::from_raw(10)));
}

// ---- persist --------------------------------------------------------------

#[test]
fn persisted_entry_survives_the_sweep() {
    let t = table(64, 1_000);
    let t0 = Tick::from_raw(5_000);
    store(&t, 1, 1, t0);
    assert!(t.persist(&integer_key(1)));

    let next = t.run_expiry_sweep(t0.add_ms(2_000));
    assert_eq!(next, Tick::ETERNITY);
    assert_eq!(t.lookup(&integer_key(1)).unwrap().server_id, 1);
    assert_eq!(t.occupancy(), 1);
}

#[test]
fn persisted_entry_is_not_evictable() {
    let t = table(1, 1_000);
    let t0 = Tick::from_raw(5_000);
    store(&t, 1, 1, t0);
    assert!(t.persist(&integer_key(1)));

    // eviction drops the stale expiry node, finds nothing to trash, and
    // the store fails full
    let entry = t.make_entry(&integer_key(2));
    assert_eq!(t.store(entry, 2, t0.add_ms(1)).unwrap_err(), Error::TableFull);
    assert_eq!(t.lookup(&integer_key(1)).unwrap().server_id, 1);
    assert_eq!(t.occupancy(), 1);
}

// ---- wraparound -----------------------------------------------------------

#[test]
fn sweep_classifies_entries_across_the_wrap() {
    let t = table(64, 1_000);
    // a expires before the wrap, b after it
    let now_a = Tick::from_raw(u32::MAX - 1_700);
    let now_b = Tick::from_raw(u32::MAX - 300);
    store(&t, 1, 1, now_a);
    store(&t, 2, 2, now_b);
    assert_eq!(t.lookup(&integer_key(1)).unwrap().expire_at, Tick::from_raw(u32::MAX - 700));
    assert_eq!(t.lookup(&integer_key(2)).unwrap().expire_at, Tick::from_raw(699));

    // past the wrap: a's deadline has long elapsed, b's is still ahead
    let next = t.run_expiry_sweep(Tick::from_raw(500));
    assert_eq!(next, Tick::from_raw(699));
    assert!(t.lookup(&integer_key(1)).is_none());
    assert_eq!(t.lookup(&integer_key(2)).unwrap().server_id, 2);

    let next = t.run_expiry_sweep(Tick::from_raw(700));
    assert_eq!(next, Tick::ETERNITY);
    assert_eq!(t.occupancy(), 0);
}

#[test]
fn eviction_scan_wraps_to_the_oldest_entry() {
    let t = table(2, 1_000);
    let now_a = Tick::from_raw(u32::MAX - 1_700);
    let now_b = Tick::from_raw(u32::MAX - 300);
    store(&t, 1, 1, now_a);
    store(&t, 2, 2, now_b);

    // the raw index order puts b's wrapped deadline first; the anchored
    // scan must still pick a, the genuinely oldest entry
    store(&t, 3, 3, Tick::from_raw(500));
    assert_eq!(t.occupancy(), 2);
    assert!(t.lookup(&integer_key(1)).is_none());
    assert!(t.lookup(&integer_key(2)).is_some());
    assert!(t.lookup(&integer_key(3)).is_some());
}

#[test]
fn deadlines_landing_on_the_sentinel_are_nudged() {
    let t = table(8, 1_000);
    // now + ttl would be exactly 0 on the wrapping clock
    let now = Tick::from_raw(0u32.wrapping_sub(1_000));
    store(&t, 1, 1, now);
    let deadline = t.lookup(&integer_key(1)).unwrap().expire_at;
    assert_eq!(deadline, Tick::from_raw(1));
    assert!(deadline.is_set());
}

// ---- scheduler wiring -----------------------------------------------------

#[derive(Default)]
struct RecordingScheduler {
    requests: Mutex<Vec<Tick>>,
}

impl SweepScheduler for RecordingScheduler {
    fn request_wakeup(&self, deadline: Tick) {
        self.requests.lock().push(deadline);
    }
}

#[test]
fn store_arms_the_sweep_schedule() {
    let scheduler = Arc::new(RecordingScheduler::default());
    let mut cfg = TableConfig::new(KeyKind::Integer, 16);
    cfg.ttl_ms = 1_000;
    let t = StickTable::with_scheduler(cfg, scheduler.clone()).unwrap();
    let t0 = Tick::from_raw(9_000);

    store(&t, 1, 1, t0.add_ms(50));
    store(&t, 2, 2, t0);
    let requests = scheduler.requests.lock().clone();
    // the second request keeps the earlier of the two deadlines
    assert_eq!(requests, vec![t0.add_ms(1_050), t0.add_ms(1_000)]);
    assert_eq!(t.sweep_deadline(), t0.add_ms(1_000));
}

#[test]
fn ttl_less_tables_never_schedule() {
    let scheduler = Arc::new(RecordingScheduler::default());
    let cfg = TableConfig::new(KeyKind::Integer, 16);
    let t = StickTable::with_scheduler(cfg, scheduler.clone()).unwrap();

    store(&t, 1, 1, Tick::from_raw(10));
    assert!(scheduler.requests.lock().is_empty());
    assert_eq!(t.sweep_deadline(), Tick::ETERNITY);
}
