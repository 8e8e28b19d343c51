use super::*;
use crate::storage::faulty::FaultyStore;
use crate::storage::{MemStore, Table};
use crate::types::BitmapKey;
use std::time::{Duration, Instant};

fn config(interval_ms: u64) -> MaintenanceConfig {
    MaintenanceConfig {
        flush_interval_ms: interval_ms,
        flush_batch_size: 1000,
        reclaim_every: 2,
        flush_max_attempts: 3,
        flush_retry_backoff_ms: 1,
    }
}

fn add_events<S: KvStore>(index: &CountIndex<S>, entity: &str, n: usize) {
    let me = index.domain().register();
    let guard = me.pin();
    let bm = BitmapKey::new("ns", "b");
    for _ in 0..n {
        index.add(&guard, &bm, entity).unwrap();
    }
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn tick_flushes_and_reclaims_on_cadence() {
    let store = Arc::new(MemStore::new());
    let index = Arc::new(CountIndex::new(Arc::clone(&store)));
    let scheduler = MaintenanceScheduler::new(Arc::clone(&index), config(1000));

    add_events(&index, "e1", 2);
    scheduler.tick();
    let stats = scheduler.stats();
    assert_eq!(stats.flush_cycles, 1);
    assert_eq!(stats.reclaim_cycles, 0);
    // Buckets 1 and 2 plus one counter; bucket 1 is empty and deleted.
    assert_eq!(stats.entries_written, 3);
    assert_eq!(store.len(Table::Bitmaps), 1);
    assert_eq!(index.dirty_len(), 0);

    scheduler.tick();
    let stats = scheduler.stats();
    assert_eq!(stats.flush_cycles, 2);
    assert_eq!(stats.reclaim_cycles, 1);
    assert_eq!(stats.objects_reclaimed, 3);
    assert_eq!(index.domain().pending(), 0);
}

#[test]
fn transient_failures_are_retried() {
    let store = Arc::new(FaultyStore::new());
    let index = Arc::new(CountIndex::new(Arc::clone(&store)));
    let scheduler = MaintenanceScheduler::new(Arc::clone(&index), config(1000));
    add_events(&index, "e1", 1);

    let before = store.attempts();
    store.fail_next(2);
    assert_eq!(scheduler.force_flush().unwrap(), 2);
    assert_eq!(store.attempts() - before, 3);
    assert_eq!(scheduler.stats().flush_failures, 0);
    assert_eq!(store.inner().len(Table::Bitmaps), 1);
}

#[test]
fn exhausted_retries_requeue_the_batch() {
    let store = Arc::new(FaultyStore::new());
    let index = Arc::new(CountIndex::new(Arc::clone(&store)));
    let scheduler = MaintenanceScheduler::new(Arc::clone(&index), config(1000));
    add_events(&index, "e1", 1);

    store.fail_next(10);
    assert!(matches!(scheduler.force_flush(), Err(Error::Storage(_))));
    assert_eq!(scheduler.stats().flush_failures, 1);
    assert_eq!(index.dirty_len(), 2);
    assert!(store.inner().is_empty(Table::Bitmaps));

    store.fail_next(0);
    assert_eq!(scheduler.force_flush().unwrap(), 2);
    assert_eq!(index.dirty_len(), 0);
}

#[test]
fn lifecycle_transitions() {
    let index = Arc::new(CountIndex::new(Arc::new(MemStore::new())));
    let scheduler = MaintenanceScheduler::new(index, config(10));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    scheduler.start().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert!(matches!(scheduler.start(), Err(Error::Invariant(_))));

    scheduler.stop().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    // Restart after stop is allowed.
    scheduler.start().unwrap();
    scheduler.stop().unwrap();
}

#[test]
fn timer_flushes_in_background() {
    let store = Arc::new(MemStore::new());
    let index = Arc::new(CountIndex::new(Arc::clone(&store)));
    let scheduler = MaintenanceScheduler::new(Arc::clone(&index), config(10));
    scheduler.start().unwrap();

    add_events(&index, "e1", 1);
    assert!(wait_until(Duration::from_secs(5), || store.len(Table::Bitmaps) == 1));
    assert!(wait_until(Duration::from_secs(5), || scheduler.stats().flush_cycles >= 2));
    scheduler.stop().unwrap();
}

#[test]
fn stop_performs_final_flush() {
    let store = Arc::new(MemStore::new());
    let index = Arc::new(CountIndex::new(Arc::clone(&store)));
    let scheduler = MaintenanceScheduler::new(Arc::clone(&index), config(60_000));
    scheduler.start().unwrap();

    add_events(&index, "late", 3);
    assert!(store.is_empty(Table::Bitmaps));
    scheduler.stop().unwrap();

    assert_eq!(store.len(Table::Bitmaps), 1);
    assert_eq!(store.len(Table::EventCounters), 1);
    let cycles = scheduler.stats().flush_cycles;
    thread::sleep(Duration::from_millis(20));
    assert_eq!(scheduler.stats().flush_cycles, cycles, "no tick after stop");
}

#[test]
fn dirty_threshold_triggers_early_flush() {
    let store = Arc::new(MemStore::new());
    let index = Arc::new(CountIndex::new(Arc::clone(&store)));
    let mut cfg = config(60_000);
    cfg.flush_batch_size = 2;
    let scheduler = MaintenanceScheduler::new(Arc::clone(&index), cfg);
    scheduler.start().unwrap();

    add_events(&index, "e1", 1);
    scheduler.notify_dirty(index.dirty_len());
    assert!(wait_until(Duration::from_secs(5), || store.len(Table::Bitmaps) == 1));
    scheduler.stop().unwrap();
}

#[test]
fn below_threshold_sends_no_hint() {
    let index = Arc::new(CountIndex::new(Arc::new(MemStore::new())));
    let scheduler = MaintenanceScheduler::new(index, config(60_000));
    scheduler.notify_dirty(1);
    assert!(scheduler.hint_rx.try_recv().is_err());
    scheduler.notify_dirty(5000);
    assert!(scheduler.hint_rx.try_recv().is_ok());
}

#[test]
fn concurrent_stops_all_wait_for_the_timer_thread() {
    let index = Arc::new(CountIndex::new(Arc::new(MemStore::new())));
    let mut cfg = config(1);
    cfg.reclaim_every = 1;
    let scheduler = MaintenanceScheduler::new(Arc::clone(&index), cfg);
    scheduler.start().unwrap();
    add_events(&index, "e1", 2);
    assert!(wait_until(Duration::from_secs(5), || scheduler.stats().flush_cycles >= 1));

    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                scheduler.stop().unwrap();
                assert_eq!(scheduler.state(), SchedulerState::Stopped);
                let cycles = scheduler.stats().flush_cycles;
                let reclaims = scheduler.stats().reclaim_cycles;
                thread::sleep(Duration::from_millis(10));
                assert_eq!(scheduler.stats().flush_cycles, cycles);
                assert_eq!(scheduler.stats().reclaim_cycles, reclaims);
            })
        })
        .collect();
    for stopper in stoppers {
        stopper.join().unwrap();
    }
}
