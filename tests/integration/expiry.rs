//! Timeout behaviour observed through the public API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use portset_rs::{AddExt, BitmapPortSet, CreateOptions, ManualClock, SetConfig};

fn timed_set(timeout: u32, interval: Duration) -> (BitmapPortSet, Arc<ManualClock>) {
    let clock = ManualClock::new(0);
    let opts = CreateOptions::default()
        .with_clock(clock.clone())
        .with_reaper_interval(interval);
    let set = BitmapPortSet::create(SetConfig::new(1, 1024, Some(timeout), false), opts).unwrap();
    (set, clock)
}

fn wait_for(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn entry_expires_then_bit_is_reaped() {
    let (set, clock) = timed_set(1, Duration::from_millis(5));
    set.add(80, &AddExt::default(), false).unwrap();
    assert!(set.test(80).unwrap());

    clock.advance(Duration::from_secs(1));
    assert!(!set.test(80).unwrap(), "lazy expiry applies before the sweep");
    assert!(wait_for(Duration::from_secs(5), || !set
        .raw_contains(80)
        .unwrap()));
    assert_eq!(set.raw_len(), 0);
}

#[test]
fn list_reports_remaining_seconds() {
    let (set, clock) = timed_set(60, Duration::from_secs(3_600));
    set.add(22, &AddExt::default(), false).unwrap();
    set.add(23, &AddExt::with_timeout(0), false).unwrap();
    clock.advance(Duration::from_millis(20_500));

    let list = set.list();
    assert_eq!(list[0].port, 22);
    assert_eq!(list[0].timeout, Some(40));
    assert_eq!(list[1].timeout, Some(0), "permanent entries list a zero timeout");
}

#[test]
fn destroy_with_armed_reaper_returns_promptly() {
    // A long interval must not delay drop: shutdown wakes the thread.
    let (set, _clock) = timed_set(600, Duration::from_secs(3_600));
    let start = Instant::now();
    drop(set);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn many_sets_reap_independently() {
    let sets: Vec<_> = (0..8)
        .map(|_| timed_set(1, Duration::from_millis(5)))
        .collect();
    for (set, _) in &sets {
        set.add_range(1, 1024, &AddExt::default(), false).unwrap();
    }
    // Only even sets move past the deadline.
    for (i, (_, clock)) in sets.iter().enumerate() {
        if i % 2 == 0 {
            clock.advance(Duration::from_secs(2));
        }
    }
    for (i, (set, _)) in sets.iter().enumerate() {
        if i % 2 == 0 {
            assert!(wait_for(Duration::from_secs(5), || set.raw_len() == 0));
        } else {
            assert_eq!(set.list().len(), 1024);
        }
    }
}
