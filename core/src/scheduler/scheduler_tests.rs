//! Tests for the dispatch loop
//!
//! Verifies that:
//! - Due states fire in deadline order on the dispatch thread
//! - Stale entries (disarmed states) never fire
//! - A panicking callback does not take the loop down
//! - Shutdown abandons queued timers and is safe from inside a callback

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::timer::{Callback, TimerError, TimerId, TimerState};

use super::{Scheduler, SchedulerConfig, Shared, StopOnExit};

// ═══════════════════════════════════════════════════════════════════════════
// Test Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn scheduler() -> Arc<Scheduler> {
    Scheduler::start(SchedulerConfig {
        thread_name: "ticktock-test-dispatch".to_string(),
        slow_callback_warn_ms: 0,
        ..Default::default()
    })
    .unwrap()
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Arm a state and hand it to the scheduler
fn schedule(
    scheduler: &Scheduler,
    delay: Duration,
    single_shot: bool,
    callback: Option<Callback>,
) -> Arc<TimerState> {
    let state = Arc::new(TimerState::new(delay, single_shot, callback));
    assert!(state.arm(delay));
    assert!(scheduler.add_timer(&state));
    state
}

fn explode() {
    panic!("callback failure")
}

fn counting_callback() -> (Arc<AtomicUsize>, Callback) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let callback: Callback = Arc::new(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (count, callback)
}

// ═══════════════════════════════════════════════════════════════════════════
// Ordering and Cadence
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn fires_in_deadline_order() {
    let scheduler = scheduler();
    let (tx, rx) = mpsc::channel();

    let mut states = Vec::new();
    for delay in [150, 50, 250, 100] {
        let tx = tx.clone();
        let callback: Callback = Arc::new(move || {
            let _ = tx.send(delay);
        });
        states.push(schedule(&scheduler, ms(delay), true, Some(callback)));
    }

    let fired: Vec<u64> = (0..4)
        .map(|_| rx.recv_timeout(ms(1_000)).unwrap())
        .collect();
    assert_eq!(fired, vec![50, 100, 150, 250]);
}

#[test]
fn callbacks_run_on_the_dispatch_thread() {
    let scheduler = scheduler();
    let (tx, rx) = mpsc::channel();
    let callback: Callback = Arc::new(move || {
        let _ = tx.send(thread::current().name().map(str::to_string));
    });

    let _state = schedule(&scheduler, ms(10), true, Some(callback));
    let name = rx.recv_timeout(ms(1_000)).unwrap();
    assert_eq!(name.as_deref(), Some("ticktock-test-dispatch"));
}

#[test]
fn never_fires_before_deadline() {
    let scheduler = scheduler();
    let (tx, rx) = mpsc::channel();
    let armed_at = Instant::now();
    let callback: Callback = Arc::new(move || {
        let _ = tx.send(Instant::now());
    });

    let _state = schedule(&scheduler, ms(120), true, Some(callback));
    let fired_at = rx.recv_timeout(ms(1_000)).unwrap();
    assert!(fired_at.duration_since(armed_at) >= ms(120));
}

#[test]
fn repeating_state_keeps_cadence() {
    let scheduler = scheduler();
    let (tx, rx) = mpsc::channel();
    let callback: Callback = Arc::new(move || {
        let _ = tx.send(Instant::now());
    });

    let state = schedule(&scheduler, ms(60), false, Some(callback));
    let fires: Vec<Instant> = (0..4)
        .map(|_| rx.recv_timeout(ms(1_000)).unwrap())
        .collect();

    for pair in fires.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= ms(55), "gap {gap:?} shorter than interval");
    }
    assert!(state.is_active());
    state.disarm(true).unwrap();
}

#[test]
fn repeating_deadline_is_advanced_before_callback_runs() {
    let scheduler = scheduler();
    let slot: Arc<OnceLock<Weak<TimerState>>> = Arc::new(OnceLock::new());
    let (tx, rx) = mpsc::channel();

    let own = Arc::clone(&slot);
    let callback: Callback = Arc::new(move || {
        if let Some(state) = own.get().and_then(Weak::upgrade) {
            let _ = tx.send(state.remaining_time());
        }
    });

    let state = Arc::new(TimerState::new(ms(200), false, Some(callback)));
    slot.set(Arc::downgrade(&state)).unwrap();
    state.arm(ms(20));
    scheduler.add_timer(&state);

    let remaining = rx.recv_timeout(ms(1_000)).unwrap();
    assert!(remaining > 150, "deadline not advanced: {remaining}ms");
    state.disarm(true).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// Stale Entries and Registration
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn disarmed_state_never_fires() {
    let scheduler = scheduler();
    let (count, callback) = counting_callback();

    let state = schedule(&scheduler, ms(50), true, Some(callback));
    state.disarm(false).unwrap();

    thread::sleep(ms(200));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.pending(), 0, "stale entry should be reclaimed");
}

#[test]
fn duplicate_registration_is_ignored() {
    let scheduler = scheduler();
    let (count, callback) = counting_callback();

    let state = schedule(&scheduler, ms(50), true, Some(callback));
    assert!(!scheduler.add_timer(&state));
    assert_eq!(scheduler.pending(), 1);

    thread::sleep(ms(200));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn inactive_state_is_not_registered() {
    let scheduler = scheduler();
    let state = Arc::new(TimerState::new(ms(10), true, None));
    assert!(!scheduler.add_timer(&state));
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn missing_callback_still_completes_single_shot() {
    let scheduler = scheduler();
    let state = schedule(&scheduler, ms(20), true, None);

    thread::sleep(ms(150));
    assert!(!state.is_active());
    assert_eq!(state.remaining_time(), -1);
}

#[test]
fn callback_may_register_other_timers() {
    let scheduler = scheduler();
    let (count, inner) = counting_callback();
    let (tx, rx) = mpsc::channel();

    let registrar = Arc::clone(&scheduler);
    let outer: Callback = Arc::new(move || {
        let state = Arc::new(TimerState::new(ms(20), true, Some(Arc::clone(&inner))));
        state.arm(ms(20));
        registrar.add_timer(&state);
        let _ = tx.send(state);
    });

    let _outer = schedule(&scheduler, ms(20), true, Some(outer));
    let _inner_state = rx.recv_timeout(ms(1_000)).unwrap();
    thread::sleep(ms(150));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Fault Containment
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn panicking_callback_does_not_stop_the_loop() {
    let scheduler = scheduler();
    let panicking: Callback = Arc::new(explode);
    let (count, callback) = counting_callback();

    let bad = schedule(&scheduler, ms(20), false, Some(panicking));
    let _good = schedule(&scheduler, ms(80), true, Some(callback));

    thread::sleep(ms(250));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(scheduler.is_running());
    // Repeating bookkeeping survives the panic
    assert!(bad.is_active());
    bad.disarm(true).unwrap();
}

#[test]
fn huge_interval_does_not_block_other_timers() {
    let scheduler = scheduler();
    let (count, callback) = counting_callback();

    let huge = Arc::new(TimerState::new(Duration::MAX, false, None));
    assert!(huge.arm(ms(5)));
    assert!(scheduler.add_timer(&huge));
    let _later = schedule(&scheduler, ms(40), true, Some(callback));

    thread::sleep(ms(200));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(scheduler.is_running());
    // Re-queued at a saturated deadline instead of overflowing
    assert!(huge.is_active());
    assert!(huge.remaining().unwrap() > Duration::from_secs(3_600));
    huge.disarm(true).unwrap();
}

#[test]
fn dispatch_exit_refuses_later_registrations() {
    let shared = Shared::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _stop_on_exit = StopOnExit(&shared);
        explode();
    }));
    assert!(outcome.is_err());
    assert!(!shared.lock().running);

    let state = Arc::new(TimerState::new(ms(10), true, None));
    state.arm(ms(10));
    assert!(!shared.register(state, Instant::now()));
}

#[test]
fn synchronous_self_stop_is_reported() {
    let scheduler = scheduler();
    let slot: Arc<OnceLock<Weak<TimerState>>> = Arc::new(OnceLock::new());
    let (tx, rx) = mpsc::channel::<Result<(), TimerError>>();

    let own = Arc::clone(&slot);
    let callback: Callback = Arc::new(move || {
        if let Some(state) = own.get().and_then(Weak::upgrade) {
            let _ = tx.send(state.disarm(true));
        }
    });

    let state = Arc::new(TimerState::new(ms(30), false, Some(callback)));
    slot.set(Arc::downgrade(&state)).unwrap();
    state.arm(ms(30));
    scheduler.add_timer(&state);

    let result = rx.recv_timeout(ms(1_000)).unwrap();
    assert_eq!(result, Err(TimerError::StopFromCallback { id: state.id() }));
    assert!(!state.is_active());
}

// ═══════════════════════════════════════════════════════════════════════════
// Shutdown
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn shutdown_abandons_queued_timers() {
    let scheduler = scheduler();
    let (count, callback) = counting_callback();
    let _state = schedule(&scheduler, ms(100), true, Some(callback));

    scheduler.shutdown();
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.pending(), 0);

    thread::sleep(ms(200));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn shutdown_is_idempotent_and_refuses_new_timers() {
    let scheduler = scheduler();
    scheduler.shutdown();
    scheduler.shutdown();

    let state = Arc::new(TimerState::new(ms(10), true, None));
    state.arm(ms(10));
    assert!(!scheduler.add_timer(&state));
}

#[test]
fn shutdown_from_inside_a_callback_does_not_hang() {
    let scheduler = scheduler();
    let (tx, rx) = mpsc::channel();

    let owner = Arc::clone(&scheduler);
    let callback: Callback = Arc::new(move || {
        owner.shutdown();
        let _ = tx.send(());
    });

    let _state = schedule(&scheduler, ms(20), true, Some(callback));
    rx.recv_timeout(ms(1_000)).unwrap();
    assert!(!scheduler.is_running());
}

#[test]
fn ids_are_never_reused() {
    let ids: std::collections::HashSet<TimerId> = (0..1_000)
        .map(|_| TimerState::new(ms(1), true, None).id())
        .collect();
    assert_eq!(ids.len(), 1_000);
}
