//! Integration tests for concurrent use of one manager.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use aegis_core::EntityEntry;
use aegis_security::{
    CheatType, Detection, EventKind, SecurityConfig, SequenceDefinition, SequenceEvent,
    SequenceManager, SweepScheduler,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use rand::Rng;

const LOGIN: EventKind = EventKind::new(1);
const JUMP: EventKind = EventKind::new(2);
const SHOOT: EventKind = EventKind::new(3);

struct Event(EventKind);

impl SequenceEvent for Event {
    fn kind(&self) -> EventKind {
        self.0
    }
}

fn shared_manager(hits: &Arc<AtomicU64>) -> Arc<SequenceManager<Event>> {
    let mut manager = SequenceManager::new(SecurityConfig::default());
    manager
        .register(
            SequenceDefinition::builder("login_jump", CheatType::Suspicious)
                .trigger_on(LOGIN)
                .then_on(JUMP)
                .within(Duration::from_secs(30))
                .build()
                .unwrap(),
        )
        .unwrap();
    manager
        .register(
            SequenceDefinition::builder("double_tap", CheatType::Aimbot)
                .trigger_on(SHOOT)
                .then_on(SHOOT)
                .concurrent(true)
                .build()
                .unwrap(),
        )
        .unwrap();
    let hits = Arc::clone(hits);
    manager.add_listener(Arc::new(move |_: &Detection| {
        hits.fetch_add(1, Ordering::Relaxed);
    }));
    Arc::new(manager)
}

#[test]
fn test_parallel_entities_each_detect_once() {
    let hits = Arc::new(AtomicU64::new(0));
    let manager = shared_manager(&hits);
    let num_threads = 8;
    let players_per_thread = 250;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for p in 0..players_per_thread {
                    let entry = EntityEntry::new((t * players_per_thread + p) as u32, 0);
                    manager.invoke(entry, &Event(LOGIN));
                    manager.invoke(entry, &Event(JUMP));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = (num_threads * players_per_thread) as u64;
    assert_eq!(hits.load(Ordering::Relaxed), total);
    let stats = manager.stats();
    assert_eq!(stats.started, total);
    assert_eq!(stats.completed, total);
    assert_eq!(stats.live, 0);
    assert!(manager.registry().is_empty());
}

#[test]
fn test_one_entity_from_many_threads() {
    let hits = Arc::new(AtomicU64::new(0));
    let manager = shared_manager(&hits);
    let player = EntityEntry::new(42, 0);
    let num_threads = 8;
    let shots_per_thread = 1000;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..shots_per_thread {
                    manager.invoke(player, &Event(SHOOT));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // Every shot completes all waiting instances and starts a new one, so
    // exactly one instance is left after the last shot.
    let shots = (num_threads * shots_per_thread) as u64;
    assert_eq!(hits.load(Ordering::Relaxed), shots - 1);
    assert_eq!(manager.snapshot(player).len(), 1);
    let stats = manager.stats();
    assert_eq!(stats.started, shots);
    assert_eq!(stats.live, 1);
}

#[test]
fn test_invoke_racing_forced_clean() {
    let hits = Arc::new(AtomicU64::new(0));
    let manager = shared_manager(&hits);
    let players = 16u32;
    let num_threads = 6;
    let barrier = Arc::new(Barrier::new(num_threads + 1));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..5_000 {
                    let entry = EntityEntry::new(rng.gen_range(0..players), 0);
                    let kind = [LOGIN, JUMP, SHOOT][rng.gen_range(0..3)];
                    manager.invoke(entry, &Event(kind));
                }
            })
        })
        .collect();

    let cleaner = {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            barrier.wait();
            for i in 0..2_000 {
                if i % 100 == 0 {
                    manager.clean(true);
                } else {
                    manager.clean_entry(EntityEntry::new(rng.gen_range(0..players), 0), true);
                }
            }
        })
    };

    for h in handles {
        h.join().unwrap();
    }
    cleaner.join().unwrap();
    manager.clean(true);

    let stats = manager.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.started, stats.destroyed());
    assert_eq!(stats.completed, hits.load(Ordering::Relaxed));
    assert!(manager.registry().is_empty());
    assert_eq!(manager.registry().sequence_count(), 0);
}

#[test]
fn test_sweeper_alongside_traffic() {
    let hits = Arc::new(AtomicU64::new(0));
    let manager = shared_manager(&hits);
    let sweeper = SweepScheduler::spawn(Arc::clone(&manager), Duration::from_millis(1)).unwrap();

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for p in 0..500 {
                    let entry = EntityEntry::new(t * 500 + p, 0);
                    manager.invoke(entry, &Event(LOGIN));
                    manager.invoke(entry, &Event(JUMP));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    sweeper.shutdown();

    assert_eq!(hits.load(Ordering::Relaxed), 2000);
    assert_eq!(manager.stats().live, 0);
}

/// Single-step definition on JUMP with a caller-supplied listener.
fn instant_manager(
    listener: impl Fn(&Detection) + Send + Sync + 'static,
) -> Arc<SequenceManager<Event>> {
    let mut manager = SequenceManager::new(SecurityConfig::default());
    manager
        .register(
            SequenceDefinition::builder("instant", CheatType::Teleport)
                .trigger_on(JUMP)
                .build()
                .unwrap(),
        )
        .unwrap();
    manager.add_listener(Arc::new(listener));
    Arc::new(manager)
}

#[test]
fn test_blocked_listener_does_not_block_other_entity() {
    let parked = EntityEntry::new(1, 0);
    let other = EntityEntry::new(2, 0);
    let (entered_tx, entered_rx): (Sender<()>, Receiver<()>) = bounded(1);
    let (release_tx, release_rx): (Sender<()>, Receiver<()>) = bounded(1);
    let released = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&released);
    let manager = instant_manager(move |d: &Detection| {
        if d.entry == parked {
            entered_tx.send(()).unwrap();
            // Parks until the other entity's invoke has finished
            let ok = release_rx.recv_timeout(Duration::from_secs(3)).is_ok();
            flag.store(ok, Ordering::Release);
        }
    });

    let first = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.invoke(parked, &Event(JUMP)))
    };
    entered_rx.recv_timeout(Duration::from_secs(3)).unwrap();

    let second = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            manager.invoke(other, &Event(JUMP));
            release_tx.send(()).unwrap();
        })
    };

    second.join().unwrap();
    first.join().unwrap();
    assert!(released.load(Ordering::Acquire));
    assert_eq!(manager.stats().completed, 2);
}

#[test]
fn test_listener_queries_other_entity_during_prune() {
    let player = EntityEntry::new(1, 0);
    let bystander = EntityEntry::new(99, 0);
    let handle: Arc<OnceLock<Weak<SequenceManager<Event>>>> = Arc::new(OnceLock::new());

    let lookup = Arc::clone(&handle);
    let manager = instant_manager(move |_: &Detection| {
        thread::sleep(Duration::from_millis(100));
        if let Some(manager) = lookup.get().and_then(Weak::upgrade) {
            assert!(manager.snapshot(bystander).is_empty());
        }
    });
    handle.set(Arc::downgrade(&manager)).unwrap();

    let (done_tx, done_rx) = bounded(2);

    // Holds the player's slot empty, then prunes it on release while the
    // listener below runs under the same slot's lock.
    let holder = {
        let manager = Arc::clone(&manager);
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            manager.registry().with_entity(player, true, |_| {
                thread::sleep(Duration::from_millis(50));
            });
            done_tx.send("holder").unwrap();
        })
    };
    thread::sleep(Duration::from_millis(10));

    let invoker = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            manager.invoke(player, &Event(JUMP));
            done_tx.send("invoker").unwrap();
        })
    };

    let first = done_rx.recv_timeout(Duration::from_secs(3)).unwrap();
    let second = done_rx.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_ne!(first, second);
    holder.join().unwrap();
    invoker.join().unwrap();

    assert_eq!(manager.stats().completed, 1);
    assert!(!manager.registry().contains(player));
}
