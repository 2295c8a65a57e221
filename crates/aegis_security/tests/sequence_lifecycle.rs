//! Integration tests for the sequence lifecycle.
//!
//! Driven through the public manager API with a manual clock, so timeouts
//! are exact.

use std::sync::Arc;
use std::time::Duration;

use aegis_core::{EntityEntry, GameKey, GameValue, ManualClock};
use aegis_security::{
    ChannelListener, CheatType, CleanReport, Detection, EventKind, PredicateError,
    SecurityConfig, SequenceDefinition, SequenceEvent, SequenceManager, SequenceState,
};
use crossbeam_channel::Receiver;

const LOGIN: EventKind = EventKind::new(1);
const JUMP: EventKind = EventKind::new(2);
const MOVE: EventKind = EventKind::new(3);
const LOGOUT: EventKind = EventKind::new(4);

const START_Y: GameKey<f32> = GameKey::new("start_y");

#[derive(Clone, Copy)]
struct GameEvent {
    kind: EventKind,
    y: f32,
}

impl GameEvent {
    fn of(kind: EventKind) -> Self {
        Self { kind, y: 0.0 }
    }

    fn at(kind: EventKind, y: f32) -> Self {
        Self { kind, y }
    }
}

impl SequenceEvent for GameEvent {
    fn kind(&self) -> EventKind {
        self.kind
    }
}

fn login_jump() -> SequenceDefinition<GameEvent> {
    SequenceDefinition::builder("login_jump", CheatType::Suspicious)
        .trigger_on(LOGIN)
        .then_on(JUMP)
        .within(Duration::from_secs(5))
        .confidence(0.6)
        .build()
        .unwrap()
}

fn setup(
    definitions: Vec<SequenceDefinition<GameEvent>>,
) -> (SequenceManager<GameEvent>, ManualClock, Receiver<Detection>) {
    let clock = ManualClock::new();
    let mut manager = SequenceManager::with_clock(SecurityConfig::default(), Arc::new(clock.clone()));
    for definition in definitions {
        manager.register(definition).unwrap();
    }
    let (listener, rx) = ChannelListener::new(64);
    manager.add_listener(Arc::new(listener));
    (manager, clock, rx)
}

#[test]
fn test_login_jump_within_timeout() {
    let (manager, clock, rx) = setup(vec![login_jump()]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    let held = manager.snapshot(player);
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].state, SequenceState::Active);

    clock.advance(Duration::from_secs(3));
    manager.invoke(player, &GameEvent::of(JUMP));

    let detection = rx.try_recv().unwrap();
    assert_eq!(detection.entry, player);
    assert_eq!(detection.name, "login_jump");
    assert_eq!(detection.cheat_type, CheatType::Suspicious);
    assert!((detection.confidence - 0.6).abs() < f32::EPSILON);
    assert_eq!(detection.duration(), Duration::from_secs(3));
    assert!(rx.try_recv().is_err());

    manager.clean_entry(player, false);
    assert!(manager.snapshot(player).is_empty());
}

#[test]
fn test_login_jump_after_timeout() {
    let (manager, clock, rx) = setup(vec![login_jump()]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    clock.advance(Duration::from_secs(5) + Duration::from_millis(1));
    manager.invoke(player, &GameEvent::of(JUMP));

    assert!(rx.try_recv().is_err());
    assert_eq!(manager.clean(false), CleanReport { removed: 1, cancelled: 0 });
    assert!(manager.snapshot(player).is_empty());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_exact_deadline_still_accepted() {
    let (manager, clock, rx) = setup(vec![login_jump()]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    clock.advance(Duration::from_secs(5));
    manager.invoke(player, &GameEvent::of(JUMP));

    assert!(rx.try_recv().is_ok());
}

#[test]
fn test_retrigger_while_running_keeps_first() {
    let (manager, clock, _rx) = setup(vec![login_jump()]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    let first = manager.snapshot(player)[0];
    clock.advance(Duration::from_secs(1));
    manager.invoke(player, &GameEvent::of(LOGIN));

    let held = manager.snapshot(player);
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].id, first.id);
    assert_eq!(held[0].created_at, first.created_at);
}

#[test]
fn test_retrigger_after_timeout_replaces() {
    let (manager, clock, rx) = setup(vec![login_jump()]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    let first = manager.snapshot(player)[0].id;
    clock.advance(Duration::from_secs(10));
    manager.invoke(player, &GameEvent::of(LOGIN));

    let held = manager.snapshot(player);
    assert_eq!(held.len(), 1);
    assert_ne!(held[0].id, first);

    clock.advance(Duration::from_secs(1));
    manager.invoke(player, &GameEvent::of(JUMP));
    assert_eq!(rx.try_recv().unwrap().duration(), Duration::from_secs(1));
}

#[test]
fn test_entities_are_isolated() {
    let (manager, _clock, rx) = setup(vec![login_jump()]);
    let alice = EntityEntry::new(1, 0);
    let bob = EntityEntry::new(2, 0);

    manager.invoke(alice, &GameEvent::of(LOGIN));
    manager.invoke(bob, &GameEvent::of(JUMP));

    assert!(rx.try_recv().is_err());
    assert_eq!(manager.snapshot(alice).len(), 1);
    assert!(manager.snapshot(bob).is_empty());
}

#[test]
fn test_generations_are_distinct_entities() {
    let (manager, _clock, rx) = setup(vec![login_jump()]);
    let old = EntityEntry::new(5, 0);
    let reused = old.next_generation();

    manager.invoke(old, &GameEvent::of(LOGIN));
    manager.invoke(reused, &GameEvent::of(JUMP));

    assert!(rx.try_recv().is_err());
    assert_eq!(manager.snapshot(old).len(), 1);
}

#[test]
fn test_disconnect_cancels_without_detection() {
    let (manager, _clock, rx) = setup(vec![login_jump()]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    let report = manager.clean_entry(player, true);
    assert_eq!(report, CleanReport { removed: 1, cancelled: 1 });

    // The player comes back on the same slot
    manager.invoke(player, &GameEvent::of(JUMP));
    assert!(rx.try_recv().is_err());
    assert!(!manager.registry().contains(player));
}

#[test]
fn test_unforced_clean_leaves_running_untouched() {
    let (manager, clock, _rx) = setup(vec![login_jump()]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    clock.advance(Duration::from_secs(2));
    let before = manager.snapshot(player);

    assert_eq!(manager.clean(false), CleanReport::default());
    assert_eq!(manager.clean_entry(player, false), CleanReport::default());
    assert_eq!(manager.snapshot(player), before);
}

#[test]
fn test_forced_clean_is_idempotent() {
    let (manager, _clock, _rx) = setup(vec![login_jump()]);
    for i in 0..4 {
        manager.invoke(EntityEntry::new(i, 0), &GameEvent::of(LOGIN));
    }

    assert_eq!(manager.clean(true).removed, 4);
    assert_eq!(manager.clean(true), CleanReport::default());
    assert!(manager.registry().is_empty());
}

#[test]
fn test_captured_values_flow_between_steps() {
    let rise = SequenceDefinition::builder("rise", CheatType::Speedhack)
        .trigger(MOVE, |ctx, event: &GameEvent| {
            ctx.captures_mut().insert(GameValue::with_value(START_Y, 0.0, event.y));
            Ok(true)
        })
        .then(JUMP, |ctx, event: &GameEvent| {
            let start = ctx.captures().get(&START_Y)?;
            Ok(event.y - start > 8.0)
        })
        .within(Duration::from_millis(500))
        .build()
        .unwrap();
    let (manager, clock, rx) = setup(vec![rise]);
    let honest = EntityEntry::new(1, 0);
    let cheater = EntityEntry::new(2, 0);

    manager.invoke(honest, &GameEvent::at(MOVE, 10.0));
    manager.invoke(cheater, &GameEvent::at(MOVE, 10.0));
    clock.advance(Duration::from_millis(100));
    manager.invoke(honest, &GameEvent::at(JUMP, 11.5));
    manager.invoke(cheater, &GameEvent::at(JUMP, 25.0));

    let detection = rx.try_recv().unwrap();
    assert_eq!(detection.entry, cheater);
    assert!(rx.try_recv().is_err());
    assert!(manager.snapshot(honest).is_empty());
    assert_eq!(manager.stats().expired, 1);
}

#[test]
fn test_missing_capture_fails_only_that_sequence() {
    let broken = SequenceDefinition::builder("broken", CheatType::Suspicious)
        .trigger_on(LOGIN)
        .then(JUMP, |ctx, _: &GameEvent| {
            let _ = ctx.captures().get(&START_Y)?;
            Err(PredicateError::new("unreachable"))
        })
        .build()
        .unwrap();
    let (manager, _clock, rx) = setup(vec![broken, login_jump()]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    manager.invoke(player, &GameEvent::of(JUMP));

    assert_eq!(rx.try_recv().unwrap().name, "login_jump");
    assert!(manager.snapshot(player).is_empty());
}

#[test]
fn test_three_step_sequence_with_interleaved_noise() {
    let session = SequenceDefinition::builder("session", CheatType::Teleport)
        .trigger_on(LOGIN)
        .then_on(MOVE)
        .then_on(LOGOUT)
        .expire_after(Duration::from_secs(60))
        .build()
        .unwrap();
    let (manager, clock, rx) = setup(vec![session]);
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    manager.invoke(player, &GameEvent::of(JUMP));
    manager.invoke(player, &GameEvent::of(LOGOUT));
    assert_eq!(manager.snapshot(player)[0].step, 1);

    clock.advance(Duration::from_secs(10));
    manager.invoke(player, &GameEvent::of(MOVE));
    assert_eq!(manager.snapshot(player)[0].step, 2);

    clock.advance(Duration::from_secs(10));
    manager.invoke(player, &GameEvent::of(LOGOUT));
    let detection = rx.try_recv().unwrap();
    assert_eq!(detection.steps, 3);
    assert_eq!(detection.duration(), Duration::from_secs(20));
}

#[test]
fn test_whole_sequence_timeout_from_config() {
    let clock = ManualClock::new();
    let config = SecurityConfig::from_toml_str("default_sequence_timeout_ms = 1000").unwrap();
    let mut manager = SequenceManager::with_clock(config, Arc::new(clock.clone()));
    manager
        .register(
            SequenceDefinition::builder("slow", CheatType::Suspicious)
                .trigger_on(LOGIN)
                .then_on(JUMP)
                .build()
                .unwrap(),
        )
        .unwrap();
    let player = EntityEntry::new(1, 0);

    manager.invoke(player, &GameEvent::of(LOGIN));
    clock.advance(Duration::from_millis(1500));

    assert_eq!(manager.clean(false).removed, 1);
    assert_eq!(manager.stats().expired, 1);
}

#[test]
fn test_ledger_balances_after_mixed_traffic() {
    let (manager, clock, rx) = setup(vec![login_jump()]);

    for i in 0..20 {
        manager.invoke(EntityEntry::new(i, 0), &GameEvent::of(LOGIN));
    }
    for i in 0..5 {
        manager.invoke(EntityEntry::new(i, 0), &GameEvent::of(JUMP));
    }
    for i in 5..8 {
        manager.clean_entry(EntityEntry::new(i, 0), true);
    }
    clock.advance(Duration::from_secs(6));
    manager.clean(false);

    let stats = manager.stats();
    assert_eq!(stats.started, 20);
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.cancelled, 3);
    assert_eq!(stats.expired, 12);
    assert_eq!(stats.live, 0);
    assert_eq!(rx.try_iter().count(), 5);
}
