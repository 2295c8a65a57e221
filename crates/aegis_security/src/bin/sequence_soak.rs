//! # Sequence Soak
//!
//! Hammers a manager from several threads with random events, disconnects
//! and sweeps, then checks that every started sequence was accounted for.
//!
//! ```text
//! RUST_LOG=aegis_security=debug sequence_soak --threads 8 --players 500 --seconds 10
//! ```

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aegis_core::EntityEntry;
use aegis_security::{
    ChannelListener, CheatType, DetectionListener, EventKind, SecurityConfig, SecurityResult, SequenceDefinition,
    SequenceEvent, SequenceManager, SweepScheduler,
};
use rand::Rng;

const LOGIN: EventKind = EventKind::new(1);
const MOVE: EventKind = EventKind::new(2);
const JUMP: EventKind = EventKind::new(3);
const SHOOT: EventKind = EventKind::new(4);
const KINDS: [EventKind; 4] = [LOGIN, MOVE, JUMP, SHOOT];

struct SoakEvent {
    kind: EventKind,
    height: f32,
}

impl SequenceEvent for SoakEvent {
    fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Options {
    threads: usize,
    players: u32,
    seconds: u64,
    config: Option<String>,
}

fn parse_options() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let value = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    Options {
        threads: value("--threads").and_then(|s| s.parse().ok()).unwrap_or(4),
        players: value("--players").and_then(|s| s.parse().ok()).unwrap_or(256),
        seconds: value("--seconds").and_then(|s| s.parse().ok()).unwrap_or(5),
        config: value("--config"),
    }
}

fn definitions() -> SecurityResult<Vec<SequenceDefinition<SoakEvent>>> {
    Ok(vec![
        SequenceDefinition::builder("jump_after_login", CheatType::Suspicious)
            .trigger_on(LOGIN)
            .then_on(JUMP)
            .within(Duration::from_millis(50))
            .confidence(0.4)
            .build()?,
        SequenceDefinition::builder("super_jump", CheatType::Speedhack)
            .trigger_on(MOVE)
            .then(JUMP, |_, event: &SoakEvent| Ok(event.height > 8.0))
            .within(Duration::from_millis(20))
            .confidence(0.8)
            .build()?,
        SequenceDefinition::builder("spray", CheatType::Aimbot)
            .trigger_on(SHOOT)
            .then_on(SHOOT)
            .then_on(SHOOT)
            .within(Duration::from_millis(10))
            .concurrent(true)
            .build()?,
    ])
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let options = parse_options();
    if let Err(e) = run(&options) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(options: &Options) -> Result<(), Box<dyn Error>> {
    let config = match &options.config {
        Some(path) => SecurityConfig::load(path)?,
        None => SecurityConfig {
            sweep_interval_ms: 25,
            ..SecurityConfig::default()
        },
    };

    let mut manager = SequenceManager::new(config.clone());
    for definition in definitions()? {
        manager.register(definition)?;
    }
    let (listener, detections) = ChannelListener::new(4096);
    let listener = Arc::new(listener);
    manager.add_listener(Arc::clone(&listener) as Arc<dyn DetectionListener>);
    let manager = Arc::new(manager);

    let sweeper = SweepScheduler::spawn(Arc::clone(&manager), config.sweep_interval())?;

    println!(
        "Soaking {} players on {} threads for {}s",
        options.players, options.threads, options.seconds
    );

    let running = Arc::new(AtomicBool::new(true));
    let started = Instant::now();
    let workers: Vec<_> = (0..options.threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let running = Arc::clone(&running);
            let players = options.players;
            std::thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut invoked = 0u64;
                while running.load(Ordering::Relaxed) {
                    let entry = EntityEntry::new(rng.gen_range(0..players), 0);
                    if rng.gen_ratio(1, 200) {
                        manager.clean_entry(entry, true);
                        continue;
                    }
                    let event = SoakEvent {
                        kind: KINDS[rng.gen_range(0..KINDS.len())],
                        height: rng.gen_range(0.0..10.0),
                    };
                    manager.invoke(entry, &event);
                    invoked += 1;
                }
                invoked
            })
        })
        .collect();

    let mut received = 0u64;
    let deadline = started + Duration::from_secs(options.seconds);
    while Instant::now() < deadline {
        received += detections.try_iter().count() as u64;
        std::thread::sleep(Duration::from_millis(10));
    }
    running.store(false, Ordering::Relaxed);

    let mut invoked = 0u64;
    for worker in workers {
        invoked += worker.join().unwrap_or(0);
    }
    sweeper.shutdown();
    let shutdown = manager.clean(true);
    received += detections.try_iter().count() as u64;

    let stats = manager.stats();
    let elapsed = started.elapsed().as_secs_f64();
    println!();
    println!("Events:       {invoked} ({:.0}/s)", invoked as f64 / elapsed);
    println!("Started:      {}", stats.started);
    println!("Completed:    {}", stats.completed);
    println!("Expired:      {}", stats.expired);
    println!("Cancelled:    {} ({} at shutdown)", stats.cancelled, shutdown.cancelled);
    println!("Live:         {}", stats.live);
    println!("Detections:   {received} received, {} dropped", listener.dropped());

    let balanced = stats.live == 0
        && stats.started == stats.destroyed()
        && received + listener.dropped() == stats.completed;
    if balanced {
        println!("✓ Ledger balanced");
        Ok(())
    } else {
        Err("sequence ledger does not balance".into())
    }
}
