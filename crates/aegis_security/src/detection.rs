//! # Detections
//!
//! A detection is emitted when a sequence reaches its final step. Listeners
//! are called synchronously, inside the entity's critical section, exactly
//! once per completed sequence. They must not block: hand the detection off
//! (see [`ChannelListener`]) and do the expensive work elsewhere.
//!
//! A listener may call into the manager for other entities. Calling back
//! for the entity being notified deadlocks on its own lock.
//!
//! ## Categories
//!
//! - **Aimbot**: Impossibly fast target acquisition, perfect tracking
//! - **Speedhack**: Movement faster than physics allows
//! - **Teleport**: Position jumps without valid movement
//! - **Wallhack**: Shooting through walls, pre-aiming
//! - **Suspicious**: Anything else worth a human look

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use aegis_core::EntityEntry;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::sequence::{DefinitionId, SequenceId};

/// Types of cheats a definition can detect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheatType {
    /// Aim assistance software.
    Aimbot,
    /// Speed modification.
    Speedhack,
    /// Position manipulation.
    Teleport,
    /// Possible wallhack (shooting through geometry).
    Wallhack,
    /// Generic suspicious behavior.
    Suspicious,
}

/// A completed detection sequence.
#[derive(Clone, Debug)]
pub struct Detection {
    /// The flagged entity.
    pub entry: EntityEntry,
    /// Definition that matched.
    pub definition: DefinitionId,
    /// Definition name.
    pub name: String,
    /// Category of the definition.
    pub cheat_type: CheatType,
    /// Confidence level (0.0 - 1.0).
    pub confidence: f32,
    /// The sequence instance.
    pub sequence: SequenceId,
    /// Steps consumed, trigger included.
    pub steps: usize,
    /// When the trigger matched.
    pub started_at: Instant,
    /// When the final step matched.
    pub completed_at: Instant,
}

impl Detection {
    /// Time from trigger to final step.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.completed_at.saturating_duration_since(self.started_at)
    }
}

/// Receives detections.
pub trait DetectionListener: Send + Sync {
    /// Called once per completed sequence.
    fn on_detection(&self, detection: &Detection);
}

impl<F> DetectionListener for F
where
    F: Fn(&Detection) + Send + Sync,
{
    fn on_detection(&self, detection: &Detection) {
        self(detection);
    }
}

/// Forwards detections to a bounded channel.
///
/// Never blocks the engine: when the channel is full the detection is
/// dropped and counted.
pub struct ChannelListener {
    tx: Sender<Detection>,
    dropped: AtomicU64,
}

impl ChannelListener {
    /// Creates a listener and the receiving end of its channel.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<Detection>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of detections dropped because the channel was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl DetectionListener for ChannelListener {
    fn on_detection(&self, detection: &Detection) {
        match self.tx.try_send(detection.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(d)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Detection channel full, dropped {} for {}", d.name, d.entry);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Logs every detection.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogListener;

impl DetectionListener for LogListener {
    fn on_detection(&self, detection: &Detection) {
        tracing::info!(
            "Detection: {} flagged {:?} via `{}` (confidence {:.2}, {} steps in {:?})",
            detection.entry,
            detection.cheat_type,
            detection.name,
            detection.confidence,
            detection.steps,
            detection.duration()
        );
    }
}
