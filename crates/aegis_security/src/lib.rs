//! # AEGIS Security - The Sequence Engine
//!
//! Server-side detection of cheats that only show up as a pattern of events
//! over time: a login followed by an impossible jump, a burst of perfect
//! headshots after a wall peek.
//!
//! ## Features
//!
//! - **Sequences**: Ordered steps with predicates and timeouts
//! - **Per-Entity Isolation**: One lock per player, players run in parallel
//! - **Lazy Timeouts**: Evaluated on access, swept in the background
//! - **Forced Cleanup**: Drop everything on disconnect, never a false report
//!
//! ## Architecture
//!
//! ```text
//! GAME SERVER                          AEGIS
//!     │                                  │
//!     │─── invoke(entry, event) ────────►│ SequenceManager
//!     │                                  │   │
//!     │                                  │   ▼
//!     │                          ┌───────────────────┐
//!     │                          │ SequenceRegistry  │ entry → [Sequence]
//!     │                          └───────────────────┘
//!     │                                  │
//!     │◄─── Detection ───────────────────┤ DetectionListener
//!     │                                  │
//!     │─── clean_entry(entry, true) ────►│ on disconnect
//!     │                                  │
//!     │                         SweepScheduler ── clean(false) every interval
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use aegis_core::EntityEntry;
//! use aegis_security::{
//!     CheatType, Detection, EventKind, SecurityConfig, SequenceDefinition, SequenceEvent,
//!     SequenceManager,
//! };
//!
//! const LOGIN: EventKind = EventKind::new(1);
//! const JUMP: EventKind = EventKind::new(2);
//!
//! struct Event(EventKind);
//! impl SequenceEvent for Event {
//!     fn kind(&self) -> EventKind { self.0 }
//! }
//!
//! let mut manager = SequenceManager::<Event>::new(SecurityConfig::default());
//! manager.register(
//!     SequenceDefinition::builder("jump_after_login", CheatType::Suspicious)
//!         .trigger_on(LOGIN)
//!         .then_on(JUMP)
//!         .within(Duration::from_secs(5))
//!         .build()?,
//! )?;
//! manager.add_listener(Arc::new(|d: &Detection| println!("{} flagged", d.entry)));
//!
//! let player = EntityEntry::new(1, 0);
//! manager.invoke(player, &Event(LOGIN));
//! manager.invoke(player, &Event(JUMP));
//! assert_eq!(manager.stats().completed, 1);
//!
//! manager.clean_entry(player, true);
//! # Ok::<(), aegis_security::SecurityError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod detection;
pub mod error;
pub mod sequence;

pub use config::SecurityConfig;
pub use detection::{ChannelListener, CheatType, Detection, DetectionListener, LogListener};
pub use error::{PredicateError, SecurityError, SecurityResult};
#[cfg(feature = "async-sweep")]
pub use sequence::spawn_sweep_task;
pub use sequence::{
    CleanReport, DefinitionId, EventKind, SequenceDefinition, SequenceEvent, SequenceId,
    SequenceManager, SequenceSnapshot, SequenceState, SequenceStats, StepContext, SweepScheduler,
};
