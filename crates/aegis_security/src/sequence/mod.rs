//! # Detection Sequences
//!
//! Multi-step cheat detection. A definition describes an ordered chain of
//! events; every entity gets its own running instances, advanced as the
//! host feeds events in.
//!
//! - [`definition`]: immutable templates and their builder
//! - [`state`]: the per-instance state machine
//! - [`registry`]: per-entity storage with its locking discipline
//! - [`manager`]: dispatch, notification and cleanup
//! - [`sweep`]: periodic cleanup of timed-out instances

pub mod definition;
pub mod event;
pub mod manager;
pub mod registry;
pub mod state;
pub mod sweep;

pub use definition::{
    DefinitionId, SequenceDefinition, SequenceDefinitionBuilder, Step, StepContext, StepPredicate,
};
pub use event::{EventKind, SequenceEvent};
pub use manager::SequenceManager;
pub use registry::{CleanReport, EntitySequences, SequenceRegistry, SequenceStats};
pub use state::{Sequence, SequenceId, SequenceSnapshot, SequenceState, StepResult};
#[cfg(feature = "async-sweep")]
pub use sweep::spawn_sweep_task;
pub use sweep::SweepScheduler;
