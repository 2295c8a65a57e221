//! # Sequence State Machine
//!
//! ## States
//!
//! - **Pending**: Created from a matching trigger, trigger not yet consumed
//! - **Active**: At least one step consumed
//! - **Completed**: Final step matched (detection fired)
//! - **Expired**: Predicate mismatch, predicate error, or a deadline overrun
//! - **Cancelled**: Removed by forced cleanup
//!
//! Sequences only move forward. Timeouts are evaluated against the instant
//! passed in by the caller, never by timers.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use aegis_core::{EntityEntry, GameValueMap};

use super::definition::{DefinitionId, SequenceDefinition, StepContext};
use super::event::SequenceEvent;

/// Identifier of one sequence instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(u64);

impl SequenceId {
    /// Creates an id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Numeric value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq-{}", self.0)
    }
}

/// Lifecycle state of a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SequenceState {
    /// Created, trigger not yet consumed.
    Pending,
    /// At least one step consumed.
    Active,
    /// Final step matched.
    Completed,
    /// Failed or timed out.
    Expired,
    /// Forcefully removed.
    Cancelled,
}

impl SequenceState {
    /// Returns true for `Completed`, `Expired` and `Cancelled`.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Cancelled)
    }
}

/// Outcome of [`Sequence::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// Step matched, more steps remain.
    Continue,
    /// Final step matched.
    Complete,
    /// Sequence expired.
    Fail,
}

/// A running instance of a definition for one entity.
pub struct Sequence<E> {
    id: SequenceId,
    definition: Arc<SequenceDefinition<E>>,
    entry: EntityEntry,
    state: SequenceState,
    /// Index of the next step to consume.
    step: usize,
    created_at: Instant,
    last_advanced: Instant,
    captures: GameValueMap,
}

impl<E: SequenceEvent> Sequence<E> {
    /// Creates a pending sequence.
    #[must_use]
    pub fn new(
        id: SequenceId,
        definition: Arc<SequenceDefinition<E>>,
        entry: EntityEntry,
        now: Instant,
    ) -> Self {
        Self {
            id,
            definition,
            entry,
            state: SequenceState::Pending,
            step: 0,
            created_at: now,
            last_advanced: now,
            captures: GameValueMap::new(),
        }
    }

    /// Returns true if `event` matches the current step and the step is
    /// still within its deadline.
    #[must_use]
    pub fn accepts(&self, event: &E, now: Instant) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(step) = self.definition.step(self.step) else {
            return false;
        };
        step.kind() == event.kind() && !self.deadline_passed(now)
    }

    /// Consumes `event` as the current step.
    ///
    /// Fails the sequence on a deadline overrun, a kind mismatch, a
    /// predicate returning `false`, or a predicate error. Terminal sequences
    /// return [`StepResult::Fail`] and stay as they are.
    pub fn advance(&mut self, event: &E, now: Instant) -> StepResult {
        if self.state.is_terminal() {
            return StepResult::Fail;
        }
        if self.deadline_passed(now) {
            tracing::debug!("{} for {} overran its deadline at step {}", self.id, self.entry, self.step);
            return self.expire();
        }

        let definition = Arc::clone(&self.definition);
        let Some(step) = definition.step(self.step) else {
            return self.expire();
        };
        if step.kind() != event.kind() {
            return self.expire();
        }

        let mut ctx = StepContext::new(
            self.entry,
            self.step,
            self.created_at,
            self.last_advanced,
            now,
            &mut self.captures,
        );
        match step.evaluate(&mut ctx, event) {
            Ok(true) => {}
            Ok(false) => {
                tracing::trace!("{} for {} rejected at step {}", self.id, self.entry, self.step);
                return self.expire();
            }
            Err(err) => {
                tracing::warn!(
                    "Definition `{}` failed on {} at step {}: {}",
                    definition.name(),
                    self.entry,
                    self.step,
                    err
                );
                return self.expire();
            }
        }

        self.step += 1;
        self.last_advanced = now;
        if self.step >= definition.len() {
            self.state = SequenceState::Completed;
            tracing::debug!("{} for {} completed `{}`", self.id, self.entry, definition.name());
            StepResult::Complete
        } else {
            self.state = SequenceState::Active;
            StepResult::Continue
        }
    }

    /// Returns true once the sequence can no longer make progress.
    #[must_use]
    pub fn is_discontinued(&self, now: Instant) -> bool {
        self.state.is_terminal() || self.deadline_passed(now)
    }

    /// Forcefully stops the sequence. Returns true if it was still running.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SequenceState::Cancelled;
        true
    }

    /// Deadline for the current step, if it has one.
    #[must_use]
    pub fn step_deadline(&self) -> Option<Instant> {
        if self.state != SequenceState::Active {
            return None;
        }
        let timeout = self.definition.step(self.step)?.timeout()?;
        Some(self.last_advanced + timeout)
    }

    /// Deadline for the whole sequence, if it has one.
    #[must_use]
    pub fn expiry_deadline(&self) -> Option<Instant> {
        self.definition.expire_after().map(|t| self.created_at + t)
    }

    fn deadline_passed(&self, now: Instant) -> bool {
        let step_over = self.step_deadline().is_some_and(|d| now > d);
        let sequence_over = self.expiry_deadline().is_some_and(|d| now > d);
        step_over || sequence_over
    }

    fn expire(&mut self) -> StepResult {
        self.state = SequenceState::Expired;
        StepResult::Fail
    }
}

impl<E> Sequence<E> {
    /// Instance id.
    #[must_use]
    pub fn id(&self) -> SequenceId {
        self.id
    }

    /// The definition this sequence runs.
    #[must_use]
    pub fn definition(&self) -> &Arc<SequenceDefinition<E>> {
        &self.definition
    }

    /// The entity this sequence runs for.
    #[must_use]
    pub fn entry(&self) -> EntityEntry {
        self.entry
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// Index of the next step to consume.
    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    /// When the sequence was created.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the last step was consumed.
    #[must_use]
    pub fn last_advanced(&self) -> Instant {
        self.last_advanced
    }

    /// Values captured by the steps so far.
    #[must_use]
    pub fn captures(&self) -> &GameValueMap {
        &self.captures
    }

    /// Read-only copy of the bookkeeping fields.
    #[must_use]
    pub fn snapshot(&self) -> SequenceSnapshot {
        SequenceSnapshot {
            id: self.id,
            definition: self.definition.id(),
            entry: self.entry,
            state: self.state,
            step: self.step,
            created_at: self.created_at,
            last_advanced: self.last_advanced,
        }
    }
}

impl<E> fmt::Debug for Sequence<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("id", &self.id)
            .field("definition", &self.definition.name())
            .field("entry", &self.entry)
            .field("state", &self.state)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

/// Copy of a sequence's bookkeeping, safe to hold outside the entity lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequenceSnapshot {
    /// Instance id.
    pub id: SequenceId,
    /// Definition id.
    pub definition: DefinitionId,
    /// Entity.
    pub entry: EntityEntry,
    /// State at snapshot time.
    pub state: SequenceState,
    /// Next step index.
    pub step: usize,
    /// Creation time.
    pub created_at: Instant,
    /// Last step time.
    pub last_advanced: Instant,
}
