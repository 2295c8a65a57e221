//! # Sequence Registry
//!
//! Authoritative per-entity collection of live sequences.
//!
//! ## Locking
//!
//! ```text
//!   RwLock<HashMap<EntityEntry, Arc<Mutex<EntitySequences>>>>
//!          │ read: lookup           │ one mutex per entity
//!          │ write: create / prune  ▼
//!                            all mutations of that entity
//! ```
//!
//! The map lock is never held while waiting on an entity lock. Emptied
//! entities are pruned after the entity lock is released, and pruning only
//! try-locks the slot: if someone else holds it, that holder prunes when it
//! is done. A pruned slot is marked retired so a caller that fetched it just
//! before the prune retries on a fresh one.
//!
//! Work under one entity lock may take the map read lock and other entity
//! locks (a detection listener inspecting another player), never its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use aegis_core::EntityEntry;
use parking_lot::{Mutex, MutexGuard, RwLock};

use super::definition::SequenceDefinition;
use super::event::SequenceEvent;
use super::state::{Sequence, SequenceId, SequenceSnapshot, SequenceState};
use crate::error::{SecurityError, SecurityResult};

/// Live sequences of one entity.
pub struct EntitySequences<E> {
    sequences: Vec<Sequence<E>>,
    retired: bool,
}

impl<E> EntitySequences<E> {
    fn new() -> Self {
        Self {
            sequences: Vec::new(),
            retired: false,
        }
    }

    /// Number of sequences held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Returns true if no sequences are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Iterates the sequences.
    pub fn iter(&self) -> std::slice::Iter<'_, Sequence<E>> {
        self.sequences.iter()
    }

    /// Iterates the sequences mutably.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Sequence<E>> {
        self.sequences.iter_mut()
    }

    fn take(&mut self, id: SequenceId) -> Option<Sequence<E>> {
        let index = self.sequences.iter().position(|s| s.id() == id)?;
        Some(self.sequences.swap_remove(index))
    }
}

impl<E: SequenceEvent> EntitySequences<E> {
    /// Returns true if a running instance of `definition` blocks a new one.
    #[must_use]
    pub fn blocks(&self, definition: &SequenceDefinition<E>, now: Instant) -> bool {
        !definition.is_concurrent()
            && self
                .sequences
                .iter()
                .any(|s| s.definition().id() == definition.id() && !s.is_discontinued(now))
    }
}

/// Lifecycle counters kept by the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceStats {
    /// Sequences that started (registered, or finished on their trigger).
    pub started: u64,
    /// Sequences destroyed after completing.
    pub completed: u64,
    /// Sequences destroyed after failing or timing out.
    pub expired: u64,
    /// Sequences destroyed by forced cleanup while running.
    pub cancelled: u64,
    /// Sequences currently held.
    pub live: u64,
}

impl SequenceStats {
    /// Sequences destroyed so far.
    #[must_use]
    pub fn destroyed(&self) -> u64 {
        self.completed + self.expired + self.cancelled
    }
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    expired: AtomicU64,
    cancelled: AtomicU64,
    live: AtomicU64,
}

/// Sequences removed by one cleanup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Sequences removed.
    pub removed: usize,
    /// Of those, sequences that were still running and got cancelled.
    pub cancelled: usize,
}

impl CleanReport {
    fn merge(&mut self, other: Self) {
        self.removed += other.removed;
        self.cancelled += other.cancelled;
    }
}

type Slot<E> = Arc<Mutex<EntitySequences<E>>>;

/// Per-entity store of live sequences.
pub struct SequenceRegistry<E> {
    entities: RwLock<HashMap<EntityEntry, Slot<E>>>,
    max_per_entity: usize,
    counters: Counters,
}

impl<E: SequenceEvent> SequenceRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(max_per_entity: usize) -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            max_per_entity,
            counters: Counters::default(),
        }
    }

    /// Adds a sequence for `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::DuplicateSequence`] if a running instance of
    /// the same non-concurrent definition exists, or
    /// [`SecurityError::CapacityExceeded`] if the entity is full. The
    /// sequence is dropped in both cases.
    pub fn add(&self, entry: EntityEntry, sequence: Sequence<E>, now: Instant) -> SecurityResult<SequenceId> {
        self.with_entity_or_create(entry, |set| self.insert(set, sequence, now))
    }

    /// Copies the bookkeeping of every sequence held for `entry`.
    #[must_use]
    pub fn for_entity(&self, entry: EntityEntry) -> Vec<SequenceSnapshot> {
        self.with_entity(entry, false, |set| set.iter().map(Sequence::snapshot).collect())
            .unwrap_or_default()
    }

    /// Removes one sequence. Returns false if it was not held.
    pub fn remove(&self, entry: EntityEntry, id: SequenceId) -> bool {
        self.with_entity(entry, false, |set| self.evict(set, id).is_some())
            .unwrap_or(false)
    }

    /// Removes every sequence of `entry`, cancelling the running ones.
    pub fn remove_all_for(&self, entry: EntityEntry) -> CleanReport {
        self.with_entity(entry, false, |set| self.drain(set))
            .unwrap_or_default()
    }

    /// Removes every sequence of every entity, cancelling the running ones.
    pub fn remove_all(&self) -> CleanReport {
        let mut report = CleanReport::default();
        for entry in self.entries() {
            report.merge(self.remove_all_for(entry));
        }
        report
    }

    /// Removes the discontinued sequences of `entry`.
    pub fn remove_discontinued_for(&self, entry: EntityEntry, now: Instant) -> CleanReport {
        self.with_entity(entry, false, |set| self.sweep(set, now))
            .unwrap_or_default()
    }

    /// Removes the discontinued sequences of every entity.
    pub fn remove_discontinued(&self, now: Instant) -> CleanReport {
        let mut report = CleanReport::default();
        for entry in self.entries() {
            report.merge(self.remove_discontinued_for(entry, now));
        }
        report
    }

    /// Entities currently holding a slot.
    #[must_use]
    pub fn entries(&self) -> Vec<EntityEntry> {
        self.entities.read().keys().copied().collect()
    }

    /// Returns true if `entry` holds a slot.
    #[must_use]
    pub fn contains(&self, entry: EntityEntry) -> bool {
        self.entities.read().contains_key(&entry)
    }

    /// Number of entities holding a slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if no entity holds a slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Number of sequences held across all entities.
    #[must_use]
    pub fn sequence_count(&self) -> usize {
        usize::try_from(self.counters.live.load(Ordering::Acquire)).unwrap_or(usize::MAX)
    }

    /// Lifecycle counters.
    #[must_use]
    pub fn stats(&self) -> SequenceStats {
        SequenceStats {
            started: self.counters.started.load(Ordering::Acquire),
            completed: self.counters.completed.load(Ordering::Acquire),
            expired: self.counters.expired.load(Ordering::Acquire),
            cancelled: self.counters.cancelled.load(Ordering::Acquire),
            live: self.counters.live.load(Ordering::Acquire),
        }
    }

    /// Runs `f` under the lock of `entry`'s sequences.
    ///
    /// Returns `None` if the entity has no slot and `create` is false. The
    /// slot is pruned afterwards if `f` left it empty.
    pub fn with_entity<R>(
        &self,
        entry: EntityEntry,
        create: bool,
        f: impl FnOnce(&mut EntitySequences<E>) -> R,
    ) -> Option<R> {
        if create {
            return Some(self.with_entity_or_create(entry, f));
        }
        loop {
            let slot = self.slot(entry)?;
            let mut set = slot.lock();
            if set.retired {
                continue;
            }
            let result = f(&mut set);
            self.release(entry, set);
            return Some(result);
        }
    }

    /// Like [`with_entity`](Self::with_entity), creating the slot if needed.
    pub fn with_entity_or_create<R>(
        &self,
        entry: EntityEntry,
        f: impl FnOnce(&mut EntitySequences<E>) -> R,
    ) -> R {
        loop {
            let slot = self.slot_or_create(entry);
            let mut set = slot.lock();
            if set.retired {
                continue;
            }
            let result = f(&mut set);
            self.release(entry, set);
            return result;
        }
    }

    /// Inserts into a locked set.
    ///
    /// Discontinued instances of the same definition are evicted first.
    ///
    /// # Errors
    ///
    /// Same as [`SequenceRegistry::add`].
    pub fn insert(
        &self,
        set: &mut EntitySequences<E>,
        sequence: Sequence<E>,
        now: Instant,
    ) -> SecurityResult<SequenceId> {
        let definition = Arc::clone(sequence.definition());
        let stale: Vec<SequenceId> = set
            .iter()
            .filter(|s| s.definition().id() == definition.id() && s.is_discontinued(now))
            .map(Sequence::id)
            .collect();
        for id in stale {
            self.evict_finished(set, id);
        }

        if set.blocks(&definition, now) {
            return Err(SecurityError::DuplicateSequence {
                definition: definition.id(),
                entry: sequence.entry().to_string(),
            });
        }
        if set.len() >= self.max_per_entity {
            return Err(SecurityError::CapacityExceeded {
                entry: sequence.entry().to_string(),
                limit: self.max_per_entity,
            });
        }

        let id = sequence.id();
        set.sequences.push(sequence);
        self.counters.started.fetch_add(1, Ordering::AcqRel);
        self.counters.live.fetch_add(1, Ordering::AcqRel);
        Ok(id)
    }

    /// Removes one sequence from a locked set and destroys it.
    ///
    /// Running sequences are cancelled. Returns the final state, `None` if
    /// the sequence was not held.
    pub fn evict(&self, set: &mut EntitySequences<E>, id: SequenceId) -> Option<SequenceState> {
        let mut sequence = set.take(id)?;
        sequence.cancel();
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
        Some(self.retire(sequence))
    }

    /// Records the destruction of a sequence that never entered a set.
    pub(crate) fn record_transient(&self, sequence: Sequence<E>) -> SequenceState {
        self.counters.started.fetch_add(1, Ordering::AcqRel);
        self.retire(sequence)
    }

    fn retire(&self, sequence: Sequence<E>) -> SequenceState {
        let state = sequence.state();
        let counter = match state {
            SequenceState::Completed => &self.counters.completed,
            SequenceState::Cancelled => &self.counters.cancelled,
            SequenceState::Expired | SequenceState::Pending | SequenceState::Active => {
                &self.counters.expired
            }
        };
        counter.fetch_add(1, Ordering::AcqRel);
        tracing::trace!("Destroyed {} for {} as {:?}", sequence.id(), sequence.entry(), state);
        state
    }

    fn drain(&self, set: &mut EntitySequences<E>) -> CleanReport {
        let ids: Vec<SequenceId> = set.iter().map(Sequence::id).collect();
        let mut report = CleanReport::default();
        for id in ids {
            if let Some(state) = self.evict(set, id) {
                report.removed += 1;
                if state == SequenceState::Cancelled {
                    report.cancelled += 1;
                }
            }
        }
        report
    }

    fn sweep(&self, set: &mut EntitySequences<E>, now: Instant) -> CleanReport {
        let ids: Vec<SequenceId> = set
            .iter()
            .filter(|s| s.is_discontinued(now))
            .map(Sequence::id)
            .collect();
        let mut report = CleanReport::default();
        for id in ids {
            if self.evict_finished(set, id).is_some() {
                report.removed += 1;
            }
        }
        report
    }

    /// Like [`evict`](Self::evict), but never cancels: a sequence still in a
    /// running state is recorded as expired.
    pub fn evict_finished(&self, set: &mut EntitySequences<E>, id: SequenceId) -> Option<SequenceState> {
        let sequence = set.take(id)?;
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
        Some(self.retire(sequence))
    }

    fn slot(&self, entry: EntityEntry) -> Option<Slot<E>> {
        self.entities.read().get(&entry).map(Arc::clone)
    }

    fn slot_or_create(&self, entry: EntityEntry) -> Slot<E> {
        if let Some(slot) = self.slot(entry) {
            return slot;
        }
        let mut entities = self.entities.write();
        let slot = entities
            .entry(entry)
            .or_insert_with(|| Arc::new(Mutex::new(EntitySequences::new())));
        Arc::clone(slot)
    }

    fn release(&self, entry: EntityEntry, set: MutexGuard<'_, EntitySequences<E>>) {
        let empty = set.is_empty();
        drop(set);
        if empty {
            self.prune(entry);
        }
    }

    fn prune(&self, entry: EntityEntry) {
        let mut entities = self.entities.write();
        let retire = match entities.get(&entry) {
            // Contended: the holder prunes on release
            Some(slot) => match slot.try_lock() {
                Some(mut set) if set.is_empty() && !set.retired => {
                    set.retired = true;
                    true
                }
                _ => false,
            },
            None => false,
        };
        if retire {
            entities.remove(&entry);
            tracing::trace!("Pruned empty sequence set of {}", entry);
        }
    }
}
