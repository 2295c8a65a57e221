//! # Sequence Manager
//!
//! Dispatches game events to sequences and cleans up the ones that are done.
//!
//! ## Invoke
//!
//! ```text
//!   (entry, event)
//!        │
//!        ▼  lock entry
//!   ┌─────────────────────────┐
//!   │ 1. advance accepting    │──► Complete ──► listeners (once)
//!   │ 2. evict finished       │
//!   │ 3. start triggered      │◄── dispatch table: EventKind → definitions
//!   └─────────────────────────┘
//!        ▼  unlock entry
//! ```
//!
//! Finished sequences are evicted before triggers are evaluated, so one event
//! can end a sequence and start the next instance of the same definition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use aegis_core::{EntityEntry, MonotonicClock, SystemClock};

use super::definition::{DefinitionId, SequenceDefinition};
use super::event::{EventKind, SequenceEvent};
use super::registry::{CleanReport, EntitySequences, SequenceRegistry, SequenceStats};
use super::state::{Sequence, SequenceId, SequenceSnapshot, StepResult};
use crate::config::SecurityConfig;
use crate::detection::{Detection, DetectionListener};
use crate::error::{SecurityError, SecurityResult};

/// Orchestrates sequences for every tracked entity.
///
/// Definitions and listeners are registered at startup through `&mut self`;
/// afterwards the manager is shared (`Arc`) and every operation takes
/// `&self`.
///
/// Listeners run under the entity's lock. They may query or feed other
/// entities, but must not call back into the manager for the same entity.
pub struct SequenceManager<E> {
    config: SecurityConfig,
    definitions: Vec<Arc<SequenceDefinition<E>>>,
    /// Trigger kind → definitions starting on it.
    dispatch: HashMap<EventKind, Vec<DefinitionId>>,
    registry: SequenceRegistry<E>,
    listeners: Vec<Arc<dyn DetectionListener>>,
    clock: Arc<dyn MonotonicClock>,
    next_sequence: AtomicU64,
}

impl<E: SequenceEvent + 'static> SequenceManager<E> {
    /// Creates a manager on the system clock.
    #[must_use]
    pub fn new(config: SecurityConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a manager on the given clock.
    #[must_use]
    pub fn with_clock(config: SecurityConfig, clock: Arc<dyn MonotonicClock>) -> Self {
        let registry = SequenceRegistry::new(config.max_sequences_per_entity);
        Self {
            config,
            definitions: Vec::new(),
            dispatch: HashMap::new(),
            registry,
            listeners: Vec::new(),
            clock,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Registers a definition.
    ///
    /// Unset timeouts are filled from the config.
    ///
    /// # Errors
    ///
    /// Returns error if a definition with the same name is registered.
    pub fn register(&mut self, mut definition: SequenceDefinition<E>) -> SecurityResult<DefinitionId> {
        if self.definitions.iter().any(|d| d.name() == definition.name()) {
            return Err(SecurityError::InvalidDefinition {
                name: definition.name().to_string(),
                reason: "name already registered".to_string(),
            });
        }

        let index = u32::try_from(self.definitions.len()).map_err(|_| SecurityError::InvalidDefinition {
            name: definition.name().to_string(),
            reason: "too many definitions".to_string(),
        })?;
        let id = DefinitionId::new(index);
        definition.register(id, &self.config);

        self.dispatch
            .entry(definition.trigger_kind())
            .or_default()
            .push(id);
        tracing::debug!(
            "Registered sequence `{}` as {} ({} steps, trigger {:?})",
            definition.name(),
            id,
            definition.len(),
            definition.trigger_kind()
        );
        self.definitions.push(Arc::new(definition));
        Ok(id)
    }

    /// Adds a detection listener.
    pub fn add_listener(&mut self, listener: Arc<dyn DetectionListener>) {
        self.listeners.push(listener);
    }

    /// Feeds one event of `entry` through its sequences.
    pub fn invoke(&self, entry: EntityEntry, event: &E) {
        let now = self.clock.now();
        let triggered = self
            .dispatch
            .get(&event.kind())
            .map_or(&[][..], Vec::as_slice);

        // Entities without sequences only get a slot if something triggers
        self.registry.with_entity(entry, !triggered.is_empty(), |set| {
            self.advance_all(set, event, now);
            self.start_triggered(entry, set, event, triggered, now);
        });
    }

    /// Removes discontinued sequences of every entity, or every sequence
    /// when `force` is set.
    pub fn clean(&self, force: bool) -> CleanReport {
        let report = if force {
            self.registry.remove_all()
        } else {
            self.registry.remove_discontinued(self.clock.now())
        };
        if report.removed > 0 {
            tracing::debug!(
                "Cleaned {} sequences ({} cancelled, forced: {})",
                report.removed,
                report.cancelled,
                force
            );
        }
        report
    }

    /// Removes discontinued sequences of `entry`, or all of them when
    /// `force` is set. Call with `force` on disconnect.
    pub fn clean_entry(&self, entry: EntityEntry, force: bool) -> CleanReport {
        let report = if force {
            self.registry.remove_all_for(entry)
        } else {
            self.registry.remove_discontinued_for(entry, self.clock.now())
        };
        if report.removed > 0 {
            tracing::debug!(
                "Cleaned {} sequences of {} ({} cancelled, forced: {})",
                report.removed,
                entry,
                report.cancelled,
                force
            );
        }
        report
    }

    /// Copies the bookkeeping of `entry`'s sequences.
    #[must_use]
    pub fn snapshot(&self, entry: EntityEntry) -> Vec<SequenceSnapshot> {
        self.registry.for_entity(entry)
    }

    /// Lifecycle counters.
    #[must_use]
    pub fn stats(&self) -> SequenceStats {
        self.registry.stats()
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &SequenceRegistry<E> {
        &self.registry
    }

    /// Registered definition by id.
    #[must_use]
    pub fn definition(&self, id: DefinitionId) -> Option<&Arc<SequenceDefinition<E>>> {
        self.definitions.get(id.index())
    }

    /// All registered definitions.
    #[must_use]
    pub fn definitions(&self) -> &[Arc<SequenceDefinition<E>>] {
        &self.definitions
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Current time on the manager's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Advances every accepting sequence, then evicts the finished ones.
    fn advance_all(&self, set: &mut EntitySequences<E>, event: &E, now: Instant) {
        let mut finished: Vec<SequenceId> = Vec::new();
        for sequence in set.iter_mut() {
            if !sequence.accepts(event, now) {
                continue;
            }
            match sequence.advance(event, now) {
                StepResult::Continue => {}
                StepResult::Complete => {
                    self.notify(sequence, now);
                    finished.push(sequence.id());
                }
                StepResult::Fail => finished.push(sequence.id()),
            }
        }
        for id in finished {
            self.registry.evict_finished(set, id);
        }
    }

    /// Starts a sequence for every definition triggered by `event`.
    fn start_triggered(
        &self,
        entry: EntityEntry,
        set: &mut EntitySequences<E>,
        event: &E,
        triggered: &[DefinitionId],
        now: Instant,
    ) {
        for &id in triggered {
            let Some(definition) = self.definitions.get(id.index()) else {
                continue;
            };
            if set.blocks(definition, now) {
                tracing::trace!("`{}` already running for {}", definition.name(), entry);
                continue;
            }

            let mut sequence = Sequence::new(self.next_id(), Arc::clone(definition), entry, now);
            match sequence.advance(event, now) {
                StepResult::Continue => match self.registry.insert(set, sequence, now) {
                    Ok(sequence_id) => {
                        tracing::debug!("Started `{}` as {} for {}", definition.name(), sequence_id, entry);
                    }
                    Err(SecurityError::DuplicateSequence { .. }) => {
                        tracing::trace!("`{}` already running for {}", definition.name(), entry);
                    }
                    Err(err) => {
                        tracing::warn!("Skipped `{}` for {}: {}", definition.name(), entry, err);
                    }
                },
                StepResult::Complete => {
                    self.notify(&sequence, now);
                    self.registry.record_transient(sequence);
                }
                StepResult::Fail => {
                    self.registry.record_transient(sequence);
                }
            }
        }
    }

    fn notify(&self, sequence: &Sequence<E>, now: Instant) {
        let definition = sequence.definition();
        let detection = Detection {
            entry: sequence.entry(),
            definition: definition.id(),
            name: definition.name().to_string(),
            cheat_type: definition.cheat_type(),
            confidence: definition.confidence(),
            sequence: sequence.id(),
            steps: sequence.step(),
            started_at: sequence.created_at(),
            completed_at: now,
        };
        for listener in &self.listeners {
            listener.on_detection(&detection);
        }
    }

    fn next_id(&self) -> SequenceId {
        SequenceId::new(self.next_sequence.fetch_add(1, Ordering::Relaxed))
    }
}
