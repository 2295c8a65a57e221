//! # Sequence Definitions
//!
//! A definition is the immutable template of a detection: an ordered list of
//! steps, each accepting one [`EventKind`] and guarded by a predicate. Step 0
//! is the trigger: when an event matches it, a new sequence starts and the
//! trigger is consumed immediately.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use aegis_security::{CheatType, EventKind, SequenceDefinition, SequenceEvent};
//!
//! const LOGIN: EventKind = EventKind::new(1);
//! const JUMP: EventKind = EventKind::new(2);
//!
//! struct Event(EventKind);
//! impl SequenceEvent for Event {
//!     fn kind(&self) -> EventKind { self.0 }
//! }
//!
//! let definition = SequenceDefinition::<Event>::builder("jump_after_login", CheatType::Suspicious)
//!     .trigger_on(LOGIN)
//!     .then_on(JUMP)
//!     .within(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//! assert_eq!(definition.len(), 2);
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aegis_core::{EntityEntry, GameValueMap};

use super::event::EventKind;
use crate::config::SecurityConfig;
use crate::detection::CheatType;
use crate::error::{PredicateError, SecurityError, SecurityResult};

/// Identifier assigned to a definition when it is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u32);

impl DefinitionId {
    /// Creates an id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Index into the manager's definition table.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a step predicate sees besides the event.
pub struct StepContext<'a> {
    entry: EntityEntry,
    step: usize,
    started_at: Instant,
    last_advanced: Instant,
    now: Instant,
    captures: &'a mut GameValueMap,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        entry: EntityEntry,
        step: usize,
        started_at: Instant,
        last_advanced: Instant,
        now: Instant,
        captures: &'a mut GameValueMap,
    ) -> Self {
        Self {
            entry,
            step,
            started_at,
            last_advanced,
            now,
            captures,
        }
    }

    /// The entity the sequence runs for.
    #[must_use]
    pub fn entry(&self) -> EntityEntry {
        self.entry
    }

    /// Index of the step being evaluated (0 = trigger).
    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Evaluation time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Time since the trigger matched.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.now.saturating_duration_since(self.started_at)
    }

    /// Time since the previous step matched.
    #[must_use]
    pub fn since_last_step(&self) -> Duration {
        self.now.saturating_duration_since(self.last_advanced)
    }

    /// Values captured by earlier steps of this sequence.
    #[must_use]
    pub fn captures(&self) -> &GameValueMap {
        self.captures
    }

    /// Values captured by this sequence, for writing.
    pub fn captures_mut(&mut self) -> &mut GameValueMap {
        self.captures
    }
}

/// Step guard. `Ok(true)` advances, `Ok(false)` fails the sequence, `Err`
/// is an internal error and also fails it.
pub type StepPredicate<E> =
    Arc<dyn Fn(&mut StepContext<'_>, &E) -> Result<bool, PredicateError> + Send + Sync>;

/// One step of a definition.
pub struct Step<E> {
    kind: EventKind,
    predicate: StepPredicate<E>,
    timeout: Option<Duration>,
}

impl<E> Step<E> {
    /// Accepted event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Maximum time since the previous step.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs the predicate. A panic is caught and reported as an error.
    pub(crate) fn evaluate(
        &self,
        ctx: &mut StepContext<'_>,
        event: &E,
    ) -> Result<bool, PredicateError> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.predicate)(ctx, event))).unwrap_or_else(
            |payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(PredicateError::new(format!("predicate panicked: {message}")))
            },
        )
    }
}

/// Immutable template of a detection sequence.
pub struct SequenceDefinition<E> {
    id: DefinitionId,
    name: String,
    cheat_type: CheatType,
    confidence: f32,
    steps: Vec<Step<E>>,
    expire_after: Option<Duration>,
    concurrent: bool,
}

impl<E: 'static> SequenceDefinition<E> {
    /// Starts building a definition.
    #[must_use]
    pub fn builder(name: impl Into<String>, cheat_type: CheatType) -> SequenceDefinitionBuilder<E> {
        SequenceDefinitionBuilder {
            name: name.into(),
            cheat_type,
            confidence: 1.0,
            trigger: None,
            steps: Vec::new(),
            expire_after: None,
            concurrent: false,
            problems: Vec::new(),
        }
    }
}

impl<E> SequenceDefinition<E> {
    /// Id assigned at registration.
    #[must_use]
    pub fn id(&self) -> DefinitionId {
        self.id
    }

    /// Name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category reported on detection.
    #[must_use]
    pub fn cheat_type(&self) -> CheatType {
        self.cheat_type
    }

    /// Confidence reported on detection.
    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// All steps, trigger first.
    #[must_use]
    pub fn steps(&self) -> &[Step<E>] {
        &self.steps
    }

    /// Step at `index`.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&Step<E>> {
        self.steps.get(index)
    }

    /// Number of steps, trigger included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false: the builder rejects definitions without a trigger.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Kind of the trigger step.
    #[must_use]
    pub fn trigger_kind(&self) -> EventKind {
        self.steps[0].kind
    }

    /// Whole-sequence timeout.
    #[must_use]
    pub fn expire_after(&self) -> Option<Duration> {
        self.expire_after
    }

    /// Whether several instances may run for one entity at once.
    #[must_use]
    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Assigns the id and fills unset timeouts from the config.
    pub(crate) fn register(&mut self, id: DefinitionId, config: &SecurityConfig) {
        self.id = id;
        if self.expire_after.is_none() {
            self.expire_after = config.default_sequence_timeout();
        }
        let default_step = config.default_step_timeout();
        for step in self.steps.iter_mut().skip(1) {
            if step.timeout.is_none() {
                step.timeout = default_step;
            }
        }
    }
}

impl<E> fmt::Debug for SequenceDefinition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<EventKind> = self.steps.iter().map(|s| s.kind).collect();
        f.debug_struct("SequenceDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cheat_type", &self.cheat_type)
            .field("steps", &kinds)
            .field("expire_after", &self.expire_after)
            .field("concurrent", &self.concurrent)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SequenceDefinition`].
///
/// Mistakes are collected and reported together by [`build`](Self::build).
pub struct SequenceDefinitionBuilder<E> {
    name: String,
    cheat_type: CheatType,
    confidence: f32,
    trigger: Option<Step<E>>,
    steps: Vec<Step<E>>,
    expire_after: Option<Duration>,
    concurrent: bool,
    problems: Vec<String>,
}

impl<E: 'static> SequenceDefinitionBuilder<E> {
    /// Declares the trigger step.
    #[must_use]
    pub fn trigger<F>(mut self, kind: EventKind, predicate: F) -> Self
    where
        F: Fn(&mut StepContext<'_>, &E) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        if self.trigger.is_some() || !self.steps.is_empty() {
            self.problems
                .push("trigger must be declared once, before any step".to_string());
            return self;
        }
        self.trigger = Some(Step {
            kind,
            predicate: Arc::new(predicate),
            timeout: None,
        });
        self
    }

    /// Declares a trigger that matches every event of `kind`.
    #[must_use]
    pub fn trigger_on(self, kind: EventKind) -> Self {
        self.trigger(kind, |_: &mut StepContext<'_>, _: &E| Ok(true))
    }

    /// Appends a step.
    #[must_use]
    pub fn then<F>(mut self, kind: EventKind, predicate: F) -> Self
    where
        F: Fn(&mut StepContext<'_>, &E) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        self.steps.push(Step {
            kind,
            predicate: Arc::new(predicate),
            timeout: None,
        });
        self
    }

    /// Appends a step that matches every event of `kind`.
    #[must_use]
    pub fn then_on(self, kind: EventKind) -> Self {
        self.then(kind, |_: &mut StepContext<'_>, _: &E| Ok(true))
    }

    /// Limits the time between the previous step and the last declared one.
    #[must_use]
    pub fn within(mut self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            self.problems.push("step timeout must be non-zero".to_string());
            return self;
        }
        match self.steps.last_mut() {
            Some(step) => step.timeout = Some(timeout),
            None => self
                .problems
                .push("within() needs a step after the trigger".to_string()),
        }
        self
    }

    /// Limits the lifetime of the whole sequence.
    #[must_use]
    pub fn expire_after(mut self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            self.problems
                .push("sequence timeout must be non-zero".to_string());
            return self;
        }
        self.expire_after = Some(timeout);
        self
    }

    /// Allows several live instances per entity.
    #[must_use]
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Confidence reported on detection (0.0 - 1.0).
    #[must_use]
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Validates and builds the definition.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidDefinition`] listing every problem
    /// found.
    pub fn build(self) -> SecurityResult<SequenceDefinition<E>> {
        let mut problems = self.problems;
        if self.name.trim().is_empty() {
            problems.push("name must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            problems.push(format!("confidence {} outside 0.0..=1.0", self.confidence));
        }
        let Some(trigger) = self.trigger else {
            problems.push("missing trigger".to_string());
            return Err(SecurityError::InvalidDefinition {
                name: self.name,
                reason: problems.join("; "),
            });
        };
        if !problems.is_empty() {
            return Err(SecurityError::InvalidDefinition {
                name: self.name,
                reason: problems.join("; "),
            });
        }

        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.push(trigger);
        steps.extend(self.steps);

        Ok(SequenceDefinition {
            id: DefinitionId::new(0),
            name: self.name,
            cheat_type: self.cheat_type,
            confidence: self.confidence,
            steps,
            expire_after: self.expire_after,
            concurrent: self.concurrent,
        })
    }
}
