//! # Event Kinds
//!
//! The engine does not know the game's event taxonomy. Hosts tag each event
//! with an [`EventKind`] and the engine dispatches on that tag alone.

use std::fmt;

/// Tag identifying the type of a game event.
///
/// ```rust
/// use aegis_security::EventKind;
///
/// const LOGIN: EventKind = EventKind::new(1);
/// const JUMP: EventKind = EventKind::new(2);
/// assert_ne!(LOGIN, JUMP);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(u16);

impl EventKind {
    /// Creates a kind from its numeric tag.
    #[inline]
    #[must_use]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Returns the numeric tag.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKind({})", self.0)
    }
}

/// A game event the engine can dispatch.
pub trait SequenceEvent {
    /// Returns the event's kind.
    fn kind(&self) -> EventKind;
}
