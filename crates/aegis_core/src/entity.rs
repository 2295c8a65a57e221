//! # Entity Entries
//!
//! An entry is the engine's handle for a tracked player. It consists of:
//! - A slot index assigned by the host (connection slot, player table row)
//! - A generation counter bumped every time the slot is reused
//!
//! Two entries are equal only when both parts match, so a handle kept past a
//! disconnect never aliases the player that reuses the slot.

use std::fmt;

/// Identity of a tracked entity.
///
/// The handle is split into two parts:
/// - Lower 32 bits: Slot index
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityEntry(u64);

impl EntityEntry {
    /// Creates an entry from slot index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The host's slot index (0 to 2^32-1)
    /// * `generation` - The reuse counter of that slot (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Rebuilds an entry from its packed representation.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the packed representation.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the entry for the next occupant of the same slot.
    #[inline]
    #[must_use]
    pub const fn next_generation(self) -> Self {
        Self::new(self.index(), self.generation().wrapping_add(1))
    }
}

impl fmt::Debug for EntityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityEntry({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}
