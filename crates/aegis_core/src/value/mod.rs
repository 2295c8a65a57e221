//! # Game Values
//!
//! A [`GameValue`] holds an optional element of type `T` plus the default
//! returned while the element is absent. Values are addressed by a typed
//! [`GameKey`], so detection rules read `f64` speeds and `u32` counters
//! without casting.

mod map;

pub use map::GameValueMap;

use std::fmt;
use std::marker::PhantomData;

/// Typed name of a game value.
///
/// Keys are usually declared as constants next to the rule that uses them:
///
/// ```rust
/// use aegis_core::GameKey;
///
/// const HORIZONTAL_SPEED: GameKey<f64> = GameKey::new("horizontal_speed");
/// assert_eq!(HORIZONTAL_SPEED.name(), "horizontal_speed");
/// ```
pub struct GameKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> GameKey<T> {
    /// Creates a key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the key name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

// Manual impls: deriving would put bounds on `T`.
impl<T> Clone for GameKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GameKey<T> {}

impl<T> PartialEq for GameKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for GameKey<T> {}

impl<T> fmt::Debug for GameKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GameKey").field(&self.name).finish()
    }
}

/// A containable value with an explicit default.
#[derive(Clone, Debug, PartialEq)]
pub struct GameValue<T> {
    key: GameKey<T>,
    default: T,
    value: Option<T>,
}

impl<T> GameValue<T> {
    /// Creates an empty value that reads as `default`.
    #[must_use]
    pub fn new(key: GameKey<T>, default: T) -> Self {
        Self {
            key,
            default,
            value: None,
        }
    }

    /// Creates a value that already holds `value`.
    #[must_use]
    pub fn with_value(key: GameKey<T>, default: T, value: T) -> Self {
        Self {
            key,
            default,
            value: Some(value),
        }
    }

    /// Returns the key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> GameKey<T> {
        self.key
    }

    /// Returns the contained value, or the default when absent.
    #[inline]
    #[must_use]
    pub fn get(&self) -> &T {
        self.value.as_ref().unwrap_or(&self.default)
    }

    /// Returns the default value.
    #[inline]
    #[must_use]
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Returns the contained value without falling back to the default.
    #[inline]
    #[must_use]
    pub fn get_direct(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Replaces the contained value.
    pub fn set(&mut self, value: T) -> &mut Self {
        self.value = Some(value);
        self
    }

    /// Replaces the contained value with `f` applied to the current one.
    ///
    /// An empty value transforms its default.
    pub fn transform<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(self.get());
        self.value = Some(next);
        self
    }

    /// Returns true if no value is contained.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Removes the contained value, returning it.
    pub fn clear(&mut self) -> Option<T> {
        self.value.take()
    }
}
