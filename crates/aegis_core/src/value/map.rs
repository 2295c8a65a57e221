//! Heterogeneous storage of [`GameValue`]s.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use super::{GameKey, GameValue};
use crate::error::{CoreError, CoreResult};

/// Map from key name to a typed [`GameValue`].
///
/// Each key name holds at most one value. Lookups with a key whose element
/// type differs from the stored one fail with [`CoreError::TypeMismatch`].
#[derive(Default)]
pub struct GameValueMap {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl GameValueMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns true if a value is stored under the key name.
    #[must_use]
    pub fn contains<T>(&self, key: &GameKey<T>) -> bool {
        self.values.contains_key(key.name())
    }

    /// Stores a value, replacing whatever was under the same key name.
    pub fn insert<T>(&mut self, value: GameValue<T>)
    where
        T: Send + Sync + 'static,
    {
        self.values.insert(value.key().name(), Box::new(value));
    }

    /// Returns the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns error if nothing is stored under the key or the stored
    /// element type differs.
    pub fn value<T>(&self, key: &GameKey<T>) -> CoreResult<&GameValue<T>>
    where
        T: Send + Sync + 'static,
    {
        let name = key.name();
        self.values
            .get(name)
            .ok_or(CoreError::MissingValue { key: name })?
            .downcast_ref::<GameValue<T>>()
            .ok_or(CoreError::TypeMismatch { key: name })
    }

    /// Returns the value for `key` mutably.
    ///
    /// # Errors
    ///
    /// Same as [`GameValueMap::value`].
    pub fn value_mut<T>(&mut self, key: &GameKey<T>) -> CoreResult<&mut GameValue<T>>
    where
        T: Send + Sync + 'static,
    {
        let name = key.name();
        self.values
            .get_mut(name)
            .ok_or(CoreError::MissingValue { key: name })?
            .downcast_mut::<GameValue<T>>()
            .ok_or(CoreError::TypeMismatch { key: name })
    }

    /// Returns the value for `key`, creating an empty one reading as
    /// `default` if none exists.
    ///
    /// # Errors
    ///
    /// Returns error if the key name holds a different element type.
    pub fn value_or_insert<T>(
        &mut self,
        key: &GameKey<T>,
        default: T,
    ) -> CoreResult<&mut GameValue<T>>
    where
        T: Send + Sync + 'static,
    {
        let name = key.name();
        self.values
            .entry(name)
            .or_insert_with(|| -> Box<dyn Any + Send + Sync> {
                Box::new(GameValue::new(*key, default))
            })
            .downcast_mut::<GameValue<T>>()
            .ok_or(CoreError::TypeMismatch { key: name })
    }

    /// Returns the contained value or its default.
    ///
    /// # Errors
    ///
    /// Same as [`GameValueMap::value`].
    pub fn get<T>(&self, key: &GameKey<T>) -> CoreResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Ok(self.value(key)?.get().clone())
    }

    /// Returns the contained value, `None` if the value is empty.
    ///
    /// # Errors
    ///
    /// Same as [`GameValueMap::value`].
    pub fn get_direct<T>(&self, key: &GameKey<T>) -> CoreResult<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        Ok(self.value(key)?.get_direct().cloned())
    }

    /// Sets the contained value of an existing entry.
    ///
    /// # Errors
    ///
    /// Same as [`GameValueMap::value`].
    pub fn set<T>(&mut self, key: &GameKey<T>, value: T) -> CoreResult<()>
    where
        T: Send + Sync + 'static,
    {
        self.value_mut(key)?.set(value);
        Ok(())
    }

    /// Transforms the contained value of an existing entry.
    ///
    /// # Errors
    ///
    /// Same as [`GameValueMap::value`].
    pub fn transform<T, F>(&mut self, key: &GameKey<T>, f: F) -> CoreResult<()>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        self.value_mut(key)?.transform(f);
        Ok(())
    }

    /// Removes the entry under the key name. Absent keys are a no-op.
    pub fn remove<T>(&mut self, key: &GameKey<T>) -> bool {
        self.values.remove(key.name()).is_some()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl fmt::Debug for GameValueMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
