//! # AEGIS Core
//!
//! Shared building blocks for the anti-cheat engine:
//! - [`EntityEntry`]: opaque, comparable handle for a tracked player
//! - [`GameKey`] / [`GameValue`] / [`GameValueMap`]: typed attribute storage
//!   with explicit defaults, used by detection rules
//! - [`MonotonicClock`]: time source so timeouts can be driven by tests
//!
//! ## Example
//!
//! ```rust
//! use aegis_core::{EntityEntry, GameKey, GameValue, GameValueMap};
//!
//! const JUMPS: GameKey<u32> = GameKey::new("jumps");
//!
//! let entry = EntityEntry::new(7, 0);
//! let mut values = GameValueMap::new();
//! values.insert(GameValue::new(JUMPS, 0));
//! values.transform(&JUMPS, |n| n + 1).unwrap();
//! assert_eq!(values.get(&JUMPS).unwrap(), 1);
//! assert_eq!(entry.index(), 7);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod entity;
pub mod error;
pub mod value;

pub use clock::{ManualClock, MonotonicClock, SystemClock};
pub use entity::EntityEntry;
pub use error::{CoreError, CoreResult};
pub use value::{GameKey, GameValue, GameValueMap};
