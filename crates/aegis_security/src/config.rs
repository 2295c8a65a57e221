//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! sweep_interval_ms = 1000
//! default_step_timeout_ms = 2000
//! default_sequence_timeout_ms = 30000
//! max_sequences_per_entity = 64
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SecurityError, SecurityResult};

/// Configuration for the sequence engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Period of the background sweep (ms).
    pub sweep_interval_ms: u64,
    /// Step timeout for steps declared without one (ms). `None` = no limit.
    pub default_step_timeout_ms: Option<u64>,
    /// Whole-sequence timeout for definitions declared without one (ms).
    pub default_sequence_timeout_ms: Option<u64>,
    /// Maximum live sequences per entity.
    pub max_sequences_per_entity: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            default_step_timeout_ms: None,
            // Stalled sequences never outlive half a minute
            default_sequence_timeout_ms: Some(30_000),
            max_sequences_per_entity: 64,
        }
    }
}

impl SecurityConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns error if the document does not parse or fails validation.
    pub fn from_toml_str(source: &str) -> SecurityResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, does not parse, or fails
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> SecurityResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SecurityError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!("Loaded security config from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns error if any interval or limit is zero.
    pub fn validate(&self) -> SecurityResult<()> {
        if self.sweep_interval_ms == 0 {
            return Err(SecurityError::InvalidConfig(
                "sweep_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_sequences_per_entity == 0 {
            return Err(SecurityError::InvalidConfig(
                "max_sequences_per_entity must be greater than zero".to_string(),
            ));
        }
        if self.default_step_timeout_ms == Some(0) {
            return Err(SecurityError::InvalidConfig(
                "default_step_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.default_sequence_timeout_ms == Some(0) {
            return Err(SecurityError::InvalidConfig(
                "default_sequence_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sweep period.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Default step timeout.
    #[must_use]
    pub fn default_step_timeout(&self) -> Option<Duration> {
        self.default_step_timeout_ms.map(Duration::from_millis)
    }

    /// Default whole-sequence timeout.
    #[must_use]
    pub fn default_sequence_timeout(&self) -> Option<Duration> {
        self.default_sequence_timeout_ms.map(Duration::from_millis)
    }
}
