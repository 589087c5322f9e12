//! Adapter configuration
//!
//! Encoder tuning applied at open time and arena sizing for the factory and
//! its instances. Every field has a default, so a partial TOML document is
//! enough to override a single value:
//!
//! ```toml
//! complexity = 5
//! signal = "music"
//!
//! [factory_pool]
//! limit = 65536
//! ```

use crate::engine::Signal;
use crate::error::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest encoder complexity the engine understands
pub const MAX_COMPLEXITY: u8 = 10;

/// Default RTP payload type advertised for Opus
pub const DEFAULT_PAYLOAD_TYPE: u8 = 111;

/// Arena sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Initial capacity in bytes
    pub initial: usize,
    /// Growth step in bytes
    pub increment: usize,
    /// Hard ceiling in bytes, if any
    pub limit: Option<usize>,
}

impl PoolConfig {
    /// Create pool settings
    pub fn new(initial: usize, increment: usize) -> Self {
        Self {
            initial,
            increment,
            limit: None,
        }
    }

    /// Set a hard ceiling
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(4000, 4000)
    }
}

/// Adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Encoder complexity (0-10)
    pub complexity: u8,
    /// Signal type hint given to the encoder
    pub signal: Signal,
    /// Payload type hint used in enumerated descriptors
    pub payload_type: u8,
    /// Shared arena holding instance slots
    pub factory_pool: PoolConfig,
    /// Per-instance arena holding encoder/decoder state
    pub instance_pool: PoolConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            // Low complexity keeps mobile CPUs happy
            complexity: 2,
            signal: Signal::Voice,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            factory_pool: PoolConfig::new(4000, 4000),
            instance_pool: PoolConfig::new(512, 512),
        }
    }
}

impl AdapterConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Set encoder complexity
    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity;
        self
    }

    /// Set signal hint
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    /// Set factory arena sizing
    pub fn with_factory_pool(mut self, pool: PoolConfig) -> Self {
        self.factory_pool = pool;
        self
    }

    /// Set instance arena sizing
    pub fn with_instance_pool(mut self, pool: PoolConfig) -> Self {
        self.instance_pool = pool;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.complexity > MAX_COMPLEXITY {
            return Err(AdapterError::config(format!(
                "complexity {} out of range 0-{}",
                self.complexity, MAX_COMPLEXITY
            )));
        }

        for (name, pool) in [
            ("factory_pool", &self.factory_pool),
            ("instance_pool", &self.instance_pool),
        ] {
            if pool.initial == 0 && pool.increment == 0 {
                return Err(AdapterError::config(format!(
                    "{} can never hold an allocation",
                    name
                )));
            }
            if let Some(limit) = pool.limit {
                if limit == 0 {
                    return Err(AdapterError::config(format!("{} limit must be positive", name)));
                }
            }
        }

        Ok(())
    }
}
