//! Database configuration
//!
//! Everything an instance needs is passed in here; there are no
//! process-global singletons. `from_env()` folds the `MONARCH_*`
//! variables in on top of the defaults.

use monarch_core::{EnvConfig, Limits};
use monarch_durability::DurabilityLevel;
use monarch_storage::DEFAULT_QUEUE_CAPACITY;
use std::path::PathBuf;

/// Configuration for one database instance
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Data directory; `None` runs fully in memory with no durability
    pub data_dir: Option<PathBuf>,
    /// WAL flush policy
    pub durability: DurabilityLevel,
    /// Checkpoints retained before the oldest is dropped
    pub max_checkpoints: usize,
    /// Resource limits
    pub limits: Limits,
    /// Per-subscriber change-queue capacity
    pub queue_capacity: usize,
    /// Environment-derived settings
    pub env: EnvConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            durability: DurabilityLevel::default(),
            max_checkpoints: monarch_durability::DEFAULT_MAX_CHECKPOINTS,
            limits: Limits::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            env: EnvConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Defaults plus whatever the `MONARCH_*` environment supplies
    pub fn from_env() -> Self {
        let env = EnvConfig::from_env();
        Self {
            data_dir: env.data_dir.clone(),
            env,
            ..Self::default()
        }
    }

    /// Builder: set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Builder: set the durability level
    pub fn with_durability(mut self, level: DurabilityLevel) -> Self {
        self.durability = level;
        self
    }

    /// Builder: set checkpoint retention
    pub fn with_max_checkpoints(mut self, n: usize) -> Self {
        self.max_checkpoints = n.max(1);
        self
    }

    /// Builder: set limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}
