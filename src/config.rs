//! Engine configuration loaded from YAML
//!
//! ```yaml
//! limits:
//!   default_max_depth: 10
//!   max_depth_ceiling: 50
//! categories:
//!   - name: portfolio
//!     scope: [portfolio]
//!     fields:
//!       - { name: strategy, policy: inheritable }
//!   - name: pricing
//!     fields:
//!       - { name: price, policy: leaf_only }
//! ```

use crate::model::{CategoryDescriptor, CategoryRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Traversal depth limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Applied when a query does not set `max_depth`
    pub default_max_depth: usize,
    /// Queries asking for more than this are rejected
    pub max_depth_ceiling: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_max_depth: 10,
            max_depth_ceiling: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    limits: Limits,
    #[serde(default)]
    categories: Vec<CategoryDescriptor>,
}

/// Validated engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub limits: Limits,
    pub categories: CategoryRegistry,
}

impl EngineConfig {
    pub fn new(limits: Limits, categories: Vec<CategoryDescriptor>) -> Result<Self, ConfigError> {
        if limits.max_depth_ceiling == 0 {
            return Err(ConfigError::Invalid("max_depth_ceiling must be positive".into()));
        }
        if limits.default_max_depth == 0 || limits.default_max_depth > limits.max_depth_ceiling {
            return Err(ConfigError::Invalid(format!(
                "default_max_depth {} must be within 1..={}",
                limits.default_max_depth, limits.max_depth_ceiling
            )));
        }
        Ok(Self {
            limits,
            categories: CategoryRegistry::new(categories)?,
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        Self::new(raw.limits, raw.categories)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }
}
