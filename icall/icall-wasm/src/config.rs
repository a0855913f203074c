//! Runtime configuration.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("min_stack_size must be at least 1")]
    ZeroStackSize,

    #[error("min_stack_size ({min}) exceeds max_stack_size ({max})")]
    StackBounds { min: u32, max: u32 },

    #[error("default_stack_size ({default}) is outside [{min}, {max}]")]
    DefaultStackSize { default: u32, min: u32, max: u32 },

    #[error("max_call_depth must be at least 1")]
    CallDepth,
}

/// Limits applied by [`crate::Runtime`]. Deserializes from a `[runtime]` TOML
/// table; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Smallest execution context, in bytes, the runtime will create.
    pub min_stack_size: u32,
    /// Largest execution context, in bytes.
    pub max_stack_size: u32,
    /// Context size used by [`crate::Runtime::invoke`] and by front ends that
    /// are not given an explicit size.
    pub default_stack_size: u32,
    /// Maximum number of nested wasm frames.
    pub max_call_depth: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { min_stack_size: 256, max_stack_size: 8 * 1024 * 1024, default_stack_size: 8192, max_call_depth: 1024 }
    }
}

impl RuntimeConfig {
    pub fn with_min_stack_size(mut self, bytes: u32) -> Self {
        self.min_stack_size = bytes;
        self
    }

    pub fn with_max_stack_size(mut self, bytes: u32) -> Self {
        self.max_stack_size = bytes;
        self
    }

    pub fn with_default_stack_size(mut self, bytes: u32) -> Self {
        self.default_stack_size = bytes;
        self
    }

    pub fn with_max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (self.min_stack_size, self.max_stack_size);
        if min == 0 {
            return Err(ConfigError::ZeroStackSize);
        }
        if min > max {
            return Err(ConfigError::StackBounds { min, max });
        }
        if !(min..=max).contains(&self.default_stack_size) {
            return Err(ConfigError::DefaultStackSize { default: self.default_stack_size, min, max });
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::CallDepth);
        }
        Ok(())
    }

    /// Zero is refused whatever the configured bounds.
    pub fn accepts_stack_size(&self, bytes: u32) -> bool {
        bytes > 0 && (self.min_stack_size..=self.max_stack_size).contains(&bytes)
    }
}
