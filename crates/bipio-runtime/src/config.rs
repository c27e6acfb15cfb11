//! Engine configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use bipio_runtime::EngineConfig;
//!
//! // Defaults with env overrides
//! let config = EngineConfig::from_env();
//!
//! // Or customize programmatically
//! let config = EngineConfig::new()
//!     .default_buffer_size(16 * 1024)
//!     .thread_name("io");
//! ```

use bipio_core::constants;
use bipio_core::env::{env_get, env_get_opt, env_get_str};
use bipio_core::ConfigError;

/// Library defaults
pub mod defaults {
    pub const BUFFER_SIZE: usize = bipio_core::constants::DEFAULT_BUF_SIZE;
    pub const LISTEN_BACKLOG: i32 = bipio_core::constants::DEFAULT_BACKLOG;
    /// Initial watch-set slots (grown on demand)
    pub const WATCH_CAPACITY: usize = 16;
    pub const THREAD_NAME: &str = "bipio-reactor";
}

/// Engine configuration with builder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Buffer size for streams created with size 0
    pub default_buffer_size: usize,
    /// Backlog for `listen()` when none is given
    pub listen_backlog: i32,
    /// Initial reactor watch-set capacity
    pub watch_capacity: usize,
    /// Reactor thread name
    pub thread_name: String,
    /// Reactor thread stack size (`None` = platform default)
    pub thread_stack_size: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EngineConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `BIPIO_BUFFER_SIZE` - Default stream buffer size in bytes
    /// - `BIPIO_LISTEN_BACKLOG` - Default listen backlog
    /// - `BIPIO_WATCH_CAPACITY` - Initial watch-set capacity
    /// - `BIPIO_THREAD_NAME` - Reactor thread name
    /// - `BIPIO_THREAD_STACK` - Reactor thread stack size in bytes
    pub fn from_env() -> Self {
        Self {
            default_buffer_size: env_get("BIPIO_BUFFER_SIZE", defaults::BUFFER_SIZE),
            listen_backlog: env_get("BIPIO_LISTEN_BACKLOG", defaults::LISTEN_BACKLOG),
            watch_capacity: env_get("BIPIO_WATCH_CAPACITY", defaults::WATCH_CAPACITY),
            thread_name: env_get_str("BIPIO_THREAD_NAME", defaults::THREAD_NAME),
            thread_stack_size: env_get_opt("BIPIO_THREAD_STACK"),
        }
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            default_buffer_size: defaults::BUFFER_SIZE,
            listen_backlog: defaults::LISTEN_BACKLOG,
            watch_capacity: defaults::WATCH_CAPACITY,
            thread_name: defaults::THREAD_NAME.to_string(),
            thread_stack_size: None,
        }
    }

    // Builder methods

    pub fn default_buffer_size(mut self, size: usize) -> Self {
        self.default_buffer_size = size;
        self
    }

    pub fn listen_backlog(mut self, backlog: i32) -> Self {
        self.listen_backlog = backlog;
        self
    }

    pub fn watch_capacity(mut self, cap: usize) -> Self {
        self.watch_capacity = cap;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn thread_stack_size(mut self, size: Option<usize>) -> Self {
        self.thread_stack_size = size;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_buffer_size < constants::MIN_BUF_SIZE {
            return Err(ConfigError::InvalidValue("default_buffer_size must be >= 2"));
        }
        if self.default_buffer_size > constants::MAX_BUF_SIZE {
            return Err(ConfigError::InvalidValue(
                "default_buffer_size must fit in 32 bits",
            ));
        }
        if self.listen_backlog <= 0 {
            return Err(ConfigError::InvalidValue("listen_backlog must be > 0"));
        }
        if self.watch_capacity == 0 {
            return Err(ConfigError::InvalidValue("watch_capacity must be > 0"));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::InvalidValue("thread_name must not be empty"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("bipio Engine Configuration:");
        eprintln!("  default_buffer_size:  {}", self.default_buffer_size);
        eprintln!("  listen_backlog:       {}", self.listen_backlog);
        eprintln!("  watch_capacity:       {}", self.watch_capacity);
        eprintln!("  thread_name:          {}", self.thread_name);
        match self.thread_stack_size {
            Some(size) => eprintln!("  thread_stack_size:    {}", size),
            None => eprintln!("  thread_stack_size:    (system default)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.default_buffer_size, 4096);
        assert_eq!(config.listen_backlog, 50);
        assert_eq!(config.watch_capacity, 16);
        assert_eq!(config.thread_name, "bipio-reactor");
        assert_eq!(config.thread_stack_size, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .default_buffer_size(64)
            .listen_backlog(8)
            .watch_capacity(2)
            .thread_name("io")
            .thread_stack_size(Some(256 * 1024));

        assert_eq!(config.default_buffer_size, 64);
        assert_eq!(config.listen_backlog, 8);
        assert_eq!(config.watch_capacity, 2);
        assert_eq!(config.thread_name, "io");
        assert_eq!(config.thread_stack_size, Some(256 * 1024));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(EngineConfig::new().default_buffer_size(1).validate().is_err());
        assert!(EngineConfig::new().default_buffer_size(2).validate().is_ok());
        assert!(EngineConfig::new().listen_backlog(0).validate().is_err());
        assert!(EngineConfig::new().watch_capacity(0).validate().is_err());
        assert!(EngineConfig::new().thread_name("").validate().is_err());
    }
}
