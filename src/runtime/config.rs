//! Process-wide runtime configuration.
//!
//! The configuration is read once, the first time the shared runtime or a
//! fork needs it. Call [`configure`] before any effect runs to override the
//! defaults.

use std::error::Error;
use std::fmt;
use std::sync::OnceLock;

/// Smallest stack accepted for fork threads.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Errors raised when building or installing a [`RuntimeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The worker thread count was zero.
    InvalidWorkerThreads,
    /// The fork stack size was below [`MIN_STACK_SIZE`].
    InvalidStackSize,
    /// The fork thread name prefix was empty.
    EmptyThreadName,
    /// A configuration was already installed or already read.
    AlreadyConfigured,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWorkerThreads => {
                write!(formatter, "worker thread count must be greater than 0")
            }
            Self::InvalidStackSize => {
                write!(
                    formatter,
                    "fork stack size must be at least {MIN_STACK_SIZE} bytes"
                )
            }
            Self::EmptyThreadName => {
                write!(formatter, "fork thread name prefix must not be empty")
            }
            Self::AlreadyConfigured => {
                write!(
                    formatter,
                    "runtime configuration is already in effect and cannot be replaced"
                )
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings for the shared async runtime and for fork threads.
///
/// # Examples
///
/// ```rust
/// use effector::runtime::{ConfigError, RuntimeConfig};
///
/// let config = RuntimeConfig::try_new(2)
///     .and_then(|config| config.with_fork_thread_prefix("worker"))
///     .and_then(|config| config.with_fork_stack_size(1 << 20))
///     .expect("valid config");
/// assert_eq!(config.worker_threads(), 2);
/// assert_eq!(config.fork_thread_prefix(), "worker");
///
/// assert_eq!(RuntimeConfig::try_new(0).unwrap_err(), ConfigError::InvalidWorkerThreads);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    worker_threads: usize,
    fork_thread_prefix: String,
    fork_stack_size: Option<usize>,
}

impl RuntimeConfig {
    /// Creates a configuration with `worker_threads` async workers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWorkerThreads`] if `worker_threads` is 0.
    pub fn try_new(worker_threads: usize) -> Result<Self, ConfigError> {
        if worker_threads == 0 {
            return Err(ConfigError::InvalidWorkerThreads);
        }
        Ok(Self {
            worker_threads,
            ..Self::default()
        })
    }

    /// Sets the name prefix of fork threads.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyThreadName`] if `prefix` is empty.
    pub fn with_fork_thread_prefix(mut self, prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        self.fork_thread_prefix = prefix;
        Ok(self)
    }

    /// Sets the stack size of fork threads.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidStackSize`] if `bytes` is below
    /// [`MIN_STACK_SIZE`].
    pub fn with_fork_stack_size(mut self, bytes: usize) -> Result<Self, ConfigError> {
        if bytes < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidStackSize);
        }
        self.fork_stack_size = Some(bytes);
        Ok(self)
    }

    /// Number of async worker threads.
    pub const fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Name prefix of fork threads.
    pub fn fork_thread_prefix(&self) -> &str {
        &self.fork_thread_prefix
    }

    /// Stack size of fork threads; `None` uses the platform default.
    pub const fn fork_stack_size(&self) -> Option<usize> {
        self.fork_stack_size
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(1),
            fork_thread_prefix: "effector-fork".to_string(),
            fork_stack_size: None,
        }
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Installs `config` for the rest of the process.
///
/// # Errors
///
/// Returns [`ConfigError::AlreadyConfigured`] if a configuration was already
/// installed, or if the defaults were already read by a running effect.
pub fn configure(config: RuntimeConfig) -> Result<(), ConfigError> {
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyConfigured)
}

/// Returns the configuration in effect, latching the defaults on first use.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.worker_threads() > 0);
        assert_eq!(config.fork_thread_prefix(), "effector-fork");
        assert_eq!(config.fork_stack_size(), None);
    }

    #[rstest]
    fn test_try_new_rejects_zero_workers() {
        assert_eq!(
            RuntimeConfig::try_new(0),
            Err(ConfigError::InvalidWorkerThreads)
        );
    }

    #[rstest]
    #[case(0)]
    #[case(MIN_STACK_SIZE - 1)]
    fn test_small_stack_is_rejected(#[case] bytes: usize) {
        let config = RuntimeConfig::default();
        assert_eq!(
            config.with_fork_stack_size(bytes),
            Err(ConfigError::InvalidStackSize)
        );
    }

    #[rstest]
    fn test_empty_prefix_is_rejected() {
        assert_eq!(
            RuntimeConfig::default().with_fork_thread_prefix(""),
            Err(ConfigError::EmptyThreadName)
        );
    }

    #[rstest]
    fn test_configure_after_first_read_fails() {
        let _ = config();
        assert_eq!(
            configure(RuntimeConfig::default()),
            Err(ConfigError::AlreadyConfigured)
        );
    }

    #[rstest]
    fn test_config_error_display() {
        assert_eq!(
            format!("{}", ConfigError::InvalidWorkerThreads),
            "worker thread count must be greater than 0"
        );
        assert_eq!(
            format!("{}", ConfigError::InvalidStackSize),
            format!("fork stack size must be at least {MIN_STACK_SIZE} bytes")
        );
    }
}
