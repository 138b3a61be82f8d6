//! # Controller Configuration
//!
//! Operational knobs for the reconcile loop, dispatch queue, and remote
//! clients.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CONFSYNC_WORKERS=4                                                 │
//! │     CONFSYNC_REQUEST_TIMEOUT_SECS=10                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/confsync/controller.toml (Linux)                         │
//! │     ~/Library/Application Support/io.confsync.confsync/… (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # controller.toml
//! workers = 2
//! queue_capacity = 1024
//! attempt_timeout_secs = 60
//! conflict_retry_limit = 5
//!
//! requeue_initial_backoff_ms = 500
//! requeue_max_backoff_secs = 60
//! invalid_spec_backoff_secs = 300
//!
//! request_timeout_secs = 5
//! connect_timeout_secs = 5
//! listen_poll_interval_secs = 2
//! ```

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Defaults
// =============================================================================

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_attempt_timeout_secs() -> u64 {
    60
}

fn default_conflict_retry_limit() -> u32 {
    5
}

fn default_requeue_initial_backoff_ms() -> u64 {
    500
}

fn default_requeue_max_backoff_secs() -> u64 {
    60
}

fn default_invalid_spec_backoff_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_listen_poll_interval_secs() -> u64 {
    2
}

// =============================================================================
// Controller Configuration
// =============================================================================

/// Operational configuration for the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the reconcile request queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Deadline for one reconcile attempt; the dispatch layer aborts the
    /// attempt (and its outstanding remote calls) past this.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Bound on optimistic-concurrency retries for local writes.
    #[serde(default = "default_conflict_retry_limit")]
    pub conflict_retry_limit: u32,

    /// Initial requeue delay after a transient failure.
    #[serde(default = "default_requeue_initial_backoff_ms")]
    pub requeue_initial_backoff_ms: u64,

    /// Ceiling for the exponential requeue backoff.
    #[serde(default = "default_requeue_max_backoff_secs")]
    pub requeue_max_backoff_secs: u64,

    /// Fixed requeue delay for invalid specs, which cannot self-heal and
    /// would otherwise retry in a tight loop.
    #[serde(default = "default_invalid_spec_backoff_secs")]
    pub invalid_spec_backoff_secs: u64,

    /// Per-request deadline for remote-service calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connection deadline for remote-service clients.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Poll interval for the HTTP listener variant. Kept well below any
    /// periodic-resync interval so push propagation beats baseline polling.
    #[serde(default = "default_listen_poll_interval_secs")]
    pub listen_poll_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            conflict_retry_limit: default_conflict_retry_limit(),
            requeue_initial_backoff_ms: default_requeue_initial_backoff_ms(),
            requeue_max_backoff_secs: default_requeue_max_backoff_secs(),
            invalid_spec_backoff_secs: default_invalid_spec_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            listen_poll_interval_secs: default_listen_poll_interval_secs(),
        }
    }
}

impl ControllerConfig {
    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads configuration from the given path, falling back to the
    /// platform config directory and then to defaults when no file exists.
    /// Environment overrides are applied last.
    pub fn load_or_default(path: Option<PathBuf>) -> Self {
        let path = path.or_else(Self::default_path);

        let mut config = match path {
            Some(ref p) if p.exists() => match Self::load(p) {
                Ok(config) => {
                    info!(path = %p.display(), "Loaded controller config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "Failed to load config, using defaults");
                    ControllerConfig::default()
                }
            },
            _ => {
                debug!("No config file, using defaults");
                ControllerConfig::default()
            }
        };

        config.apply_env_overrides();
        config
    }

    /// Loads and parses one config file.
    pub fn load(path: &PathBuf) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::InvalidConfig(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| SyncError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Platform default config path.
    fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "confsync", "confsync")
            .map(|dirs| dirs.config_dir().join("controller.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CONFSYNC_WORKERS") {
            if let Ok(workers) = v.parse() {
                self.workers = workers;
            }
        }
        if let Ok(v) = std::env::var("CONFSYNC_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.request_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("CONFSYNC_LISTEN_POLL_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.listen_poll_interval_secs = secs;
            }
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checks the configuration for values the controller cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.workers == 0 {
            return Err(SyncError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.conflict_retry_limit == 0 {
            return Err(SyncError::InvalidConfig(
                "conflict_retry_limit must be at least 1".into(),
            ));
        }
        if self.attempt_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    // =========================================================================
    // Derived Durations
    // =========================================================================

    /// Deadline for one reconcile attempt.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Per-request deadline for remote calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connection deadline for remote clients.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Poll interval for the HTTP listener variant.
    pub fn listen_poll_interval(&self) -> Duration {
        Duration::from_secs(self.listen_poll_interval_secs)
    }

    /// Ceiling of the transient-failure requeue backoff.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.requeue_max_backoff_secs)
    }

    /// Requeue delay for invalid specs.
    pub fn invalid_spec_backoff(&self) -> Duration {
        Duration::from_secs(self.invalid_spec_backoff_secs)
    }

    /// Fresh exponential backoff for transient-failure requeues.
    ///
    /// `max_elapsed_time` is None: a failing resource keeps retrying at the
    /// ceiling interval forever rather than giving up.
    pub fn requeue_backoff(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.requeue_initial_backoff_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: self.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 2);
        assert_eq!(config.attempt_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = ControllerConfig::default();
        config.workers = 0;
        assert!(matches!(
            config.validate(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ControllerConfig = toml::from_str(
            r#"
            workers = 8
            request_timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.request_timeout_secs, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.conflict_retry_limit, 5);
    }

    #[test]
    fn test_backoff_shape() {
        let config = ControllerConfig::default();
        let backoff = config.requeue_backoff();
        assert_eq!(backoff.initial_interval, Duration::from_millis(500));
        assert_eq!(backoff.max_interval, Duration::from_secs(60));
        assert!(backoff.max_elapsed_time.is_none());
    }
}
