//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{LockError, Result};
use crate::node::ServiceName;
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(LockError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `cluster_name` and `service_name` must be non-blank
    /// - `node_name`, when set, must be non-blank
    /// - `method_call_timeout_ms` and `retry_backoff_min_ms` must be positive
    /// - `retry_backoff_max_ms` must not be below `retry_backoff_min_ms`
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.trim().is_empty() {
            return Err(LockError::Config(
                "config validation failed: cluster_name must not be empty".to_string(),
            ));
        }

        if self.service_name.trim().is_empty() {
            return Err(LockError::Config(
                "config validation failed: service_name must not be empty".to_string(),
            ));
        }

        if let Some(name) = &self.node_name
            && name.trim().is_empty()
        {
            return Err(LockError::Config(
                "config validation failed: node_name must not be blank when set".to_string(),
            ));
        }

        if self.method_call_timeout_ms == 0 {
            return Err(LockError::Config(
                "config validation failed: method_call_timeout_ms must be greater than 0"
                    .to_string(),
            ));
        }

        if self.retry_backoff_min_ms == 0 {
            return Err(LockError::Config(
                "config validation failed: retry_backoff_min_ms must be greater than 0".to_string(),
            ));
        }

        if self.retry_backoff_max_ms < self.retry_backoff_min_ms {
            return Err(LockError::Config(format!(
                "config validation failed: retry_backoff_max_ms ({}) must not be below retry_backoff_min_ms ({})",
                self.retry_backoff_max_ms, self.retry_backoff_min_ms
            )));
        }

        Ok(())
    }

    /// The `(cluster_name, service_name)` key the manager registers under.
    pub fn service(&self) -> ServiceName {
        ServiceName::new(self.cluster_name.clone(), self.service_name.clone())
    }

    pub fn method_call_timeout(&self) -> Duration {
        Duration::from_millis(self.method_call_timeout_ms)
    }

    pub fn grant_expiry_slack(&self) -> Duration {
        Duration::from_millis(self.grant_expiry_slack_ms)
    }

    /// Backoff before retry number `attempt` (zero based) for a member at
    /// `position` in the view.
    ///
    /// Doubles per attempt up to `retry_backoff_max_ms`; the position offset
    /// keeps junior members from retrying in lockstep with senior ones.
    pub fn retry_backoff(&self, attempt: u32, position: usize) -> Duration {
        let exponential = self
            .retry_backoff_min_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.retry_backoff_max_ms);
        let offset = (position as u64).saturating_mul(self.retry_backoff_min_ms / 2);
        Duration::from_millis(exponential.saturating_add(offset))
    }
}
