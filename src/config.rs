/*!
 * Configuration
 * JSON-backed kernel configuration with validated defaults
 */

use crate::core::{KernelError, Result};
use crate::sched::Policy;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_max_processes() -> usize {
    64
}

fn default_memory_limit() -> usize {
    16 * 1024 * 1024
}

fn default_mailbox_limit() -> usize {
    0
}

fn default_policy() -> Policy {
    Policy::RoundRobin
}

fn default_time_quantum_ms() -> u64 {
    100
}

fn default_session_timeout_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

/// Kernel-proper limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct KernelSection {
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    /// Total simulated memory in bytes
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
    #[serde(default)]
    pub debug_mode: bool,
    /// Messages per mailbox; 0 means unbounded
    #[serde(default = "default_mailbox_limit")]
    pub mailbox_limit: usize,
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            max_processes: default_max_processes(),
            memory_limit: default_memory_limit(),
            debug_mode: false,
            mailbox_limit: default_mailbox_limit(),
        }
    }
}

/// Scheduling policy and slice length
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct SchedulerSection {
    #[serde(default = "default_policy")]
    pub algorithm: Policy,
    #[serde(default = "default_time_quantum_ms")]
    pub time_quantum_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            algorithm: default_policy(),
            time_quantum_ms: default_time_quantum_ms(),
        }
    }
}

/// Knobs consumed by the security service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct SecuritySection {
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub enable_audit: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            enable_audit: true,
        }
    }
}

/// Complete kernel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct KernelConfig {
    #[serde(default)]
    pub kernel: KernelSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub security: SecuritySection,
}

impl KernelConfig {
    /// Load from a JSON file, falling back to defaults when it is absent
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| KernelError::Configuration(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Reject configurations the kernel cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.kernel.max_processes == 0 {
            return Err(KernelError::Configuration(
                "kernel.max_processes must be at least 1".into(),
            ));
        }
        if self.kernel.memory_limit == 0 {
            return Err(KernelError::Configuration(
                "kernel.memory_limit must be positive".into(),
            ));
        }
        if self.scheduler.time_quantum_ms == 0 {
            return Err(KernelError::Configuration(
                "scheduler.time_quantum_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.algorithm, Policy::RoundRobin);
        assert_eq!(config.kernel.mailbox_limit, 0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = KernelConfig::load("/nonexistent/kernel.json").unwrap();
        assert_eq!(config.kernel.max_processes, 64);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"scheduler": {{"algorithm": "priority"}}, "kernel": {{"memory_limit": 2048}}}}"#
        )
        .unwrap();

        let config = KernelConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduler.algorithm, Policy::Priority);
        assert_eq!(config.scheduler.time_quantum_ms, 100);
        assert_eq!(config.kernel.memory_limit, 2048);
        assert_eq!(config.kernel.max_processes, 64);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"kernel": {{"max_threads": 8}}}}"#).unwrap();

        assert!(matches!(
            KernelConfig::load(file.path()),
            Err(KernelError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"kernel": {{"max_processes": 0}}}}"#).unwrap();

        assert!(matches!(
            KernelConfig::load(file.path()),
            Err(KernelError::Configuration(_))
        ));
    }
}
