// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spooler configuration.
//
// The daemon and the producer CLI read the same settings from the
// environment, matching the deployment convention of one enqueuing process
// and one consuming process sharing a database path.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime settings for the queue and the consumer loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Path to the SQLite job database.
    pub db_path: PathBuf,
    /// Consumer idle poll interval, in seconds.
    pub poll_interval_secs: u64,
    /// Default attempt ceiling for jobs that do not specify one.
    pub default_max_attempts: u32,
    /// Maximum number of jobs accepted in one batch admission.
    pub batch_cap: usize,
    /// Route the print capability to the simulator instead of a device.
    pub simulate: bool,
    /// Raw TCP address of the thermal printer (host:port). Required when
    /// simulation is off.
    pub printer_addr: Option<String>,
    /// Base retry delay in seconds. Zero means a failed job is immediately
    /// re-eligible for claiming.
    pub retry_base_secs: u64,
    /// Cap on the computed retry delay, in seconds.
    pub retry_max_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/jobs.db"),
            poll_interval_secs: 5,
            default_max_attempts: 3,
            batch_cap: 10,
            simulate: false,
            printer_addr: None,
            retry_base_secs: 0,
            retry_max_secs: 120,
        }
    }
}

impl QueueConfig {
    /// Load settings from `ZETTELWERK_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env_var("ZETTELWERK_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            poll_interval_secs: env_parse("ZETTELWERK_POLL_INTERVAL_SECS")
                .unwrap_or(defaults.poll_interval_secs),
            default_max_attempts: env_parse("ZETTELWERK_MAX_ATTEMPTS")
                .unwrap_or(defaults.default_max_attempts),
            batch_cap: env_parse("ZETTELWERK_BATCH_CAP").unwrap_or(defaults.batch_cap),
            simulate: env_var("ZETTELWERK_SIMULATION")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.simulate),
            printer_addr: env_var("ZETTELWERK_PRINTER_ADDR"),
            retry_base_secs: env_parse("ZETTELWERK_RETRY_BASE_SECS")
                .unwrap_or(defaults.retry_base_secs),
            retry_max_secs: env_parse("ZETTELWERK_RETRY_MAX_SECS")
                .unwrap_or(defaults.retry_max_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_secs(self.retry_max_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_policy() {
        let config = QueueConfig::default();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.default_max_attempts, 3);
        assert_eq!(config.batch_cap, 10);
        assert_eq!(config.retry_base_secs, 0);
        assert!(!config.simulate);
    }

    #[test]
    fn zero_retry_base_means_immediate_reeligibility() {
        let config = QueueConfig::default();
        assert_eq!(config.retry_base(), Duration::ZERO);
    }
}
