//! # Runtime Configuration Module
//!
//! Environment variable knobs for the engine itself (as opposed to the
//! generated project, which is configured through `tiergen.toml` and flags).
//!
//! ## Environment Variables
//!
//! ### `TIERGEN_WORKERS`
//!
//! Size of the worker pools used to render, write and hash files.
//! Default: available parallelism.
//!
//! ### `TIERGEN_VALIDATE_TIMEOUT_SECS`
//!
//! Per-check timeout for `tiergen validate` and `--validate`. Default: `120`.
//!
//! ### `TIERGEN_GO_BIN`
//!
//! Go toolchain binary used by the build, vet and format checks. Default: `go`.
//! `gofmt` is looked up next to it.
//!
//! ### `TIERGEN_SCHEMA_LINT`
//!
//! Command used to lint `api/openapi.yaml`, split on whitespace; the schema
//! path is appended. Default: `redocly lint`.
//!
//! ### `SOURCE_DATE_EPOCH`
//!
//! Seconds since the Unix epoch. When set, every timestamp the engine writes
//! (manifest, template `timestamp` / `year`) uses it instead of the clock, so
//! two runs produce byte-identical trees including the manifest.
//!
//! ## Example
//!
//! ```bash
//! export TIERGEN_WORKERS=4
//! export SOURCE_DATE_EPOCH=1700000000
//! tiergen generate --name svc --module example.com/svc --tier basic
//! ```

use chrono::{DateTime, Utc};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_VALIDATE_TIMEOUT_SECS: u64 = 120;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Worker pool size for render / write / hash fan-out
    pub workers: usize,
    /// Timeout applied to each validation check
    pub validate_timeout: Duration,
    /// Go toolchain binary
    pub go_bin: PathBuf,
    /// Schema lint command and leading arguments
    pub schema_lint: Vec<String>,
    /// Pinned timestamp, from `SOURCE_DATE_EPOCH`
    pub source_date_epoch: Option<i64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            validate_timeout: Duration::from_secs(DEFAULT_VALIDATE_TIMEOUT_SECS),
            go_bin: PathBuf::from("go"),
            schema_lint: vec!["redocly".to_string(), "lint".to_string()],
            source_date_epoch: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`; unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let workers = lookup("TIERGEN_WORKERS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.workers);

        let validate_timeout = lookup("TIERGEN_VALIDATE_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.validate_timeout);

        let go_bin = lookup("TIERGEN_GO_BIN")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.go_bin);

        let schema_lint = lookup("TIERGEN_SCHEMA_LINT")
            .map(|v| v.split_whitespace().map(String::from).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty())
            .unwrap_or(defaults.schema_lint);

        let source_date_epoch =
            lookup("SOURCE_DATE_EPOCH").and_then(|v| v.trim().parse::<i64>().ok());

        RuntimeConfig {
            workers,
            validate_timeout,
            go_bin,
            schema_lint,
            source_date_epoch,
        }
    }

    /// The timestamp to record for this run.
    pub fn now(&self) -> DateTime<Utc> {
        self.source_date_epoch
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    }

    /// `gofmt`, resolved next to the configured go binary.
    pub fn gofmt_bin(&self) -> PathBuf {
        match self.go_bin.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join("gofmt"),
            _ => PathBuf::from("gofmt"),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = RuntimeConfig::from_lookup(lookup(&[]));
        assert_eq!(config.validate_timeout, Duration::from_secs(120));
        assert_eq!(config.go_bin, PathBuf::from("go"));
        assert_eq!(config.schema_lint, vec!["redocly", "lint"]);
        assert!(config.workers >= 1);
        assert!(config.source_date_epoch.is_none());
    }

    #[test]
    fn test_values_from_environment() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("TIERGEN_WORKERS", "3"),
            ("TIERGEN_VALIDATE_TIMEOUT_SECS", "7"),
            ("TIERGEN_GO_BIN", "/opt/go/bin/go"),
            ("TIERGEN_SCHEMA_LINT", "spectral lint --quiet"),
            ("SOURCE_DATE_EPOCH", "1700000000"),
        ]));
        assert_eq!(config.workers, 3);
        assert_eq!(config.validate_timeout, Duration::from_secs(7));
        assert_eq!(config.gofmt_bin(), PathBuf::from("/opt/go/bin/gofmt"));
        assert_eq!(config.schema_lint, vec!["spectral", "lint", "--quiet"]);
        assert_eq!(config.now().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("TIERGEN_WORKERS", "0"),
            ("TIERGEN_VALIDATE_TIMEOUT_SECS", "soon"),
            ("TIERGEN_SCHEMA_LINT", "   "),
            ("SOURCE_DATE_EPOCH", "yesterday"),
        ]));
        assert!(config.workers >= 1);
        assert_eq!(config.validate_timeout, Duration::from_secs(120));
        assert_eq!(config.schema_lint, vec!["redocly", "lint"]);
        assert!(config.source_date_epoch.is_none());
        assert_eq!(config.gofmt_bin(), PathBuf::from("gofmt"));
    }
}
