//! Process configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://mekgoro.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_COMMIT_RETRIES: u32 = 3;
pub const DEFAULT_HISTORY_LIMIT: u32 = 200;
pub const DEFAULT_BACKUP_TIMEOUT_SECS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    pub dir: Option<PathBuf>,
    pub url: Option<String>,
    pub token: Option<String>,
    /// Upper bound on one upload to `url`.
    pub timeout: Duration,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            url: None,
            token: None,
            timeout: Duration::from_secs(u64::from(DEFAULT_BACKUP_TIMEOUT_SECS)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// SQLite URL, or `memory` for the in-memory store.
    pub database_url: String,
    pub bind_addr: String,
    pub commit_retries: u32,
    /// Default page size for movement history when the caller gives none.
    pub history_limit: u32,
    pub backup: BackupConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            commit_retries: DEFAULT_COMMIT_RETRIES,
            history_limit: DEFAULT_HISTORY_LIMIT,
            backup: BackupConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").unwrap_or_else(|| {
            tracing::warn!(default = DEFAULT_DATABASE_URL, "DATABASE_URL not set, using default");
            DEFAULT_DATABASE_URL.to_string()
        });
        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Self {
            database_url,
            bind_addr,
            commit_retries: parse_or("COMMIT_RETRIES", get("COMMIT_RETRIES"), DEFAULT_COMMIT_RETRIES),
            history_limit: parse_or("HISTORY_LIMIT", get("HISTORY_LIMIT"), DEFAULT_HISTORY_LIMIT),
            backup: BackupConfig {
                dir: get("BACKUP_DIR").map(PathBuf::from),
                url: get("BACKUP_URL"),
                token: get("BACKUP_TOKEN"),
                timeout: Duration::from_secs(u64::from(parse_or(
                    "BACKUP_TIMEOUT_SECS",
                    get("BACKUP_TIMEOUT_SECS"),
                    DEFAULT_BACKUP_TIMEOUT_SECS,
                ))),
            },
        }
    }
}

fn parse_or(key: &str, raw: Option<String>, default: u32) -> u32 {
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default, "invalid number, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), AppConfig::default());
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let cfg = config(&[
            ("DATABASE_URL", " memory "),
            ("COMMIT_RETRIES", "5"),
            ("BACKUP_DIR", "/var/backups/mekgoro"),
            ("BACKUP_TOKEN", ""),
            ("BACKUP_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(cfg.database_url, "memory");
        assert_eq!(cfg.commit_retries, 5);
        assert_eq!(cfg.backup.dir, Some(PathBuf::from("/var/backups/mekgoro")));
        assert_eq!(cfg.backup.token, None);
        assert_eq!(cfg.backup.timeout, Duration::from_secs(5));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let cfg = config(&[
            ("COMMIT_RETRIES", "many"),
            ("HISTORY_LIMIT", "-1"),
            ("BACKUP_TIMEOUT_SECS", "soon"),
        ]);
        assert_eq!(cfg.commit_retries, DEFAULT_COMMIT_RETRIES);
        assert_eq!(cfg.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(cfg.backup.timeout, BackupConfig::default().timeout);
    }
}
