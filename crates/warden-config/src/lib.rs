//! Configuration file handling for warden.
//!
//! Loads the process-wide config from a YAML file at boot, covering the
//! `global`, `http`, `db`, and `notifications` sections. This is a
//! read-mostly store: nothing in the process mutates it after load.
//!
//! # Example
//!
//! ```
//! use warden_config::{Config, load_config};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("nonexistent.yml"));
//! assert!(config.is_err());
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use warden_webhook::WebhookSpec;

/// Default config file name, looked up relative to the working directory.
pub const CONFIG_FILE: &str = "config.yml";

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_cmd_prefix() -> String {
    "/bin/sh -c".to_string()
}

fn default_store_max() -> u64 {
    100
}

/// `global.*` keys: timezone, command prefix, container engine, working dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub timezone: String,
    pub cmd_prefix: String,
    /// Auto-detected (`podman`/`docker`) when unset.
    pub container_cmd: Option<String>,
    pub working_dir: PathBuf,
    pub debug: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            cmd_prefix: default_cmd_prefix(),
            container_cmd: None,
            working_dir: PathBuf::from("."),
            debug: false,
        }
    }
}

/// An HTTP response header applied globally to every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub header: String,
    pub value: String,
}

/// `http.*` keys: the external HTTP collaborator's listen/TLS/CORS config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: String,
    pub timeout_min: u64,
    pub body_limit: String,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub session_secret: Option<String>,
    pub max_age: u64,
    pub ipv6: bool,
    pub prometheus: bool,
    pub cors_allow_origins: Vec<String>,
    pub ui: bool,
    pub upload_dir: Option<String>,
    pub headers: Vec<ResponseHeader>,
}

/// `db.*` keys: store location and at-rest encryption key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub path: PathBuf,
    pub encrypt_key: String,
}

/// `notifications.*` keys: ring bound and named outbound webhook specs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub store_max: u64,
    pub webhooks: BTreeMap<String, WebhookSpec>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            store_max: default_store_max(),
            webhooks: BTreeMap::new(),
        }
    }
}

/// Complete process-wide configuration, loaded once at boot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub global: GlobalConfig,
    pub http: HttpConfig,
    pub db: DbConfig,
    pub notifications: NotificationsConfig,
}

/// Load and validate the config at `path`.
///
/// Validates `db.encrypt_key` is at least 16 characters, since it is fed
/// directly into PBKDF2 key derivation for the store.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.path.as_os_str().is_empty() {
        bail!("db.path is required");
    }
    if config.db.encrypt_key.len() < 16 {
        bail!("db.encrypt_key must be at least 16 characters");
    }
    if config.http.listen.is_empty() {
        bail!("http.listen is required");
    }
    Ok(())
}

/// Current time in `tz`, formatted as RFC3339. Falls back to UTC if `tz`
/// does not parse as an IANA timezone name.
pub fn time_now(tz: &str) -> String {
    use chrono::Utc;
    use chrono_tz::Tz;

    match tz.parse::<Tz>() {
        Ok(zone) => Utc::now().with_timezone(&zone).to_rfc3339(),
        Err(_) => Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn defaults_apply_when_sections_absent() {
        let config = Config::default();
        assert_eq!(config.global.timezone, "UTC");
        assert_eq!(config.global.cmd_prefix, "/bin/sh -c");
        assert_eq!(config.notifications.store_max, 100);
    }

    #[test]
    fn load_config_rejects_short_encrypt_key() {
        let file = write_config(
            "db:\n  path: /tmp/warden.db\n  encrypt_key: tooshort\nhttp:\n  listen: :8080\n",
        );
        let err = load_config(file.path()).expect_err("short key should be rejected");
        assert!(err.to_string().contains("encrypt_key"));
    }

    #[test]
    fn load_config_accepts_minimal_valid_file() {
        let file = write_config(
            "db:\n  path: /tmp/warden.db\n  encrypt_key: 0123456789abcdef\nhttp:\n  listen: :8080\n",
        );
        let config = load_config(file.path()).expect("valid config loads");
        assert_eq!(config.db.path, PathBuf::from("/tmp/warden.db"));
        assert_eq!(config.global.timezone, "UTC");
    }

    #[test]
    fn load_config_parses_webhooks() {
        let file = write_config(
            "db:\n  path: /tmp/warden.db\n  encrypt_key: 0123456789abcdef\nhttp:\n  listen: :8080\n\
             notifications:\n  store_max: 50\n  webhooks:\n    slack:\n      method: POST\n      url: https://hooks.example.com\n      body: \"$PAL_STATUS\"\n",
        );
        let config = load_config(file.path()).expect("valid config loads");
        assert_eq!(config.notifications.store_max, 50);
        assert_eq!(config.notifications.webhooks["slack"].method, "POST");
    }

    #[test]
    fn time_now_falls_back_to_utc_on_bad_timezone() {
        let out = time_now("Not/AZone");
        assert!(chrono::DateTime::parse_from_rfc3339(&out).is_ok());
    }

    #[test]
    fn time_now_honors_known_timezone() {
        let out = time_now("America/New_York");
        assert!(chrono::DateTime::parse_from_rfc3339(&out).is_ok());
    }
}
