//! Application settings and credential configuration
//!
//! Settings persist as `settings.json` under the platform config dir and
//! are read once at startup. Credential entries resolve their secret from
//! (in order) a literal value, an environment variable, or the OS keyring;
//! entries that resolve to nothing usable - empty, too short to be a real
//! key, or still carrying a `YOUR_` placeholder - are silently excluded
//! from the pool. An empty pool is not fatal here: it only surfaces when a
//! call is actually attempted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dispatch::protocol::API_URL_BASE;
use crate::dispatch::Credential;
use crate::keystore;

const SETTINGS_FILE_NAME: &str = "settings.json";
const CONFIG_DIR_NAME: &str = "polyglot-voice";

/// Real keys are long; anything at or under this length is a typo or a
/// truncated paste, not a credential.
const MIN_KEY_LEN: usize = 21;

/// Placeholder marker left behind by example configs ("YOUR_API_KEY_HERE").
const PLACEHOLDER_MARKER: &str = "YOUR_";

/// Where one credential's secret comes from. Exactly one source is used;
/// `key` wins over `env`, which wins over the keyring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialEntry {
    /// Stable display nickname; also the keyring entry name.
    pub nickname: String,
    /// Literal secret. Prefer `env` or `keyring` so secrets stay out of the
    /// settings file.
    pub key: Option<String>,
    /// Environment variable holding the secret.
    pub env: Option<String>,
    /// Look the secret up in the OS keyring under `nickname`.
    pub keyring: bool,
}

impl CredentialEntry {
    pub fn from_env(nickname: &str, env: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            key: None,
            env: Some(env.to_string()),
            keyring: false,
        }
    }

    fn resolve_secret(&self) -> Option<String> {
        if let Some(key) = &self.key {
            return Some(key.clone());
        }
        if let Some(var) = &self.env {
            if let Ok(value) = std::env::var(var) {
                return Some(value);
            }
        }
        if self.keyring {
            return keystore::get_credential_secret(&self.nickname);
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Base URL of the generative model surface; must end with a slash.
    pub api_base_url: String,

    /// Provider label forwarded to the health reporter.
    pub provider: String,

    /// Ordered credential roster. Order has no runtime meaning (selection
    /// is random) but keeps the file stable for humans.
    pub credentials: Vec<CredentialEntry>,

    /// Retry budget for request/response calls.
    pub max_retries: u32,

    /// Base delay before the first retry, in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Requested capture buffer size in frames per callback (best-effort;
    /// the audio backend may impose its own).
    pub capture_buffer_size: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: API_URL_BASE.to_string(),
            provider: "Gemini".to_string(),
            credentials: vec![
                CredentialEntry::from_env("PRIMARY", "GEMINI_API_KEY"),
                CredentialEntry::from_env("ALT", "GEMINI_API_KEY_ALT"),
                CredentialEntry::from_env("ALT2", "GEMINI_API_KEY_ALT_2"),
            ],
            max_retries: 2,
            retry_base_delay_ms: 1000,
            capture_buffer_size: 4096,
        }
    }
}

fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or("Could not determine config directory")?;
    Ok(dir.join(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> AppSettings {
    match settings_path() {
        Ok(path) => load_settings_from(&path),
        Err(e) => {
            log::warn!("Settings: {}", e);
            AppSettings::default()
        }
    }
}

fn load_settings_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    let path = settings_path()?;
    save_settings_to(&path, settings)
}

fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: write to a temp file in the same directory, then
    // rename. This prevents partial/corrupt settings.json if the app
    // crashes mid-write.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename will atomically replace the destination. On Windows,
    // rename fails if the destination exists, so we remove it first
    // (ignoring NotFound).
    if cfg!(windows) {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(format!("Remove existing settings file {:?}: {}", path, e));
                }
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

/// A resolved secret is usable when it is non-empty, long enough to be a
/// real key, and not a placeholder.
fn is_usable_key(key: &str) -> bool {
    let trimmed = key.trim();
    trimmed.len() >= MIN_KEY_LEN && !trimmed.contains(PLACEHOLDER_MARKER)
}

/// Resolve the configured roster into pool credentials, excluding entries
/// without a usable secret. Exclusion is silent by design (debug-logged
/// only) - a missing alternate key is normal, not an error.
pub fn load_credentials(settings: &AppSettings) -> Vec<Credential> {
    let mut credentials = Vec::new();
    for entry in &settings.credentials {
        if entry.nickname.trim().is_empty() {
            log::debug!("Settings: skipping credential entry with empty nickname");
            continue;
        }
        match entry.resolve_secret() {
            Some(secret) if is_usable_key(&secret) => {
                log::debug!(
                    "Settings: credential '{}' loaded ({})",
                    entry.nickname,
                    keystore::mask_secret(secret.trim())
                );
                credentials.push(Credential::new(&entry.nickname, secret.trim()));
            }
            Some(_) => {
                log::debug!(
                    "Settings: credential '{}' excluded (placeholder or too short)",
                    entry.nickname
                );
            }
            None => {
                log::debug!("Settings: credential '{}' has no secret", entry.nickname);
            }
        }
    }
    credentials
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal_entry(nickname: &str, key: &str) -> CredentialEntry {
        CredentialEntry {
            nickname: nickname.to_string(),
            key: Some(key.to_string()),
            env: None,
            keyring: false,
        }
    }

    #[test]
    fn usable_key_rules() {
        assert!(is_usable_key("AIzaSyA-0123456789-abcdefghijk"));
        assert!(!is_usable_key(""));
        assert!(!is_usable_key("   "));
        assert!(!is_usable_key("short-key"));
        assert!(!is_usable_key("YOUR_ACTUAL_GEMINI_API_KEY_HERE"));
    }

    #[test]
    fn malformed_entries_are_silently_excluded() {
        let settings = AppSettings {
            credentials: vec![
                literal_entry("GOOD", "AIzaSyA-0123456789-abcdefghijk"),
                literal_entry("PLACEHOLDER", "YOUR_SECOND_GEMINI_KEY_PLACEHOLDER"),
                literal_entry("SHORT", "abc123"),
                literal_entry("", "AIzaSyB-0123456789-abcdefghijk"),
            ],
            ..AppSettings::default()
        };

        let credentials = load_credentials(&settings);
        assert_eq!(credentials.len(), 1);
        assert_eq!(credentials[0].nickname(), "GOOD");
    }

    #[test]
    fn literal_key_wins_over_env() {
        let entry = CredentialEntry {
            nickname: "X".to_string(),
            key: Some("literal-value".to_string()),
            env: Some("SOME_UNSET_VAR_FOR_TEST".to_string()),
            keyring: false,
        };
        assert_eq!(entry.resolve_secret().as_deref(), Some("literal-value"));
    }

    #[test]
    fn defaults_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = AppSettings::default();
        save_settings_to(&path, &settings).unwrap();

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.api_base_url, API_URL_BASE);
        assert_eq!(loaded.max_retries, 2);
        assert_eq!(loaded.retry_base_delay_ms, 1000);
        assert_eq!(loaded.capture_buffer_size, 4096);
        assert_eq!(loaded.credentials.len(), 3);
        assert_eq!(loaded.credentials[0].nickname, "PRIMARY");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_settings_from(&dir.path().join("nope.json"));
        assert_eq!(loaded.provider, "Gemini");
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.provider, "Gemini");
    }

    #[test]
    fn unknown_and_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"max_retries": 5}"#).unwrap();

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.max_retries, 5);
        assert_eq!(loaded.retry_base_delay_ms, 1000);
    }
}
