//! Bearer token lookup in the per-user `~/.api-keys` file.
//!
//! The file is a JSON object; the token lives under the top-level string key
//! `RIMBRIDGE_TOKEN`. Any problem reading it simply means "no token".

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

pub const CREDENTIALS_FILE: &str = ".api-keys";
pub const TOKEN_KEY: &str = "RIMBRIDGE_TOKEN";

/// Home directory from `HOME`, then `USERPROFILE`.
pub fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

pub fn default_credentials_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(CREDENTIALS_FILE))
}

/// Loads the token from the default location.
pub fn load_token() -> Option<String> {
    let path = default_credentials_path()?;
    read_token_from(&path)
}

/// Reads a non-empty, trimmed token from `path`.
pub fn read_token_from(path: &Path) -> Option<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No credentials file");
            return None;
        }
    };

    let parsed: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Credentials file is not valid JSON");
            return None;
        }
    };

    parsed
        .get(TOKEN_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
