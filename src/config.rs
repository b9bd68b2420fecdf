use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

pub const API_URL_VAR: &str = "BREWDESK_API_URL";
pub const TIMEOUT_VAR: &str = "BREWDESK_TIMEOUT_SECS";
pub const TOKEN_FILE_VAR: &str = "BREWDESK_TOKEN_FILE";

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_TIMEOUT_SECS: &str = "30";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Client settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub token_file: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let timeout_secs: u64 = try_load(TIMEOUT_VAR, DEFAULT_TIMEOUT_SECS)?;
        let token_file = var(TOKEN_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(default_token_file);

        Ok(Self {
            api_url: try_load(API_URL_VAR, DEFAULT_API_URL)?,
            timeout: Duration::from_secs(timeout_secs),
            token_file,
        })
    }
}

/// `<data dir>/brewdesk/credential.json`, or a dot directory under the
/// working directory when the platform has no data dir.
pub fn default_token_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("brewdesk"))
        .unwrap_or_else(|| PathBuf::from(".brewdesk"))
        .join("credential.json")
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let timeout: u64 = try_load("BREWDESK_TEST_UNSET_TIMEOUT", DEFAULT_TIMEOUT_SECS).unwrap();
        assert_eq!(timeout, 30);
        let url: String = try_load("BREWDESK_TEST_UNSET_URL", DEFAULT_API_URL).unwrap();
        assert_eq!(url, DEFAULT_API_URL);
    }

    #[test]
    fn invalid_default_reports_key() {
        let err = try_load::<u64>("BREWDESK_TEST_UNSET_NUMBER", "soon").unwrap_err();
        assert!(err.to_string().contains("BREWDESK_TEST_UNSET_NUMBER"));
    }

    #[test]
    fn token_file_has_expected_name() {
        assert!(default_token_file().ends_with("brewdesk/credential.json")
            || default_token_file().ends_with(".brewdesk/credential.json"));
    }
}
