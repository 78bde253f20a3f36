use std::env;
use std::path::PathBuf;

use draw_core::DrawConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub roster_path: PathBuf,
    pub persist_path: PathBuf,
    pub bind_addr: String,
    pub admin_password: String,
    pub draw: DrawConfig,
    /// Seeds the first draw of a fresh state file.
    pub seed: Option<u64>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be an unsigned integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("DRAW_MAX_ATTEMPTS must be at least 1")]
    ZeroAttempts,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_attempts = match parse_number(&lookup, "DRAW_MAX_ATTEMPTS")? {
            Some(0) => return Err(ConfigError::ZeroAttempts),
            Some(n) => n as usize,
            None => DrawConfig::default().max_attempts,
        };

        Ok(Self {
            roster_path: lookup("ROSTER_PATH")
                .unwrap_or_else(|| "roster.json".to_string())
                .into(),
            persist_path: lookup("PERSIST_PATH")
                .unwrap_or_else(|| "draw_state.json".to_string())
                .into(),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            admin_password: lookup("ADMIN_PASSWORD").unwrap_or_else(|| "changeme".to_string()),
            draw: DrawConfig { max_attempts },
            seed: parse_number(&lookup, "DRAW_SEED")?,
        })
    }
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber { var, value })
}
