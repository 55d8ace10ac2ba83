//! TOML file parsing and environment value parsing.

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

use crate::core::AppupError;

/// Read and deserialize a TOML file.
///
/// # Errors
///
/// Fails when the file cannot be read or does not match `T`. The I/O or TOML
/// error is kept as the cause.
pub fn parse_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: T = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Parse a boolean environment value.
///
/// Accepts `1/true/yes/on` and `0/false/no/off`, case-insensitively.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, AppupError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppupError::ConfigError {
            message: format!("{key} must be a boolean (true/false), got {value:?}"),
        }),
    }
}

/// Parse a numeric environment value.
pub fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, AppupError> {
    value.trim().parse().map_err(|_| AppupError::ConfigError {
        message: format!("{key} must be a non-negative integer, got {value:?}"),
    })
}
