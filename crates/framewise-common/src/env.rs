//! Typed environment variable lookups
//!
//! Every configuration loader in the workspace reads `FRAMEWISE_*`
//! variables through these helpers so that a malformed value is reported
//! with its key instead of being silently replaced by a default.

use crate::error::{FramewiseError, Result};
use std::str::FromStr;

/// Read an optional variable and parse it.
///
/// Unset and empty variables yield `Ok(None)`. A value that fails to parse
/// yields [`FramewiseError::InvalidEnv`].
pub fn parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| FramewiseError::InvalidEnv {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Read a variable, falling back to `default` when it is unset.
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse(key)?.unwrap_or(default))
}

/// Read a string variable, treating empty values as unset.
pub fn string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
