//! Ambient utilities shared across the agent runtime crates: process-wide
//! metrics registration, test logging setup, and monotonic id generation.
//!
//! This mirrors the role `quickwit-common` plays for `quickwit-actors`: a
//! small grab-bag of cross-cutting concerns that every crate in the
//! workspace needs but that do not belong to any single subsystem.

pub mod ids;
pub mod metrics;

use tracing::info;

/// Installs a best-effort `env_logger` subscriber for use in `#[test]`
/// functions. Safe to call from multiple tests; only the first call wins.
pub fn setup_logging_for_tests() {
    let _ = env_logger::builder().format_timestamp(None).try_init();
}

/// Reads an environment variable, falling back to `default_value` and
/// logging which source was used.
pub fn get_from_env<T>(key: &str, default_value: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    if let Ok(value_str) = std::env::var(key) {
        if let Ok(value) = value_str.parse() {
            info!(value = ?value, "setting `{}` from environment", key);
            return value;
        }
    }
    default_value
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_get_from_env_falls_back_to_default() {
        assert_eq!(super::get_from_env::<u32>("AGENT_RUNTIME_DOES_NOT_EXIST", 7), 7);
    }
}
