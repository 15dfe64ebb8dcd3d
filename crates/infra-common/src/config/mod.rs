//! Environment-backed configuration helpers.
//!
//! Services read their settings (provider keys, store URLs, ports) from the
//! process environment at startup and fail fast on anything missing or
//! malformed. Secrets never appear in code or config files.

use std::str::FromStr;

use thiserror::Error;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("missing required environment variable {name}")]
    Missing { name: String },

    #[error("invalid value for {name}: {value}")]
    Invalid { name: String, value: String },
}

/// Read a required environment variable, parsed into `T`.
pub fn env_var<T: FromStr>(name: &str) -> Result<T, EnvError> {
    let raw = std::env::var(name).map_err(|_| EnvError::Missing {
        name: name.to_string(),
    })?;
    raw.parse().map_err(|_| EnvError::Invalid {
        name: name.to_string(),
        value: raw,
    })
}

/// Read an optional environment variable, parsed into `T` when present.
///
/// A set-but-unparsable value is an error rather than a silent default.
pub fn optional_env_var<T: FromStr>(name: &str) -> Result<Option<T>, EnvError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| EnvError::Invalid {
                name: name.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn reads_and_parses_present_var() {
        std::env::set_var("VOXDIAL_TEST_PORT", "8080");
        let port: u16 = env_var("VOXDIAL_TEST_PORT").unwrap();
        assert_eq!(port, 8080);
        std::env::remove_var("VOXDIAL_TEST_PORT");
    }

    #[test]
    #[serial]
    fn missing_required_var_is_an_error() {
        std::env::remove_var("VOXDIAL_TEST_ABSENT");
        let result: Result<String, _> = env_var("VOXDIAL_TEST_ABSENT");
        assert!(matches!(result, Err(EnvError::Missing { .. })));
    }

    #[test]
    #[serial]
    fn unparsable_optional_var_is_an_error() {
        std::env::set_var("VOXDIAL_TEST_BAD", "not-a-number");
        let result: Result<Option<u16>, _> = optional_env_var("VOXDIAL_TEST_BAD");
        assert!(matches!(result, Err(EnvError::Invalid { .. })));
        std::env::remove_var("VOXDIAL_TEST_BAD");
    }

    #[test]
    #[serial]
    fn absent_optional_var_is_none() {
        std::env::remove_var("VOXDIAL_TEST_OPT");
        let value: Option<u16> = optional_env_var("VOXDIAL_TEST_OPT").unwrap();
        assert_eq!(value, None);
    }
}
