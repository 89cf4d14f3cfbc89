// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and sane reminder windows.

use crate::diagnostic::ConfigError;
use crate::model::SokoniConfig;

/// Valid logging level directives for `agent.log_level`.
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &SokoniConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    }

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                config.agent.log_level
            ),
        });
    }

    if config.reminders.idle_hours < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "reminders.idle_hours must be at least 1, got {}",
                config.reminders.idle_hours
            ),
        });
    }

    if config.orders.number_prefix.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "orders.number_prefix must not be empty".to_string(),
        });
    }

    // The business phone feeds wa.me links, which accept digits only.
    if let Some(phone) = &config.whatsapp.business_phone
        && !phone.chars().all(|c| c.is_ascii_digit())
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "whatsapp.business_phone must contain digits only, got `{phone}`"
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = SokoniConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = SokoniConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))
        ));
    }

    #[test]
    fn bogus_log_level_fails_validation() {
        let mut config = SokoniConfig::default();
        config.agent.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("log_level"))
        ));
    }

    #[test]
    fn zero_idle_hours_fails_validation() {
        let mut config = SokoniConfig::default();
        config.reminders.idle_hours = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("idle_hours"))
        ));
    }

    #[test]
    fn non_numeric_business_phone_fails_validation() {
        let mut config = SokoniConfig::default();
        config.whatsapp.business_phone = Some("+255-700".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("business_phone"))
        ));
    }

    #[test]
    fn digits_only_business_phone_passes() {
        let mut config = SokoniConfig::default();
        config.whatsapp.business_phone = Some("255700000001".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
