// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Sokoni commerce engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Sokoni configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SokoniConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP server bind settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// WhatsApp Cloud API settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Order numbering settings.
    #[serde(default)]
    pub orders: OrdersConfig,

    /// Abandoned-cart reminder settings.
    #[serde(default)]
    pub reminders: RemindersConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the service.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "sokoni".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP server configuration for the webhook and admin API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("sokoni").join("sokoni.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "sokoni.db".to_string())
}

/// WhatsApp Cloud API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Cloud API access token. `None` disables the WhatsApp adapter.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Business phone number id the Cloud API assigns.
    #[serde(default)]
    pub phone_number_id: Option<String>,

    /// Token echoed back during webhook verification.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// App secret for webhook payload signature verification.
    /// `None` skips signature checks.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// The business number in international digits, used for wa.me deep links.
    #[serde(default)]
    pub business_phone: Option<String>,

    /// Graph API base URL, overridable for tests.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Whether the transport supports interactive messages. When false,
    /// button and list sends degrade to numbered plain text.
    #[serde(default = "default_interactive")]
    pub interactive: bool,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            verify_token: None,
            app_secret: None,
            business_phone: None,
            api_base: default_api_base(),
            interactive: default_interactive(),
        }
    }
}

fn default_api_base() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_interactive() -> bool {
    true
}

/// Order numbering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrdersConfig {
    /// Prefix for generated order numbers.
    #[serde(default = "default_number_prefix")]
    pub number_prefix: String,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            number_prefix: default_number_prefix(),
        }
    }
}

fn default_number_prefix() -> String {
    "WA".to_string()
}

/// Abandoned-cart reminder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemindersConfig {
    /// Cron expression for the sweep schedule.
    #[serde(default = "default_reminder_cron")]
    pub cron: String,

    /// Hours a cart must sit idle before a reminder, and the minimum gap
    /// between two reminders to the same customer.
    #[serde(default = "default_idle_hours")]
    pub idle_hours: u32,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            cron: default_reminder_cron(),
            idle_hours: default_idle_hours(),
        }
    }
}

fn default_reminder_cron() -> String {
    "0 * * * *".to_string()
}

fn default_idle_hours() -> u32 {
    24
}
