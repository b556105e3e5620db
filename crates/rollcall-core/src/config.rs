//! Application configuration management.
//!
//! Configuration is read from `~/.config/rollcall/config.json` when present,
//! then overridden by environment variables (a `.env` file is loaded by the
//! server before this runs).

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/data directory paths
const APP_NAME: &str = "rollcall";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 9000;

/// Default bind address
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Public Twilio REST endpoint
pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// How submitted student IDs that match no student are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdResolution {
    /// Drop unknown IDs and report them as skipped
    #[default]
    Lenient,
    /// Reject the whole submission if any ID is unknown
    Strict,
}

impl FromStr for IdResolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(IdResolution::Lenient),
            "strict" => Ok(IdResolution::Strict),
            other => Err(anyhow::anyhow!(
                "unsupported ID resolution `{other}`; expected lenient|strict"
            )),
        }
    }
}

/// Credentials for the Twilio WhatsApp sender.
#[derive(Clone, Serialize, Deserialize)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender, e.g. `whatsapp:+14155238886`
    pub from_number: String,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

// Keep the auth token out of logs
impl std::fmt::Debug for TwilioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioSettings")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn default_twilio_api_base() -> String {
    DEFAULT_TWILIO_API_BASE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: Option<PathBuf>,
    pub id_resolution: IdResolution,
    pub notifications_enabled: bool,
    pub twilio: Option<TwilioSettings>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            data_dir: None,
            id_resolution: IdResolution::default(),
            notifications_enabled: true,
            twilio: None,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let base = match Self::config_path() {
            Ok(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            _ => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = var("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got `{port}`"))?;
        }
        if let Some(bind) = var("ROLLCALL_BIND") {
            self.bind = bind.trim().to_string();
        }
        if let Some(dir) = var("ROLLCALL_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(mode) = var("ROLLCALL_ID_RESOLUTION") {
            self.id_resolution = mode.parse()?;
        }
        if let Some(flag) = var("ROLLCALL_NOTIFY") {
            self.notifications_enabled = parse_flag(&flag)
                .with_context(|| format!("ROLLCALL_NOTIFY must be true|false, got `{flag}`"))?;
        }
        if let Some(dir) = var("ROLLCALL_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }

        let sid = var("TWILIO_ACCOUNT_SID");
        let token = var("TWILIO_AUTH_TOKEN");
        let from = var("TWILIO_WHATSAPP_NUMBER");
        match (sid, token, from) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => {
                self.twilio = Some(TwilioSettings {
                    account_sid,
                    auth_token,
                    from_number,
                    api_base: var("TWILIO_API_BASE").unwrap_or_else(default_twilio_api_base),
                });
            }
            (None, None, None) => {}
            _ => warn!("Incomplete Twilio environment; need TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_WHATSAPP_NUMBER"),
        }

        Ok(self)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the document store
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    /// `bind:port` for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
