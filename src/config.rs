// ⚙️ Configuration - environment + .env
// Ledger credentials, date formats, storage and listen settings

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DATE_FORMAT: &str = "dd MMMM yyyy";
pub const DEFAULT_TIME_FORMAT: &str = "dd MMMM yyyy HH:mm:ss";
pub const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Settings for talking to the external ledger
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    pub auth_token: String,
    pub tenant_id: String,
    pub date_format: String,
    pub time_format: String,
    pub locale: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
    pub default_payment_type_id: i64,
    pub default_channel_type_id: i64,
}

impl LedgerConfig {
    /// Config pointing at `base_url` with default formats and retry settings.
    pub fn new(base_url: &str, auth_token: &str, tenant_id: &str) -> Self {
        LedgerConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
            tenant_id: tenant_id.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            default_payment_type_id: 8,
            default_channel_type_id: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub sessions_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub debug: bool,
}

impl Config {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(&env::vars().collect())
    }

    /// Build the config from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<&str> = ["FINERACT_BASE_URL", "FINERACT_AUTH_TOKEN", "FINERACT_TENANT_ID"]
            .into_iter()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing.join(", ")));
        }

        let mut ledger = LedgerConfig::new(
            &get("FINERACT_BASE_URL").unwrap_or_default(),
            &get("FINERACT_AUTH_TOKEN").unwrap_or_default(),
            &get("FINERACT_TENANT_ID").unwrap_or_default(),
        );
        if let Some(v) = get("DATE_FORMAT") {
            ledger.date_format = v;
        }
        if let Some(v) = get("TIME_FORMAT") {
            ledger.time_format = v;
        }
        if let Some(v) = get("LOCALE") {
            ledger.locale = v;
        }
        ledger.max_retries = parse_or(vars, "LEDGER_MAX_RETRIES", ledger.max_retries)?;
        ledger.retry_delay = Duration::from_millis(parse_or(vars, "LEDGER_RETRY_DELAY_MS", 2000u64)?);
        ledger.timeout = Duration::from_secs(parse_or(vars, "LEDGER_TIMEOUT_SECS", 30u64)?);
        ledger.accept_invalid_certs = parse_flag(vars, "LEDGER_ACCEPT_INVALID_CERTS", false)?;
        ledger.default_payment_type_id = parse_or(vars, "DEFAULT_PAYMENT_TYPE_ID", 8i64)?;
        ledger.default_channel_type_id = parse_or(vars, "DEFAULT_CHANNEL_TYPE_ID", 1i64)?;

        Ok(Config {
            ledger,
            sessions_dir: get("SESSIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./sessions")),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(vars, "PORT", 8000u16)?,
            debug: parse_flag(vars, "DEBUG", true)?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn parse_flag(vars: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "on" | "yes" => Ok(true),
            "0" | "false" | "off" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value: v,
            }),
        },
    }
}
