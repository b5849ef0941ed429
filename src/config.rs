use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::core_types::{PaymentMethod, UserId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL trade store; in-memory store when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub trade: TradeConfig,
    #[serde(default)]
    pub escrow: EscrowConfig,
    /// Custodian REST API; the in-memory custodian is used when absent
    #[serde(default)]
    pub custodian: Option<CustodianConfig>,
    #[serde(default)]
    pub vendor: VendorConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Offer and trade lifecycle windows
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TradeConfig {
    pub request_ttl_secs: u64,
    /// Allowed drift between `asset_amount × rate` and `fiat_amount`, in basis points
    pub rate_tolerance_bps: u32,
    pub supported_payment_methods: Vec<PaymentMethod>,
    pub funding_window_secs: u64,
    pub payment_window_secs: u64,
    pub confirmation_window_secs: u64,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            request_ttl_secs: 600,
            rate_tolerance_bps: 50,
            supported_payment_methods: vec![
                PaymentMethod::BankTransfer,
                PaymentMethod::CashPickup,
                PaymentMethod::CashDelivery,
            ],
            funding_window_secs: 3_600,
            payment_window_secs: 3_600,
            confirmation_window_secs: 7_200,
        }
    }
}

impl TradeConfig {
    pub fn request_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.request_ttl_secs as i64)
    }

    pub fn funding_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.funding_window_secs as i64)
    }

    pub fn payment_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.payment_window_secs as i64)
    }

    pub fn confirmation_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.confirmation_window_secs as i64)
    }
}

/// Background sweeps
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EscrowConfig {
    pub poll_interval_secs: u64,
    pub sweep_batch_size: usize,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            sweep_batch_size: 100,
        }
    }
}

impl EscrowConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustodianConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_custodian_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_custodian_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VendorConfig {
    pub code_length: usize,
    pub max_code_attempts: u32,
    /// Active vendors, assigned round-robin
    pub vendor_ids: Vec<UserId>,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            max_code_attempts: 5,
            vendor_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Shared secret the custodian sends on deposit callbacks
    #[serde(default)]
    pub callback_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationConfig {
    pub queue_size: usize,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            webhook_url: None,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be at least 32 bytes".into(),
            ));
        }
        if !(4..=12).contains(&self.vendor.code_length) {
            return Err(ConfigError::Invalid(
                "vendor.code_length must be between 4 and 12".into(),
            ));
        }
        if self.vendor.max_code_attempts == 0 {
            return Err(ConfigError::Invalid(
                "vendor.max_code_attempts must be positive".into(),
            ));
        }
        if self.trade.request_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "trade.request_ttl_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
