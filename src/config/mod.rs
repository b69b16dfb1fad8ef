//! # Configuration Management Module
//!
//! TOML configuration for the questbank service: loan tunables, sweep
//! intervals, storage location, catalog files and logging.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use questbank::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Loans: {}", config.loan_terms()?.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [economy]
//! max_loan_amount = "10000"
//! daily_interest_rate_percent = 1.0
//! repayment_period_days = 7
//! max_active_loans_per_account = 3
//! loan_currency = "gold"
//! autosave_interval_seconds = 600
//!
//! [storage]
//! data_dir = "data/economy"
//!
//! [catalog]
//! currencies_file = "data/catalog/currencies.json"
//! quests_file = "data/catalog/quests.json"
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::economy::currency::parse_amount;
use crate::economy::loan::LoanTerms;
use crate::economy::sweeps::SweepIntervals;
use crate::economy::types::{Money, MINOR_PER_MAJOR};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub economy: EconomyConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Loan ceiling in major units; a whole number or a decimal string ("2500.50").
    pub max_loan_amount: AmountSetting,
    pub daily_interest_rate_percent: f64,
    pub repayment_period_days: u32,
    pub max_active_loans_per_account: usize,
    #[serde(default = "default_loan_currency")]
    pub loan_currency: String,
    /// 0 disables autosave.
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_seconds: u64,
    #[serde(default = "default_loan_sweep_interval")]
    pub loan_sweep_interval_seconds: u64,
    #[serde(default = "default_interaction_timeout")]
    pub interaction_timeout_seconds: u64,
}

/// A currency amount written either as an integer or as a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountSetting {
    Whole(i64),
    Text(String),
}

impl AmountSetting {
    pub fn to_money(&self) -> Result<Money> {
        match self {
            AmountSetting::Whole(major) => major
                .checked_mul(MINOR_PER_MAJOR)
                .map(Money::from_minor)
                .ok_or_else(|| anyhow!("amount {} is too large", major)),
            AmountSetting::Text(text) => {
                parse_amount(text).map_err(|e| anyhow!("invalid amount '{}': {}", text, e))
            }
        }
    }
}

fn default_loan_currency() -> String {
    "gold".to_string()
}

fn default_autosave_interval() -> u64 {
    600
}

fn default_loan_sweep_interval() -> u64 {
    60
}

fn default_interaction_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub currencies_file: String,
    pub quests_file: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            currencies_file: "data/catalog/currencies.json".to_string(),
            quests_file: "data/catalog/quests.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the economy cannot run with.
    pub fn validate(&self) -> Result<()> {
        let economy = &self.economy;
        let max = economy.max_loan_amount.to_money()?;
        if !max.is_positive() {
            return Err(anyhow!("economy.max_loan_amount must be positive"));
        }
        if !economy.daily_interest_rate_percent.is_finite()
            || economy.daily_interest_rate_percent < 0.0
            || economy.daily_interest_rate_percent > 100.0
        {
            return Err(anyhow!(
                "economy.daily_interest_rate_percent must be between 0 and 100"
            ));
        }
        let bps = economy.daily_interest_rate_percent * 100.0;
        if (bps - bps.round()).abs() > 1e-6 {
            return Err(anyhow!(
                "economy.daily_interest_rate_percent must be a multiple of 0.01 (got {})",
                economy.daily_interest_rate_percent
            ));
        }
        if economy.repayment_period_days == 0 {
            return Err(anyhow!("economy.repayment_period_days must be at least 1"));
        }
        if economy.max_active_loans_per_account == 0 {
            return Err(anyhow!(
                "economy.max_active_loans_per_account must be at least 1"
            ));
        }
        if economy.loan_currency.trim().is_empty() {
            return Err(anyhow!("economy.loan_currency must not be empty"));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        Ok(())
    }

    /// Loan tunables with the daily rate converted to basis points.
    pub fn loan_terms(&self) -> Result<LoanTerms> {
        let economy = &self.economy;
        Ok(LoanTerms {
            max_amount: economy.max_loan_amount.to_money()?,
            daily_rate_bps: (economy.daily_interest_rate_percent * 100.0).round() as u32,
            repayment_period_days: economy.repayment_period_days,
            max_active_loans: economy.max_active_loans_per_account,
            currency: economy.loan_currency.clone(),
        })
    }

    pub fn sweep_intervals(&self) -> SweepIntervals {
        SweepIntervals {
            autosave_seconds: self.economy.autosave_interval_seconds,
            loan_due_seconds: self.economy.loan_sweep_interval_seconds,
            interaction_expiry_seconds: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            economy: EconomyConfig {
                max_loan_amount: AmountSetting::Whole(10_000),
                daily_interest_rate_percent: 1.0,
                repayment_period_days: 7,
                max_active_loans_per_account: 3,
                loan_currency: default_loan_currency(),
                autosave_interval_seconds: default_autosave_interval(),
                loan_sweep_interval_seconds: default_loan_sweep_interval(),
                interaction_timeout_seconds: default_interaction_timeout(),
            },
            storage: StorageConfig {
                data_dir: "data/economy".to_string(),
            },
            catalog: CatalogConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("questbank.log".to_string()),
            },
        }
    }
}
