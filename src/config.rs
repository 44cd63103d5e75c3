use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::strategy::{
    BollingerConfig, EmaCrossConfig, KeltnerConfig, RsiConfig, StochRsiConfig, StrategyKind,
};

/// Command-line overrides, applied on top of the config file
#[derive(Debug, Parser)]
#[command(name = "candlebot", about = "Multi-symbol indicator trading bot")]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    pub config: String,

    /// Route orders to the exchange's test endpoint and skip the dataset file
    #[arg(long)]
    pub test_mode: bool,

    /// Buy sizing mode
    #[arg(long, value_enum)]
    pub buy_mode: Option<BuyMode>,

    /// Quote-currency amount per buy (flat-amount mode)
    #[arg(long)]
    pub flat_amount: Option<f64>,

    /// Percentage of the quote balance per buy (balance-percent mode)
    #[arg(long)]
    pub balance_percent: Option<f64>,

    /// Trade only these symbols, overriding the configured list
    #[arg(long = "symbol")]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BuyMode {
    FlatAmount,
    BalancePercent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuyConfig {
    pub mode: BuyMode,
    pub flat_amount: f64,
    pub balance_percent: f64,
}

impl Default for BuyConfig {
    fn default() -> Self {
        Self {
            mode: BuyMode::FlatAmount,
            flat_amount: 30.0,
            balance_percent: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeConfig {
    pub rest_url: String,
    pub ws_url: String,
    pub api_key: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443".to_string(),
            api_key: String::new(),
        }
    }
}

/// Per-variant strategy settings plus the active set
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategiesConfig {
    pub active: Vec<StrategyKind>,
    pub rsi: RsiConfig,
    pub bollinger: BollingerConfig,
    pub ema_cross: EmaCrossConfig,
    pub keltner: KeltnerConfig,
    pub stoch_rsi: StochRsiConfig,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            active: vec![StrategyKind::Rsi],
            rsi: RsiConfig::default(),
            bollinger: BollingerConfig::default(),
            ema_cross: EmaCrossConfig::default(),
            keltner: KeltnerConfig::default(),
            stoch_rsi: StochRsiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub symbols: Vec<String>,
    pub trade_currencies: Vec<String>,
    pub buy: BuyConfig,
    pub stop_loss_percent: f64,
    pub buy_after_stop_loss: bool,
    pub closes_array_size: usize,
    pub interval: String,
    pub test_mode: bool,
    pub max_symbols: usize,
    pub startup_stagger_secs: u64,
    pub reconnect_delay_secs: u64,
    pub dataset_dir: PathBuf,
    pub exchange: ExchangeConfig,
    pub strategies: StrategiesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["ETHGBP".to_string()],
            trade_currencies: vec!["GBP".to_string(), "USDT".to_string()],
            buy: BuyConfig::default(),
            stop_loss_percent: 5.0,
            buy_after_stop_loss: false,
            closes_array_size: 500,
            interval: "1m".to_string(),
            test_mode: false,
            max_symbols: 5,
            startup_stagger_secs: 5,
            reconnect_delay_secs: 5,
            dataset_dir: PathBuf::from("datasets"),
            exchange: ExchangeConfig::default(),
            strategies: StrategiesConfig::default(),
        }
    }
}

impl Config {
    /// Load the config file (if present), apply `CANDLEBOT_*` environment
    /// overrides, then CLI overrides, and validate the result
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config: Config = config::Config::builder()
            .add_source(config::File::with_name(&cli.config).required(false))
            .add_source(config::Environment::with_prefix("CANDLEBOT").separator("__"))
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;

        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if cli.test_mode {
            self.test_mode = true;
        }
        if let Some(mode) = cli.buy_mode {
            self.buy.mode = mode;
        }
        if let Some(amount) = cli.flat_amount {
            self.buy.flat_amount = amount;
        }
        if let Some(percent) = cli.balance_percent {
            self.buy.balance_percent = percent;
        }
        if !cli.symbols.is_empty() {
            self.symbols = cli.symbols.clone();
        }
    }

    /// Fail fast on a configuration the trading loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("no symbols configured");
        }
        for symbol in &self.symbols {
            if self.split_symbol(symbol).is_none() {
                bail!(
                    "symbol {symbol} does not end with a configured trade currency ({:?})",
                    self.trade_currencies
                );
            }
        }
        if !(0.0 < self.stop_loss_percent && self.stop_loss_percent <= 100.0) {
            bail!(
                "stop_loss_percent must be within (0, 100], got {}",
                self.stop_loss_percent
            );
        }
        match self.buy.mode {
            BuyMode::FlatAmount if self.buy.flat_amount <= 0.0 => {
                bail!("flat_amount must be positive, got {}", self.buy.flat_amount)
            }
            BuyMode::BalancePercent
                if !(0.0 < self.buy.balance_percent && self.buy.balance_percent <= 100.0) =>
            {
                bail!(
                    "balance_percent must be within (0, 100], got {}",
                    self.buy.balance_percent
                )
            }
            _ => {}
        }
        if self.strategies.active.is_empty() {
            bail!("no active strategies configured");
        }
        for kind in &self.strategies.active {
            let strategy = kind.build(&self.strategies);
            if strategy.required_samples() > self.closes_array_size {
                bail!(
                    "{} needs {} samples but closes_array_size is {}",
                    strategy.name(),
                    strategy.required_samples(),
                    self.closes_array_size
                );
            }
        }
        if self.max_symbols == 0 {
            bail!("max_symbols must be at least 1");
        }
        if !self.test_mode && self.exchange.api_key.is_empty() {
            bail!("an exchange API key is required outside test mode");
        }
        Ok(())
    }

    /// Split a symbol into (base, quote) using the configured trade
    /// currencies as quote suffixes
    pub fn split_symbol<'a>(&'a self, symbol: &'a str) -> Option<(&'a str, &'a str)> {
        self.trade_currencies
            .iter()
            .find_map(|quote| {
                let base = symbol.strip_suffix(quote.as_str())?;
                (!base.is_empty()).then_some((base, quote.as_str()))
            })
    }

    /// Multiplier applied to the purchase price for the stop-loss floor
    pub fn stop_loss_multiplier(&self) -> f64 {
        (100.0 - self.stop_loss_percent) / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_fails_without_api_key() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_valid_in_test_mode() {
        let config = Config {
            test_mode: true,
            ..Config::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_symbol_without_trade_currency_suffix() {
        let config = Config {
            test_mode: true,
            symbols: vec!["ETHBTC".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_stop_loss() {
        for bad in [0.0, -1.0, 101.0] {
            let config = Config {
                test_mode: true,
                stop_loss_percent: bad,
                ..Config::default()
            };
            assert!(config.validate().is_err(), "stop loss {bad} accepted");
        }
    }

    #[test]
    fn test_rejects_window_smaller_than_strategy_requirement() {
        let config = Config {
            test_mode: true,
            closes_array_size: 10,
            ..Config::default()
        };
        // default RSI period 14 needs 15 samples
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nonpositive_flat_amount() {
        let config = Config {
            test_mode: true,
            buy: BuyConfig {
                mode: BuyMode::FlatAmount,
                flat_amount: 0.0,
                ..BuyConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_active_set() {
        let config = Config {
            test_mode: true,
            strategies: StrategiesConfig {
                active: vec![],
                ..StrategiesConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_split_symbol_matches_quote_suffix() {
        let config = Config::default();
        assert_eq!(config.split_symbol("ETHGBP"), Some(("ETH", "GBP")));
        assert_eq!(config.split_symbol("SOLUSDT"), Some(("SOL", "USDT")));
        assert_eq!(config.split_symbol("ETHBTC"), None);
        assert_eq!(config.split_symbol("GBP"), None);
    }

    #[test]
    fn test_stop_loss_multiplier() {
        let config = Config {
            stop_loss_percent: 5.0,
            ..Config::default()
        };
        assert!((config.stop_loss_multiplier() - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let cli = Cli {
            config: "missing.json".to_string(),
            test_mode: true,
            buy_mode: Some(BuyMode::BalancePercent),
            flat_amount: None,
            balance_percent: Some(50.0),
            symbols: vec!["SOLUSDT".to_string()],
        };
        let mut config = Config::default();
        config.apply_cli(&cli);

        assert!(config.test_mode);
        assert_eq!(config.buy.mode, BuyMode::BalancePercent);
        assert_eq!(config.buy.balance_percent, 50.0);
        assert_eq!(config.symbols, vec!["SOLUSDT".to_string()]);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        // a misspelled key must fail at load, not silently trade on defaults
        let result = serde_json::from_str::<Config>(r#"{"stoploss_percent": 3.0}"#);
        assert!(result.is_err());

        let nested = serde_json::from_str::<Config>(r#"{"buy": {"flatamount": 10.0}}"#);
        assert!(nested.is_err());

        let strategies =
            serde_json::from_str::<Config>(r#"{"strategies": {"activ": ["rsi"]}}"#);
        assert!(strategies.is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let json = r#"{
            "symbols": ["ETHGBP", "SOLUSDT"],
            "buy": {"mode": "balance_percent", "balance_percent": 75.54},
            "strategies": {"active": ["rsi", "bollinger"]}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.symbols.len(), 2);
        assert_eq!(config.buy.mode, BuyMode::BalancePercent);
        assert_eq!(
            config.strategies.active,
            vec![StrategyKind::Rsi, StrategyKind::Bollinger]
        );
        // untouched sections keep their defaults
        assert_eq!(config.stop_loss_percent, 5.0);
    }
}
