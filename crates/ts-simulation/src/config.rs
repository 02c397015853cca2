use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG seed for deterministic world generation and growth.
    pub seed: u64,
    /// Map width in cells.
    pub map_width: u32,
    /// Map height in cells.
    pub map_height: u32,
    /// Maximum event log size (oldest events dropped when exceeded). 0 = unlimited.
    pub max_events: usize,
    /// Starting balance of the town family.
    pub town_balance: f64,
    /// Starting balance of the player family.
    pub player_balance: f64,
    pub pricing: PricingConfig,
    pub trade: TradeConfig,
    pub worldgen: WorldgenConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            map_width: 40,
            map_height: 40,
            max_events: 10_000,
            town_balance: 500.0,
            player_balance: 200.0,
            pricing: PricingConfig::default(),
            trade: TradeConfig::default(),
            worldgen: WorldgenConfig::default(),
        }
    }
}

/// Tuning for the demand and price curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// How strongly each unit of stock pushes demand down, per second.
    pub stock_relief: f64,
    /// Price multiplier per unit of demand: `price = base × (1 + sensitivity × demand)`.
    pub sensitivity: f64,
    /// Demand never exceeds this.
    pub max_demand: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            stock_relief: 0.05,
            sensitivity: 0.1,
            max_demand: 50.0,
        }
    }
}

/// Tuning for bids and merchants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    /// Map units a merchant covers per second.
    pub merchant_speed: f64,
    /// Seconds of consumption a demander tries to keep in stock.
    pub buffer_secs: f64,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            merchant_speed: 2.0,
            buffer_secs: 10.0,
        }
    }
}

/// What the generated starting map contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldgenConfig {
    /// Number of market towns laid out across the map.
    pub markets: usize,
    /// Dwellings placed around each market.
    pub dwellings_per_market: usize,
    /// Units of each local output a merchant picks up at a stop.
    pub cargo: u32,
}

impl Default for WorldgenConfig {
    fn default() -> Self {
        Self {
            markets: 2,
            dwellings_per_market: 3,
            cargo: 5,
        }
    }
}

impl SimConfig {
    /// Parse a config from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> SimResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the systems cannot run with.
    pub fn validate(&self) -> SimResult<()> {
        if self.map_width == 0 || self.map_height == 0 {
            return Err(SimError::Config("map dimensions must be positive".into()));
        }
        if !self.trade.merchant_speed.is_finite() || self.trade.merchant_speed <= 0.0 {
            return Err(SimError::Config("merchant_speed must be positive".into()));
        }
        if self.trade.buffer_secs < 0.0 {
            return Err(SimError::Config("buffer_secs must not be negative".into()));
        }
        if self.pricing.max_demand < 0.0 || self.pricing.sensitivity < 0.0 {
            return Err(SimError::Config(
                "max_demand and sensitivity must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the map size in cells.
    pub fn with_map_size(mut self, width: u32, height: u32) -> Self {
        self.map_width = width;
        self.map_height = height;
        self
    }

    /// Set the maximum event log size (0 = unlimited).
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    /// Set the player family's starting balance.
    pub fn with_player_balance(mut self, balance: f64) -> Self {
        self.player_balance = balance;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingConfig) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_trade(mut self, trade: TradeConfig) -> Self {
        self.trade = trade;
        self
    }

    pub fn with_worldgen(mut self, worldgen: WorldgenConfig) -> Self {
        self.worldgen = worldgen;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let config = SimConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!((config.map_width, config.map_height), (40, 40));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_builder_chain() {
        let config = SimConfig::default()
            .with_seed(123)
            .with_map_size(20, 30)
            .with_max_events(500)
            .with_player_balance(5.0);
        assert_eq!(config.seed, 123);
        assert_eq!(config.map_width, 20);
        assert_eq!(config.map_height, 30);
        assert_eq!(config.max_events, 500);
        assert!((config.player_balance - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{ "seed": 7, "pricing": { "sensitivity": 0.5 } }"#)
            .unwrap();
        assert_eq!(config.seed, 7);
        assert!((config.pricing.sensitivity - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.pricing.max_demand, PricingConfig::default().max_demand);
        assert_eq!(config.trade, TradeConfig::default());
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        assert!(matches!(
            SimConfig::from_json("{ not json"),
            Err(SimError::Config(_))
        ));
        assert!(matches!(
            SimConfig::from_json(r#"{ "map_width": 0 }"#),
            Err(SimError::Config(_))
        ));
        assert!(matches!(
            SimConfig::from_json(r#"{ "trade": { "merchant_speed": 0.0 } }"#),
            Err(SimError::Config(_))
        ));
    }
}
