//! Simulation settings from environment variables.
//!
//! `SIM_SEED`, `SIM_NUM_ORDERS`, `SIM_STARTING_PRICE`, `SIM_TRADERS` and
//! `SIM_SNAPSHOT_PATH`. Unset or unparsable values fall back to defaults.

use crate::market_data_gen::GeneratorConfig;
use crate::types::Amount;
use std::path::PathBuf;
use std::str::FromStr;

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    pub seed: u64,
    pub num_orders: usize,
    pub starting_price: Amount,
    pub traders: usize,
    /// Where to write the registry snapshot after the run, if anywhere.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            num_orders: 1000,
            starting_price: 20,
            traders: 5,
            snapshot_path: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            seed: parsed(&lookup, "SIM_SEED").unwrap_or(defaults.seed),
            num_orders: parsed(&lookup, "SIM_NUM_ORDERS").unwrap_or(defaults.num_orders),
            starting_price: parsed(&lookup, "SIM_STARTING_PRICE")
                .filter(|p: &Amount| *p > 0)
                .unwrap_or(defaults.starting_price),
            traders: parsed(&lookup, "SIM_TRADERS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.traders),
            snapshot_path: lookup("SIM_SNAPSHOT_PATH")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Order-flow settings centred on the starting price.
    pub fn generator(&self) -> GeneratorConfig {
        let spread = (self.starting_price / 4).max(1);
        GeneratorConfig {
            seed: self.seed,
            num_orders: self.num_orders,
            num_traders: self.traders,
            price_min: self.starting_price.saturating_sub(spread).max(1),
            price_max: self.starting_price.saturating_add(spread),
            ..GeneratorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> SimulationConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SimulationConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]), SimulationConfig::default());
    }

    #[test]
    fn reads_values_and_ignores_garbage() {
        let c = config(&[
            ("SIM_SEED", "99"),
            ("SIM_NUM_ORDERS", "abc"),
            ("SIM_STARTING_PRICE", "0"),
            ("SIM_TRADERS", " 3 "),
            ("SIM_SNAPSHOT_PATH", "/tmp/snap.json"),
        ]);
        assert_eq!(c.seed, 99);
        assert_eq!(c.num_orders, 1000);
        assert_eq!(c.starting_price, 20);
        assert_eq!(c.traders, 3);
        assert_eq!(c.snapshot_path, Some(PathBuf::from("/tmp/snap.json")));
    }

    #[test]
    fn generator_prices_bracket_starting_price() {
        let g = config(&[("SIM_STARTING_PRICE", "100")]).generator();
        assert_eq!((g.price_min, g.price_max), (75, 125));
        let g = config(&[("SIM_STARTING_PRICE", "1")]).generator();
        assert_eq!((g.price_min, g.price_max), (1, 2));
    }
}
