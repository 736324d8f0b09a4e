//! # Oddsmith Configuration
//!
//! Typed application configuration, the policy snapshot and logging setup.
//!
//! ## Sources
//!
//! Values are layered, later sources winning:
//! 1. Serde defaults on every section.
//! 2. An optional `config.toml`.
//! 3. Environment variables prefixed `ODDSMITH`, nested with `__`
//!    (e.g. `ODDSMITH__STRESS__BASE_SEED=11`).

use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod policy;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use logging::init_tracing;
pub use policy::{
    ConservationMode, PolicyConfig, PolicySnapshot, PolicyValues, SanityAction, StageMode,
};
pub use settings::{
    ArenaConfig, BacktestConfig, Config, EngineConfig, EnsembleConfig, FitnessConfig,
    FitnessWeights, LoggingConfig, MarketConfig, PromotionConfig, SearchBudget,
    SearchConstraints, StressConfig, TimeMachineConfig,
};

/// Loads the application configuration.
///
/// `path` defaults to `config.toml` in the working directory; a missing file
/// is not an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.toml"));
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(environment())
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from TOML text, without consulting the environment.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("ODDSMITH")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Cadence, MarketId};

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = load_config_from_str("").unwrap();
        assert_eq!(cfg.fitness.decay_floor, 0.20);
        assert_eq!(cfg.fitness.ece_buckets, 10);
        assert_eq!(cfg.fitness.ece_min_bucket_n, 20);
        assert_eq!(cfg.time_machine.lookback_years, 8);
        assert_eq!(cfg.policy.defaults.shadow_min_tips, 50);
    }

    #[test]
    fn sections_and_market_ranges_override_defaults() {
        let cfg = load_config_from_str(
            r#"
            [time_machine]
            cadence = "quarterly"
            workers = 3

            [policy.defaults]
            MAX_XG_PER_TEAM = 7.5

            [markets.epl.gene_ranges.min_edge]
            min = 0.02
            max = 0.10
            "#,
        )
        .unwrap();

        assert_eq!(cfg.time_machine.cadence, Cadence::Quarterly);
        assert_eq!(cfg.time_machine.workers, 3);
        assert_eq!(cfg.policy.defaults.max_xg_per_team, 7.5);

        let ranges = cfg.gene_ranges(&MarketId::new("epl"));
        let min_edge = ranges.get("min_edge").unwrap();
        assert_eq!((min_edge.min, min_edge.max), (0.02, 0.10));
        assert!(ranges.get("kelly_fraction").is_some());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let err = load_config_from_str("[ensemble]\nruns = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn zero_live_concurrency_is_rejected() {
        let err = load_config_from_str("[engine]\nlive_concurrency = 0\n").unwrap_err();
        match err {
            ConfigError::ValidationError(message) => assert!(message.contains("concurrency")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
