use serde::Deserialize;

/// Root engine configuration. Loaded from environment variables with the
/// prefix `UPLIFT__`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpliftConfig {
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    /// Floor on the caller-declared minimum sample size at create time.
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    #[serde(default = "default_confidence_level")]
    pub default_confidence_level: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationConfig {
    /// Minimum gap between reallocations of the same experiment.
    #[serde(default = "default_reeval_interval_secs")]
    pub reeval_interval_secs: u64,
    /// How often the background sweep wakes up.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Exploration floor applied to every variant before renormalizing.
    #[serde(default = "default_min_weight_floor")]
    pub min_weight_floor: f64,
    /// Exponential smoothing factor for the dynamic strategy.
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f64,
    #[serde(default = "default_exploration_factor")]
    pub exploration_factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_experiment_ttl_secs")]
    pub experiment_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// How long a seen event id is remembered.
    #[serde(default = "default_dedup_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_dedup_max_entries")]
    pub max_entries: usize,
}

fn default_min_sample_size() -> u64 {
    100
}
fn default_confidence_level() -> f64 {
    0.95
}
fn default_reeval_interval_secs() -> u64 {
    3600
}
fn default_tick_interval_secs() -> u64 {
    60
}
fn default_min_weight_floor() -> f64 {
    5.0
}
fn default_smoothing_factor() -> f64 {
    0.3
}
fn default_exploration_factor() -> f64 {
    2.0
}
fn default_experiment_ttl_secs() -> u64 {
    30
}
fn default_cache_max_entries() -> usize {
    10_000
}
fn default_dedup_ttl_secs() -> u64 {
    86_400
}
fn default_dedup_max_entries() -> usize {
    1_000_000
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            min_sample_size: default_min_sample_size(),
            default_confidence_level: default_confidence_level(),
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            reeval_interval_secs: default_reeval_interval_secs(),
            tick_interval_secs: default_tick_interval_secs(),
            min_weight_floor: default_min_weight_floor(),
            smoothing_factor: default_smoothing_factor(),
            exploration_factor: default_exploration_factor(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            experiment_ttl_secs: default_experiment_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_dedup_ttl_secs(),
            max_entries: default_dedup_max_entries(),
        }
    }
}

impl Default for UpliftConfig {
    fn default() -> Self {
        Self {
            experiment: ExperimentConfig::default(),
            allocation: AllocationConfig::default(),
            cache: CacheConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

impl UpliftConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("UPLIFT")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = UpliftConfig::default();
        assert_eq!(config.experiment.min_sample_size, 100);
        assert_eq!(config.allocation.reeval_interval_secs, 3600);
        assert_eq!(config.allocation.min_weight_floor, 5.0);
        assert_eq!(config.allocation.smoothing_factor, 0.3);
        assert_eq!(config.allocation.exploration_factor, 2.0);
    }
}
