//! Periodic weight reallocation. Runs off the request path, gated by a
//! per-experiment minimum re-evaluation interval and a minimum accumulated
//! sample count. New weights are committed as a single compare-and-swap;
//! any failure before the commit leaves the previous weights authoritative.

use crate::normalize::{apply_floor, normalize_weights};
use crate::strategies::{
    dynamic_weights, epsilon_greedy_weights, thompson_weights, ucb_weights, ArmStats,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uplift_core::config::AllocationConfig;
use uplift_core::types::{
    AllocationSnapshot, AllocationStrategy, BanditAlgorithm, ExperimentStatus, VariantWeight,
};
use uplift_core::validate::validate_variant_set;
use uplift_core::{Clock, SharedRng, UpliftError, UpliftResult};
use uplift_store::{ExperimentStore, HistoryStore, TrackingStore};
use uuid::Uuid;

pub struct AllocationOptimizer {
    experiments: Arc<dyn ExperimentStore>,
    tracking: Arc<dyn TrackingStore>,
    history: Arc<dyn HistoryStore>,
    rng: Arc<SharedRng>,
    clock: Arc<dyn Clock>,
    config: AllocationConfig,
    last_applied: DashMap<Uuid, Duration>,
}

impl AllocationOptimizer {
    pub fn new(
        experiments: Arc<dyn ExperimentStore>,
        tracking: Arc<dyn TrackingStore>,
        history: Arc<dyn HistoryStore>,
        rng: Arc<SharedRng>,
        clock: Arc<dyn Clock>,
        config: AllocationConfig,
    ) -> Self {
        Self {
            experiments,
            tracking,
            history,
            rng,
            clock,
            config,
            last_applied: DashMap::new(),
        }
    }

    /// Recompute and commit weights for one experiment. Returns Ok(None)
    /// when nothing was applied: fixed strategy, not running, inside the
    /// re-evaluation interval, or not enough accumulated data.
    pub fn reallocate(&self, experiment_id: Uuid) -> UpliftResult<Option<AllocationSnapshot>> {
        let versioned = self
            .experiments
            .get_experiment(experiment_id)?
            .ok_or_else(|| UpliftError::NotFound(format!("experiment {experiment_id}")))?;
        let experiment = versioned.value;

        if experiment.status != ExperimentStatus::Running
            || experiment.strategy == AllocationStrategy::Fixed
        {
            return Ok(None);
        }

        let now = self.clock.monotonic();
        let interval = Duration::from_secs(self.config.reeval_interval_secs);
        if let Some(last) = self.last_applied.get(&experiment_id) {
            if now.saturating_sub(*last) < interval {
                debug!(experiment_id = %experiment_id, "inside re-evaluation interval, skipping");
                return Ok(None);
            }
        }

        let rows = self.tracking.tracking_for_experiment(experiment_id)?;
        let by_variant: HashMap<Uuid, ArmStats> = rows
            .iter()
            .map(|row| {
                (
                    row.variant_id,
                    ArmStats {
                        impressions: row.impressions,
                        conversions: row.conversions,
                    },
                )
            })
            .collect();
        let arms: Vec<ArmStats> = experiment
            .variants
            .iter()
            .map(|variant| {
                by_variant.get(&variant.id).copied().unwrap_or(ArmStats {
                    impressions: 0,
                    conversions: 0,
                })
            })
            .collect();

        let total_impressions: u64 = arms.iter().map(|arm| arm.impressions).sum();
        if total_impressions < experiment.min_sample_size {
            debug!(
                experiment_id = %experiment_id,
                total_impressions,
                min_sample_size = experiment.min_sample_size,
                "not enough data to reallocate"
            );
            return Ok(None);
        }

        let current_weights: Vec<f64> = experiment.variants.iter().map(|v| v.weight).collect();
        let control_index = experiment
            .variants
            .iter()
            .position(|v| v.is_control)
            .unwrap_or(0);

        let mut proposed = match &experiment.strategy {
            AllocationStrategy::Dynamic => dynamic_weights(
                &arms,
                control_index,
                &current_weights,
                self.config.smoothing_factor,
            ),
            AllocationStrategy::Bandit(BanditAlgorithm::ThompsonSampling) => {
                self.rng.with(|rng| thompson_weights(&arms, rng))
            }
            AllocationStrategy::Bandit(BanditAlgorithm::Ucb1) => self
                .rng
                .with(|rng| ucb_weights(&arms, rng, self.config.exploration_factor)),
            AllocationStrategy::Bandit(BanditAlgorithm::EpsilonGreedy { epsilon }) => {
                epsilon_greedy_weights(&arms, *epsilon)
            }
            AllocationStrategy::Fixed => return Ok(None),
        };

        apply_floor(&mut proposed, self.config.min_weight_floor);
        normalize_weights(&mut proposed);

        let mut new_variants = experiment.variants.clone();
        for (variant, weight) in new_variants.iter_mut().zip(&proposed) {
            variant.weight = *weight;
        }
        validate_variant_set(&new_variants).map_err(|error| {
            UpliftError::Allocation(format!(
                "proposed weights for experiment {experiment_id} failed validation: {error}"
            ))
        })?;

        // Single atomic commit; a conflict means another writer moved the
        // experiment and this round is abandoned with weights untouched.
        self.experiments
            .put_variant_weights(experiment_id, new_variants.clone(), versioned.version)
            .map_err(|error| match error {
                UpliftError::Conflict(message) => {
                    UpliftError::Allocation(format!("weight commit conflicted: {message}"))
                }
                other => other,
            })?;

        let snapshot = AllocationSnapshot {
            experiment_id,
            strategy: experiment.strategy.clone(),
            weights: new_variants
                .iter()
                .map(|variant| VariantWeight {
                    variant_id: variant.id,
                    name: variant.name.clone(),
                    weight: variant.weight,
                })
                .collect(),
            recorded_at: self.clock.now(),
        };
        self.history.append_allocation(snapshot.clone())?;
        self.last_applied.insert(experiment_id, now);

        metrics::counter!("allocation.applied").increment(1);
        info!(
            experiment_id = %experiment_id,
            strategy = ?snapshot.strategy,
            "variant weights reallocated"
        );
        Ok(Some(snapshot))
    }
}
