//! Experiment lifecycle: planning -> running -> completed. Configuration
//! errors fail fast at create time; transitions from the wrong state are
//! rejected rather than coerced.

use std::sync::Arc;
use tracing::info;
use uplift_core::config::ExperimentConfig;
use uplift_core::types::{
    Experiment, ExperimentDefinition, ExperimentReport, ExperimentStatus,
};
use uplift_core::validate::{ensure_single_control, validate_variant_set};
use uplift_core::{Clock, UpliftError, UpliftResult};
use uplift_stats::ExperimentAnalyzer;
use uplift_store::{ExperimentStore, HistoryStore, TrackingStore};
use uuid::Uuid;

pub struct LifecycleManager {
    experiments: Arc<dyn ExperimentStore>,
    tracking: Arc<dyn TrackingStore>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    config: ExperimentConfig,
}

impl LifecycleManager {
    pub fn new(
        experiments: Arc<dyn ExperimentStore>,
        tracking: Arc<dyn TrackingStore>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
        config: ExperimentConfig,
    ) -> Self {
        Self {
            experiments,
            tracking,
            history,
            clock,
            config,
        }
    }

    /// Validate and persist a new experiment in `planning`.
    pub fn create_experiment(&self, definition: ExperimentDefinition) -> UpliftResult<Experiment> {
        if definition.min_sample_size < self.config.min_sample_size {
            return Err(UpliftError::Validation(format!(
                "minimum sample size {} is below the configured floor of {}",
                definition.min_sample_size, self.config.min_sample_size
            )));
        }
        if definition.metrics.is_empty() {
            return Err(UpliftError::Validation(
                "experiment requires at least one metric".to_string(),
            ));
        }

        let mut variants = definition.variants;
        validate_variant_set(&variants)?;
        ensure_single_control(&mut variants)?;

        let experiment = Experiment {
            id: Uuid::new_v4(),
            name: definition.name,
            experiment_type: definition.experiment_type,
            status: ExperimentStatus::Planning,
            variants,
            metrics: definition.metrics,
            confidence_level: definition.confidence_level,
            min_sample_size: definition.min_sample_size,
            strategy: definition.strategy,
            created_at: self.clock.now(),
            started_at: None,
            ended_at: None,
        };
        self.experiments.put_experiment(experiment.clone())?;

        info!(
            experiment_id = %experiment.id,
            name = %experiment.name,
            variants = experiment.variants.len(),
            "experiment created"
        );
        Ok(experiment)
    }

    /// Transition planning -> running: seed zeroed tracking rows and stamp
    /// the actual start time.
    pub fn start_experiment(&self, experiment_id: Uuid) -> UpliftResult<Experiment> {
        let versioned = self
            .experiments
            .get_experiment(experiment_id)?
            .ok_or_else(|| UpliftError::NotFound(format!("experiment {experiment_id}")))?;
        let mut experiment = versioned.value;

        if experiment.status != ExperimentStatus::Planning {
            return Err(UpliftError::InvalidState(format!(
                "cannot start experiment {} from {:?}",
                experiment_id, experiment.status
            )));
        }

        let variant_ids: Vec<Uuid> = experiment.variants.iter().map(|v| v.id).collect();
        self.tracking.seed_tracking(experiment_id, &variant_ids)?;

        experiment.status = ExperimentStatus::Running;
        experiment.started_at = Some(self.clock.now());
        self.experiments
            .update_experiment(experiment.clone(), versioned.version)?;

        info!(experiment_id = %experiment_id, "experiment started");
        Ok(experiment)
    }

    /// Transition running -> completed: run the final analysis, persist the
    /// report, and freeze tracking/assignments as history.
    pub fn stop_experiment(&self, experiment_id: Uuid) -> UpliftResult<ExperimentReport> {
        let versioned = self
            .experiments
            .get_experiment(experiment_id)?
            .ok_or_else(|| UpliftError::NotFound(format!("experiment {experiment_id}")))?;
        let mut experiment = versioned.value;

        if experiment.status != ExperimentStatus::Running {
            return Err(UpliftError::InvalidState(format!(
                "cannot stop experiment {} from {:?}",
                experiment_id, experiment.status
            )));
        }

        let rows = self.tracking.tracking_for_experiment(experiment_id)?;
        let report = ExperimentAnalyzer::analyze(&experiment, &rows, self.clock.now())?;

        experiment.status = ExperimentStatus::Completed;
        experiment.ended_at = Some(self.clock.now());
        self.experiments
            .update_experiment(experiment, versioned.version)?;
        self.history.put_report(report.clone())?;

        info!(
            experiment_id = %experiment_id,
            winner = ?report.winner,
            total_samples = report.total_samples,
            "experiment stopped"
        );
        Ok(report)
    }

    pub fn active_experiments(&self) -> UpliftResult<Vec<Experiment>> {
        self.experiments.list_by_status(ExperimentStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplift_core::types::{
        AllocationStrategy, ExperimentType, MetricKind, MetricSpec, Variant,
    };
    use uplift_core::SystemClock;
    use uplift_store::{CounterField, MemoryStore};

    fn manager() -> (LifecycleManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = LifecycleManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(SystemClock::new()),
            ExperimentConfig::default(),
        );
        (manager, store)
    }

    fn definition(weights: &[f64], min_sample_size: u64) -> ExperimentDefinition {
        ExperimentDefinition {
            name: "onboarding-flow".to_string(),
            experiment_type: ExperimentType::SingleFactor,
            variants: weights
                .iter()
                .enumerate()
                .map(|(index, weight)| Variant {
                    id: Uuid::new_v4(),
                    name: format!("variant-{index}"),
                    weight: *weight,
                    is_control: false,
                    config: serde_json::Value::Null,
                })
                .collect(),
            metrics: vec![MetricSpec {
                id: "conversion".to_string(),
                kind: MetricKind::ConversionRate,
                is_primary: true,
            }],
            confidence_level: 0.95,
            min_sample_size,
            strategy: AllocationStrategy::Fixed,
        }
    }

    #[test]
    fn test_create_starts_in_planning_with_control() {
        let (manager, _) = manager();
        let experiment = manager
            .create_experiment(definition(&[50.0, 50.0], 100))
            .unwrap();
        assert_eq!(experiment.status, ExperimentStatus::Planning);
        assert!(experiment.variants[0].is_control);
        assert!(experiment.started_at.is_none());
    }

    #[test]
    fn test_create_rejects_bad_weight_sum() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.create_experiment(definition(&[50.0, 40.0], 100)),
            Err(UpliftError::Validation(_))
        ));
    }

    #[test]
    fn test_create_rejects_single_variant() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.create_experiment(definition(&[100.0], 100)),
            Err(UpliftError::Validation(_))
        ));
    }

    #[test]
    fn test_create_rejects_small_sample_size() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.create_experiment(definition(&[50.0, 50.0], 50)),
            Err(UpliftError::Validation(_))
        ));
    }

    #[test]
    fn test_start_seeds_tracking_and_stamps_time() {
        let (manager, store) = manager();
        let experiment = manager
            .create_experiment(definition(&[50.0, 50.0], 100))
            .unwrap();

        let started = manager.start_experiment(experiment.id).unwrap();
        assert_eq!(started.status, ExperimentStatus::Running);
        assert!(started.started_at.is_some());

        let rows = store.tracking_for_experiment(experiment.id).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.impressions == 0));
    }

    #[test]
    fn test_start_twice_is_invalid_state() {
        let (manager, _) = manager();
        let experiment = manager
            .create_experiment(definition(&[50.0, 50.0], 100))
            .unwrap();
        manager.start_experiment(experiment.id).unwrap();
        assert!(matches!(
            manager.start_experiment(experiment.id),
            Err(UpliftError::InvalidState(_))
        ));
    }

    #[test]
    fn test_stop_from_planning_is_invalid_state() {
        let (manager, _) = manager();
        let experiment = manager
            .create_experiment(definition(&[50.0, 50.0], 100))
            .unwrap();
        assert!(matches!(
            manager.stop_experiment(experiment.id),
            Err(UpliftError::InvalidState(_))
        ));
    }

    #[test]
    fn test_stop_persists_report_and_completes() {
        let (manager, store) = manager();
        let experiment = manager
            .create_experiment(definition(&[50.0, 50.0], 100))
            .unwrap();
        manager.start_experiment(experiment.id).unwrap();

        for variant in &experiment.variants {
            store
                .increment_counter(experiment.id, variant.id, CounterField::Impressions, 1000)
                .unwrap();
            store
                .increment_counter(
                    experiment.id,
                    variant.id,
                    CounterField::Conversions,
                    if variant.is_control { 100 } else { 150 },
                )
                .unwrap();
        }

        let report = manager.stop_experiment(experiment.id).unwrap();
        assert!(report.winner.is_some());

        let stored = store.get_experiment(experiment.id).unwrap().unwrap();
        assert_eq!(stored.value.status, ExperimentStatus::Completed);
        assert!(stored.value.ended_at.is_some());
        assert!(store.get_report(experiment.id).unwrap().is_some());
    }

    #[test]
    fn test_stop_without_any_data_errors_and_stays_running() {
        let (manager, store) = manager();
        let experiment = manager
            .create_experiment(definition(&[50.0, 50.0], 100))
            .unwrap();
        manager.start_experiment(experiment.id).unwrap();

        assert!(matches!(
            manager.stop_experiment(experiment.id),
            Err(UpliftError::InsufficientData(_))
        ));
        let stored = store.get_experiment(experiment.id).unwrap().unwrap();
        assert_eq!(stored.value.status, ExperimentStatus::Running);
    }
}
