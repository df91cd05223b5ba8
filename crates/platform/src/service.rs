//! `ExperimentService` is the surface consumed by feature systems: create,
//! start and stop experiments, assign users, record events by metric id,
//! and read results. It owns the component wiring and a short-TTL
//! experiment cache with explicit invalidation on every lifecycle
//! transition.

use crate::lifecycle::LifecycleManager;
use std::sync::Arc;
use std::time::Duration;
use uplift_allocation::{AllocationOptimizer, AllocationScheduler};
use uplift_assignment::AssignmentEngine;
use uplift_cache::TtlCache;
use uplift_core::types::{
    AllocationSnapshot, Experiment, ExperimentDefinition, ExperimentReport, ExperimentStatus,
    MetricKind,
};
use uplift_core::{Clock, SharedRng, UpliftConfig, UpliftError, UpliftResult};
use uplift_metrics::{EventPayload, EventRecord, MetricsAggregator};
use uplift_stats::ExperimentAnalyzer;
use uplift_store::{AssignmentStore, ExperimentStore, HistoryStore, TrackingStore};
use uuid::Uuid;

pub struct ExperimentService {
    lifecycle: LifecycleManager,
    assignment: AssignmentEngine,
    aggregator: MetricsAggregator,
    optimizer: Arc<AllocationOptimizer>,
    experiments: Arc<dyn ExperimentStore>,
    assignments: Arc<dyn AssignmentStore>,
    tracking: Arc<dyn TrackingStore>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    experiment_cache: TtlCache<Uuid, Experiment>,
    tick_interval: Duration,
}

impl ExperimentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        experiments: Arc<dyn ExperimentStore>,
        assignments: Arc<dyn AssignmentStore>,
        tracking: Arc<dyn TrackingStore>,
        history: Arc<dyn HistoryStore>,
        rng: Arc<SharedRng>,
        clock: Arc<dyn Clock>,
        config: &UpliftConfig,
    ) -> Self {
        let lifecycle = LifecycleManager::new(
            experiments.clone(),
            tracking.clone(),
            history.clone(),
            clock.clone(),
            config.experiment.clone(),
        );
        let assignment = AssignmentEngine::new(
            experiments.clone(),
            assignments.clone(),
            rng.clone(),
            clock.clone(),
        );
        let aggregator = MetricsAggregator::new(
            experiments.clone(),
            tracking.clone(),
            &config.cache,
            &config.dedup,
        );
        let optimizer = Arc::new(AllocationOptimizer::new(
            experiments.clone(),
            tracking.clone(),
            history.clone(),
            rng,
            clock.clone(),
            config.allocation.clone(),
        ));

        Self {
            lifecycle,
            assignment,
            aggregator,
            optimizer,
            experiments,
            assignments,
            tracking,
            history,
            clock,
            experiment_cache: TtlCache::new(
                Duration::from_secs(config.cache.experiment_ttl_secs),
                config.cache.max_entries,
            ),
            tick_interval: Duration::from_secs(config.allocation.tick_interval_secs),
        }
    }

    pub fn create_experiment(&self, definition: ExperimentDefinition) -> UpliftResult<Experiment> {
        self.lifecycle.create_experiment(definition)
    }

    pub fn start_experiment(&self, experiment_id: Uuid) -> UpliftResult<Experiment> {
        let experiment = self.lifecycle.start_experiment(experiment_id)?;
        self.invalidate(experiment_id);
        Ok(experiment)
    }

    pub fn stop_experiment(&self, experiment_id: Uuid) -> UpliftResult<ExperimentReport> {
        let report = self.lifecycle.stop_experiment(experiment_id)?;
        self.invalidate(experiment_id);
        Ok(report)
    }

    /// Sticky variant assignment for a user.
    pub fn assign(&self, experiment_id: Uuid, user_id: &str) -> UpliftResult<Uuid> {
        self.assignment.assign(experiment_id, user_id)
    }

    /// Record that the user saw their assigned variant.
    pub fn record_exposure(
        &self,
        experiment_id: Uuid,
        user_id: &str,
        event_id: Option<Uuid>,
    ) -> UpliftResult<bool> {
        let variant_id = self.assigned_variant(experiment_id, user_id)?;
        self.aggregator
            .record_exposure(experiment_id, variant_id, event_id)
    }

    /// Record a metric event against the user's assigned variant. The
    /// metric's kind decides how `value` lands on the counters.
    pub fn record_event(
        &self,
        experiment_id: Uuid,
        user_id: &str,
        metric_id: &str,
        value: f64,
        event_id: Option<Uuid>,
    ) -> UpliftResult<bool> {
        let variant_id = self.assigned_variant(experiment_id, user_id)?;
        let experiment = self.cached_experiment(experiment_id)?;
        let metric = experiment
            .metrics
            .iter()
            .find(|m| m.id == metric_id)
            .ok_or_else(|| {
                UpliftError::NotFound(format!(
                    "metric '{metric_id}' on experiment {experiment_id}"
                ))
            })?;

        let payload = match metric.kind {
            MetricKind::ConversionRate => EventPayload::Conversion {
                count: 1,
                revenue: (value > 0.0).then_some(value),
            },
            MetricKind::ClickRate => EventPayload::Click { count: 1 },
            MetricKind::AverageOrderValue => EventPayload::Conversion {
                count: 1,
                revenue: Some(value),
            },
            MetricKind::RevenuePerImpression => EventPayload::Revenue { amount: value },
        };

        self.aggregator.record(EventRecord {
            experiment_id,
            variant_id,
            payload,
            event_id,
        })
    }

    /// Analysis for an experiment: the persisted report once completed, a
    /// live interim report while running.
    pub fn get_result(&self, experiment_id: Uuid) -> UpliftResult<ExperimentReport> {
        let experiment = self.cached_experiment(experiment_id)?;
        match experiment.status {
            ExperimentStatus::Completed => {
                if let Some(report) = self.history.get_report(experiment_id)? {
                    return Ok(report);
                }
                let rows = self.tracking.tracking_for_experiment(experiment_id)?;
                ExperimentAnalyzer::analyze(&experiment, &rows, self.clock.now())
            }
            ExperimentStatus::Running => {
                let rows = self.tracking.tracking_for_experiment(experiment_id)?;
                ExperimentAnalyzer::analyze(&experiment, &rows, self.clock.now())
            }
            ExperimentStatus::Planning => Err(UpliftError::InsufficientData(format!(
                "experiment {experiment_id} has not started"
            ))),
        }
    }

    pub fn active_experiments(&self) -> UpliftResult<Vec<Experiment>> {
        self.lifecycle.active_experiments()
    }

    pub fn allocation_history(&self, experiment_id: Uuid) -> UpliftResult<Vec<AllocationSnapshot>> {
        self.history.allocation_history(experiment_id)
    }

    pub fn optimizer(&self) -> Arc<AllocationOptimizer> {
        self.optimizer.clone()
    }

    /// Spawn the background reallocation sweep. Must be called from within
    /// a Tokio runtime.
    pub fn spawn_scheduler(&self) -> AllocationScheduler {
        AllocationScheduler::spawn(
            self.optimizer.clone(),
            self.experiments.clone(),
            self.tick_interval,
        )
    }

    fn assigned_variant(&self, experiment_id: Uuid, user_id: &str) -> UpliftResult<Uuid> {
        self.assignments
            .get_assignment(experiment_id, user_id)?
            .map(|assignment| assignment.variant_id)
            .ok_or_else(|| {
                UpliftError::NotFound(format!(
                    "no assignment for user '{user_id}' on experiment {experiment_id}"
                ))
            })
    }

    fn cached_experiment(&self, experiment_id: Uuid) -> UpliftResult<Experiment> {
        if let Some(experiment) = self.experiment_cache.get(&experiment_id) {
            return Ok(experiment);
        }
        let experiment = self
            .experiments
            .get_experiment(experiment_id)?
            .ok_or_else(|| UpliftError::NotFound(format!("experiment {experiment_id}")))?
            .value;
        self.experiment_cache.put(experiment_id, experiment.clone());
        Ok(experiment)
    }

    fn invalidate(&self, experiment_id: Uuid) {
        self.experiment_cache.invalidate(&experiment_id);
        self.aggregator.invalidate_status(experiment_id);
    }
}
