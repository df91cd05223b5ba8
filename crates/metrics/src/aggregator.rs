//! Exposure/conversion aggregation against VariantTracking counters.
//! Callers deliver events at-least-once; a client-supplied event id is
//! de-duplicated here within a TTL window, so counter increments are
//! exactly-once from the caller's perspective. All increments go through
//! the store's atomic operations.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uplift_cache::TtlCache;
use uplift_core::config::{CacheConfig, DedupConfig};
use uplift_core::types::ExperimentStatus;
use uplift_core::{UpliftError, UpliftResult};
use uplift_store::{CounterField, ExperimentStore, TrackingStore};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventPayload {
    Impression { count: u64 },
    Click { count: u64 },
    Conversion { count: u64, revenue: Option<f64> },
    Revenue { amount: f64 },
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub experiment_id: Uuid,
    pub variant_id: Uuid,
    pub payload: EventPayload,
    /// Client-supplied idempotency key. Events without one are accepted
    /// as-is for callers that predate the key.
    pub event_id: Option<Uuid>,
}

pub struct MetricsAggregator {
    experiments: Arc<dyn ExperimentStore>,
    tracking: Arc<dyn TrackingStore>,
    status_cache: TtlCache<Uuid, ExperimentStatus>,
    seen_events: TtlCache<Uuid, ()>,
}

impl MetricsAggregator {
    pub fn new(
        experiments: Arc<dyn ExperimentStore>,
        tracking: Arc<dyn TrackingStore>,
        cache_config: &CacheConfig,
        dedup_config: &DedupConfig,
    ) -> Self {
        Self {
            experiments,
            tracking,
            status_cache: TtlCache::new(
                Duration::from_secs(cache_config.experiment_ttl_secs),
                cache_config.max_entries,
            ),
            seen_events: TtlCache::new(
                Duration::from_secs(dedup_config.ttl_secs),
                dedup_config.max_entries,
            ),
        }
    }

    pub fn record_exposure(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        event_id: Option<Uuid>,
    ) -> UpliftResult<bool> {
        self.record(EventRecord {
            experiment_id,
            variant_id,
            payload: EventPayload::Impression { count: 1 },
            event_id,
        })
    }

    pub fn record_click(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        event_id: Option<Uuid>,
    ) -> UpliftResult<bool> {
        self.record(EventRecord {
            experiment_id,
            variant_id,
            payload: EventPayload::Click { count: 1 },
            event_id,
        })
    }

    pub fn record_conversion(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        revenue: Option<f64>,
        event_id: Option<Uuid>,
    ) -> UpliftResult<bool> {
        self.record(EventRecord {
            experiment_id,
            variant_id,
            payload: EventPayload::Conversion { count: 1, revenue },
            event_id,
        })
    }

    /// Apply one event. Returns false when the event id was already seen
    /// inside the dedup window (the event is dropped, not an error).
    pub fn record(&self, event: EventRecord) -> UpliftResult<bool> {
        let status = self.experiment_status(event.experiment_id)?;
        if status != ExperimentStatus::Running {
            return Err(UpliftError::InvalidState(format!(
                "experiment {} is {:?}, events require a running experiment",
                event.experiment_id, status
            )));
        }

        if let Some(event_id) = event.event_id {
            if !self.seen_events.put_if_absent(event_id, ()) {
                debug!(
                    experiment_id = %event.experiment_id,
                    event_id = %event_id,
                    "duplicate event dropped"
                );
                metrics::counter!("events.duplicates_dropped").increment(1);
                return Ok(false);
            }
        }

        match event.payload {
            EventPayload::Impression { count } => self.tracking.increment_counter(
                event.experiment_id,
                event.variant_id,
                CounterField::Impressions,
                count,
            )?,
            EventPayload::Click { count } => self.tracking.increment_counter(
                event.experiment_id,
                event.variant_id,
                CounterField::Clicks,
                count,
            )?,
            EventPayload::Conversion { count, revenue } => {
                self.tracking.increment_counter(
                    event.experiment_id,
                    event.variant_id,
                    CounterField::Conversions,
                    count,
                )?;
                if let Some(amount) = revenue {
                    self.tracking
                        .add_revenue(event.experiment_id, event.variant_id, amount)?;
                }
            }
            EventPayload::Revenue { amount } => {
                self.tracking
                    .add_revenue(event.experiment_id, event.variant_id, amount)?;
            }
        }

        metrics::counter!("events.recorded").increment(1);
        Ok(true)
    }

    /// Drop the cached status for an experiment. Lifecycle transitions call
    /// this so a stopped experiment rejects events immediately.
    pub fn invalidate_status(&self, experiment_id: Uuid) {
        self.status_cache.invalidate(&experiment_id);
    }

    fn experiment_status(&self, experiment_id: Uuid) -> UpliftResult<ExperimentStatus> {
        if let Some(status) = self.status_cache.get(&experiment_id) {
            return Ok(status);
        }
        let status = self
            .experiments
            .get_experiment(experiment_id)?
            .ok_or_else(|| UpliftError::NotFound(format!("experiment {experiment_id}")))?
            .value
            .status;
        self.status_cache.put(experiment_id, status);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uplift_core::types::{
        AllocationStrategy, Experiment, ExperimentType, MetricKind, MetricSpec, Variant,
    };
    use uplift_store::MemoryStore;

    fn setup(status: ExperimentStatus) -> (MetricsAggregator, Arc<MemoryStore>, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let variant_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();
        let experiment = Experiment {
            id: Uuid::new_v4(),
            name: "pricing-page".to_string(),
            experiment_type: ExperimentType::SingleFactor,
            status,
            variants: vec![
                Variant {
                    id: variant_id,
                    name: "control".to_string(),
                    weight: 50.0,
                    is_control: true,
                    config: serde_json::Value::Null,
                },
                Variant {
                    id: other_id,
                    name: "treatment".to_string(),
                    weight: 50.0,
                    is_control: false,
                    config: serde_json::Value::Null,
                },
            ],
            metrics: vec![MetricSpec {
                id: "conversion".to_string(),
                kind: MetricKind::ConversionRate,
                is_primary: true,
            }],
            confidence_level: 0.95,
            min_sample_size: 100,
            strategy: AllocationStrategy::Fixed,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };
        let experiment_id = experiment.id;
        store.put_experiment(experiment).unwrap();
        store
            .seed_tracking(experiment_id, &[variant_id, other_id])
            .unwrap();

        let aggregator = MetricsAggregator::new(
            store.clone(),
            store.clone(),
            &CacheConfig::default(),
            &DedupConfig::default(),
        );
        (aggregator, store, experiment_id, variant_id)
    }

    #[test]
    fn test_counters_accumulate() {
        let (aggregator, store, experiment_id, variant_id) = setup(ExperimentStatus::Running);

        aggregator
            .record_exposure(experiment_id, variant_id, None)
            .unwrap();
        aggregator
            .record_click(experiment_id, variant_id, None)
            .unwrap();
        aggregator
            .record_conversion(experiment_id, variant_id, Some(24.50), None)
            .unwrap();

        let row = store.get_tracking(experiment_id, variant_id).unwrap().unwrap();
        assert_eq!(row.impressions, 1);
        assert_eq!(row.clicks, 1);
        assert_eq!(row.conversions, 1);
        assert!((row.revenue - 24.50).abs() < f64::EPSILON);
    }

    #[test]
    fn test_batched_counts_apply_delta() {
        let (aggregator, store, experiment_id, variant_id) = setup(ExperimentStatus::Running);

        aggregator
            .record(EventRecord {
                experiment_id,
                variant_id,
                payload: EventPayload::Impression { count: 250 },
                event_id: None,
            })
            .unwrap();

        let row = store.get_tracking(experiment_id, variant_id).unwrap().unwrap();
        assert_eq!(row.impressions, 250);
    }

    #[test]
    fn test_duplicate_event_id_is_dropped() {
        let (aggregator, store, experiment_id, variant_id) = setup(ExperimentStatus::Running);
        let event_id = Uuid::new_v4();

        assert!(aggregator
            .record_conversion(experiment_id, variant_id, Some(10.0), Some(event_id))
            .unwrap());
        // Redelivery of the same logical event.
        assert!(!aggregator
            .record_conversion(experiment_id, variant_id, Some(10.0), Some(event_id))
            .unwrap());

        let row = store.get_tracking(experiment_id, variant_id).unwrap().unwrap();
        assert_eq!(row.conversions, 1);
        assert!((row.revenue - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_events_rejected_unless_running() {
        let (aggregator, _, experiment_id, variant_id) = setup(ExperimentStatus::Planning);
        assert!(matches!(
            aggregator.record_exposure(experiment_id, variant_id, None),
            Err(UpliftError::InvalidState(_))
        ));
    }

    #[test]
    fn test_status_invalidation_takes_effect_immediately() {
        let (aggregator, store, experiment_id, variant_id) = setup(ExperimentStatus::Running);

        // Warm the status cache, then stop the experiment behind its back.
        aggregator
            .record_exposure(experiment_id, variant_id, None)
            .unwrap();
        let mut versioned = store.get_experiment(experiment_id).unwrap().unwrap();
        versioned.value.status = ExperimentStatus::Completed;
        store
            .update_experiment(versioned.value, versioned.version)
            .unwrap();
        aggregator.invalidate_status(experiment_id);

        assert!(matches!(
            aggregator.record_exposure(experiment_id, variant_id, None),
            Err(UpliftError::InvalidState(_))
        ));
    }
}
