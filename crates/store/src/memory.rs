//! In-memory store built on DashMap. Counter updates and assignment
//! creation go through the entry API, which holds the shard write lock for
//! the duration of the mutation, so increments are never lost and
//! get-or-create resolves races to a single winner.

use crate::{AssignmentStore, CounterField, ExperimentStore, HistoryStore, TrackingStore, Versioned};
use dashmap::DashMap;
use uplift_core::types::{
    AllocationSnapshot, Assignment, Experiment, ExperimentReport, ExperimentStatus, Variant,
    VariantTracking,
};
use uplift_core::{UpliftError, UpliftResult};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    experiments: DashMap<Uuid, Versioned<Experiment>>,
    assignments: DashMap<(Uuid, String), Assignment>,
    tracking: DashMap<(Uuid, Uuid), VariantTracking>,
    history: DashMap<Uuid, Vec<AllocationSnapshot>>,
    reports: DashMap<Uuid, ExperimentReport>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExperimentStore for MemoryStore {
    fn put_experiment(&self, experiment: Experiment) -> UpliftResult<u64> {
        match self.experiments.entry(experiment.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(UpliftError::Conflict(format!(
                "experiment {} already exists",
                experiment.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Versioned {
                    value: experiment,
                    version: 1,
                });
                Ok(1)
            }
        }
    }

    fn get_experiment(&self, id: Uuid) -> UpliftResult<Option<Versioned<Experiment>>> {
        Ok(self.experiments.get(&id).map(|entry| entry.value().clone()))
    }

    fn update_experiment(
        &self,
        experiment: Experiment,
        expected_version: u64,
    ) -> UpliftResult<u64> {
        let mut entry = self
            .experiments
            .get_mut(&experiment.id)
            .ok_or_else(|| UpliftError::NotFound(format!("experiment {}", experiment.id)))?;
        if entry.version != expected_version {
            return Err(UpliftError::Conflict(format!(
                "experiment {} is at version {}, caller expected {}",
                experiment.id, entry.version, expected_version
            )));
        }
        entry.value = experiment;
        entry.version += 1;
        Ok(entry.version)
    }

    fn put_variant_weights(
        &self,
        experiment_id: Uuid,
        variants: Vec<Variant>,
        expected_version: u64,
    ) -> UpliftResult<u64> {
        let mut entry = self
            .experiments
            .get_mut(&experiment_id)
            .ok_or_else(|| UpliftError::NotFound(format!("experiment {experiment_id}")))?;
        if entry.version != expected_version {
            return Err(UpliftError::Conflict(format!(
                "experiment {} is at version {}, caller expected {}",
                experiment_id, entry.version, expected_version
            )));
        }
        entry.value.variants = variants;
        entry.version += 1;
        Ok(entry.version)
    }

    fn list_by_status(&self, status: ExperimentStatus) -> UpliftResult<Vec<Experiment>> {
        Ok(self
            .experiments
            .iter()
            .filter(|entry| entry.value().value.status == status)
            .map(|entry| entry.value().value.clone())
            .collect())
    }
}

impl AssignmentStore for MemoryStore {
    fn get_assignment(
        &self,
        experiment_id: Uuid,
        user_id: &str,
    ) -> UpliftResult<Option<Assignment>> {
        Ok(self
            .assignments
            .get(&(experiment_id, user_id.to_string()))
            .map(|entry| entry.value().clone()))
    }

    fn get_or_create_assignment(&self, candidate: Assignment) -> UpliftResult<Assignment> {
        let key = (candidate.experiment_id, candidate.user_id.clone());
        let winner = self.assignments.entry(key).or_insert(candidate);
        Ok(winner.clone())
    }
}

impl TrackingStore for MemoryStore {
    fn seed_tracking(&self, experiment_id: Uuid, variant_ids: &[Uuid]) -> UpliftResult<()> {
        for &variant_id in variant_ids {
            self.tracking
                .entry((experiment_id, variant_id))
                .or_insert_with(|| VariantTracking::zeroed(experiment_id, variant_id));
        }
        Ok(())
    }

    fn increment_counter(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        counter: CounterField,
        delta: u64,
    ) -> UpliftResult<()> {
        let mut row = self
            .tracking
            .entry((experiment_id, variant_id))
            .or_insert_with(|| VariantTracking::zeroed(experiment_id, variant_id));
        match counter {
            CounterField::Impressions => row.impressions += delta,
            CounterField::Clicks => row.clicks += delta,
            CounterField::Conversions => row.conversions += delta,
        }
        Ok(())
    }

    fn add_revenue(&self, experiment_id: Uuid, variant_id: Uuid, amount: f64) -> UpliftResult<()> {
        let mut row = self
            .tracking
            .entry((experiment_id, variant_id))
            .or_insert_with(|| VariantTracking::zeroed(experiment_id, variant_id));
        row.revenue += amount;
        Ok(())
    }

    fn get_tracking(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
    ) -> UpliftResult<Option<VariantTracking>> {
        Ok(self
            .tracking
            .get(&(experiment_id, variant_id))
            .map(|entry| entry.value().clone()))
    }

    fn tracking_for_experiment(&self, experiment_id: Uuid) -> UpliftResult<Vec<VariantTracking>> {
        Ok(self
            .tracking
            .iter()
            .filter(|entry| entry.key().0 == experiment_id)
            .map(|entry| entry.value().clone())
            .collect())
    }
}

impl HistoryStore for MemoryStore {
    fn append_allocation(&self, snapshot: AllocationSnapshot) -> UpliftResult<()> {
        self.history
            .entry(snapshot.experiment_id)
            .or_default()
            .push(snapshot);
        Ok(())
    }

    fn allocation_history(&self, experiment_id: Uuid) -> UpliftResult<Vec<AllocationSnapshot>> {
        Ok(self
            .history
            .get(&experiment_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn put_report(&self, report: ExperimentReport) -> UpliftResult<()> {
        self.reports.insert(report.experiment_id, report);
        Ok(())
    }

    fn get_report(&self, experiment_id: Uuid) -> UpliftResult<Option<ExperimentReport>> {
        Ok(self
            .reports
            .get(&experiment_id)
            .map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use uplift_core::types::{AllocationStrategy, ExperimentType, MetricKind, MetricSpec};

    fn experiment() -> Experiment {
        let make_variant = |name: &str, is_control: bool| Variant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            weight: 50.0,
            is_control,
            config: serde_json::Value::Null,
        };
        Experiment {
            id: Uuid::new_v4(),
            name: "checkout-cta".to_string(),
            experiment_type: ExperimentType::SingleFactor,
            status: ExperimentStatus::Planning,
            variants: vec![make_variant("control", true), make_variant("treatment", false)],
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
        }
    }

    #[test]
    fn test_put_then_get_round_trips_with_version() {
        let store = MemoryStore::new();
        let exp = experiment();
        let id = exp.id;
        let version = store.put_experiment(exp).unwrap();
        assert_eq!(version, 1);

        let fetched = store.get_experiment(id).unwrap().unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.value.name, "checkout-cta");
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let store = MemoryStore::new();
        let exp = experiment();
        let id = exp.id;
        store.put_experiment(exp.clone()).unwrap();

        let fetched = store.get_experiment(id).unwrap().unwrap();
        store
            .put_variant_weights(id, fetched.value.variants.clone(), fetched.version)
            .unwrap();

        // Second writer still holds version 1.
        let stale = store.put_variant_weights(id, fetched.value.variants, fetched.version);
        assert!(matches!(stale, Err(UpliftError::Conflict(_))));
    }

    #[test]
    fn test_get_or_create_is_sticky() {
        let store = MemoryStore::new();
        let experiment_id = Uuid::new_v4();
        let first = Assignment {
            experiment_id,
            user_id: "user-1".to_string(),
            variant_id: Uuid::new_v4(),
            assigned_at: Utc::now(),
        };
        let second = Assignment {
            variant_id: Uuid::new_v4(),
            ..first.clone()
        };

        let won = store.get_or_create_assignment(first.clone()).unwrap();
        let replay = store.get_or_create_assignment(second).unwrap();
        assert_eq!(won.variant_id, first.variant_id);
        assert_eq!(replay.variant_id, first.variant_id);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let experiment_id = Uuid::new_v4();
        let variant_id = Uuid::new_v4();
        store.seed_tracking(experiment_id, &[variant_id]).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store
                            .increment_counter(
                                experiment_id,
                                variant_id,
                                CounterField::Impressions,
                                1,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let row = store.get_tracking(experiment_id, variant_id).unwrap().unwrap();
        assert_eq!(row.impressions, 8000);
    }

    #[test]
    fn test_allocation_history_appends_in_order() {
        let store = MemoryStore::new();
        let experiment_id = Uuid::new_v4();
        for _ in 0..3 {
            store
                .append_allocation(AllocationSnapshot {
                    experiment_id,
                    strategy: AllocationStrategy::Dynamic,
                    weights: vec![],
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }
        assert_eq!(store.allocation_history(experiment_id).unwrap().len(), 3);
    }
}
