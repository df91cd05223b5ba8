//! Persistence contract for the experimentation engine. The engine is a
//! stateless computation layer; everything authoritative (experiment
//! configuration, sticky assignments, tracking counters, allocation
//! history) lives behind these traits. `MemoryStore` is the concurrent
//! in-process implementation used by tests and the simulation binary.

pub mod memory;

pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use uplift_core::types::{
    AllocationSnapshot, Assignment, Experiment, ExperimentReport, ExperimentStatus, Variant,
    VariantTracking,
};
use uplift_core::UpliftResult;
use uuid::Uuid;

/// A value paired with the version token required to update it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterField {
    Impressions,
    Clicks,
    Conversions,
}

/// Versioned experiment configuration. All writes are compare-and-swap on
/// the version token so a reader never observes a half-written variant set.
pub trait ExperimentStore: Send + Sync {
    /// Insert a new experiment. Fails if the id already exists. Returns the
    /// initial version token.
    fn put_experiment(&self, experiment: Experiment) -> UpliftResult<u64>;

    fn get_experiment(&self, id: Uuid) -> UpliftResult<Option<Versioned<Experiment>>>;

    /// Replace the whole experiment record iff `expected_version` still
    /// matches. Returns the new version token.
    fn update_experiment(&self, experiment: Experiment, expected_version: u64)
        -> UpliftResult<u64>;

    /// Replace only the variant set (the allocation optimizer's commit
    /// path), CAS on `expected_version`.
    fn put_variant_weights(
        &self,
        experiment_id: Uuid,
        variants: Vec<Variant>,
        expected_version: u64,
    ) -> UpliftResult<u64>;

    fn list_by_status(&self, status: ExperimentStatus) -> UpliftResult<Vec<Experiment>>;
}

/// Sticky assignments. `get_or_create` must be atomic: under concurrent
/// first-time requests for the same (experiment, user) pair, exactly one
/// candidate wins and every caller observes the winner.
pub trait AssignmentStore: Send + Sync {
    fn get_assignment(&self, experiment_id: Uuid, user_id: &str)
        -> UpliftResult<Option<Assignment>>;

    fn get_or_create_assignment(&self, candidate: Assignment) -> UpliftResult<Assignment>;
}

/// Per-variant counters. Increments must be atomic; read-modify-write
/// through separate calls is not part of the contract.
pub trait TrackingStore: Send + Sync {
    fn seed_tracking(&self, experiment_id: Uuid, variant_ids: &[Uuid]) -> UpliftResult<()>;

    fn increment_counter(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        counter: CounterField,
        delta: u64,
    ) -> UpliftResult<()>;

    fn add_revenue(&self, experiment_id: Uuid, variant_id: Uuid, amount: f64) -> UpliftResult<()>;

    fn get_tracking(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
    ) -> UpliftResult<Option<VariantTracking>>;

    fn tracking_for_experiment(&self, experiment_id: Uuid) -> UpliftResult<Vec<VariantTracking>>;
}

/// Append-only audit records and final analysis reports.
pub trait HistoryStore: Send + Sync {
    fn append_allocation(&self, snapshot: AllocationSnapshot) -> UpliftResult<()>;

    fn allocation_history(&self, experiment_id: Uuid) -> UpliftResult<Vec<AllocationSnapshot>>;

    fn put_report(&self, report: ExperimentReport) -> UpliftResult<()>;

    fn get_report(&self, experiment_id: Uuid) -> UpliftResult<Option<ExperimentReport>>;
}
