//! Sticky variant assignment. A user's first request draws a variant from
//! the current weights; the draw and the sticky write resolve through the
//! store's atomic get-or-create so concurrent first requests for the same
//! user converge on one variant.

use std::sync::Arc;
use tracing::debug;
use uplift_core::types::{Assignment, ExperimentStatus, Variant};
use uplift_core::{Clock, SharedRng, UpliftError, UpliftResult};
use uplift_store::{AssignmentStore, ExperimentStore};
use uuid::Uuid;

pub struct AssignmentEngine {
    experiments: Arc<dyn ExperimentStore>,
    assignments: Arc<dyn AssignmentStore>,
    rng: Arc<SharedRng>,
    clock: Arc<dyn Clock>,
}

impl AssignmentEngine {
    pub fn new(
        experiments: Arc<dyn ExperimentStore>,
        assignments: Arc<dyn AssignmentStore>,
        rng: Arc<SharedRng>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            experiments,
            assignments,
            rng,
            clock,
        }
    }

    /// Return the user's variant for this experiment, drawing and persisting
    /// one on first contact. Idempotent: repeated calls return the same
    /// variant for the lifetime of the experiment.
    pub fn assign(&self, experiment_id: Uuid, user_id: &str) -> UpliftResult<Uuid> {
        if let Some(existing) = self.assignments.get_assignment(experiment_id, user_id)? {
            return Ok(existing.variant_id);
        }

        let experiment = self
            .experiments
            .get_experiment(experiment_id)?
            .ok_or_else(|| UpliftError::NotFound(format!("experiment {experiment_id}")))?
            .value;
        if experiment.status != ExperimentStatus::Running {
            return Err(UpliftError::InvalidState(format!(
                "experiment {} is {:?}, assignment requires a running experiment",
                experiment_id, experiment.status
            )));
        }

        let candidate = draw_variant(&experiment.variants, self.rng.uniform()).ok_or_else(|| {
            UpliftError::Validation(format!("experiment {experiment_id} has no variants"))
        })?;

        let winner = self.assignments.get_or_create_assignment(Assignment {
            experiment_id,
            user_id: user_id.to_string(),
            variant_id: candidate,
            assigned_at: self.clock.now(),
        })?;

        if winner.variant_id != candidate {
            debug!(
                experiment_id = %experiment_id,
                user_id = %user_id,
                "lost assignment race, returning persisted variant"
            );
        }
        metrics::counter!("assignment.drawn").increment(1);
        Ok(winner.variant_id)
    }
}

/// Cumulative-weight draw over variants in stored order: the first variant
/// whose cumulative weight/100 exceeds `u` wins. Numeric drift that leaves
/// no match falls back to the last variant.
pub(crate) fn draw_variant(variants: &[Variant], u: f64) -> Option<Uuid> {
    let mut cumulative = 0.0;
    for variant in variants {
        cumulative += variant.weight / 100.0;
        if u < cumulative {
            return Some(variant.id);
        }
    }
    variants.last().map(|v| v.id)
}
