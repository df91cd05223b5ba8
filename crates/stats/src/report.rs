//! Experiment analysis: runs the per-metric tests for every non-control
//! variant against the control arm, computes lifts, and picks a winner.

use crate::significance::{
    lift_pct, two_proportion_chi_square, two_sample_continuous, BinaryArm, ContinuousArm,
    TestOutcome,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;
use uplift_core::types::{
    Experiment, ExperimentReport, MetricKind, MetricOutcome, VariantTracking,
};
use uplift_core::{UpliftError, UpliftResult};
use uuid::Uuid;

pub struct ExperimentAnalyzer;

impl ExperimentAnalyzer {
    /// Build a report from the current tracking rows. Degenerate metric
    /// inputs degrade to non-significant outcomes; an experiment with no
    /// recorded data at all is an error.
    pub fn analyze(
        experiment: &Experiment,
        tracking: &[VariantTracking],
        computed_at: DateTime<Utc>,
    ) -> UpliftResult<ExperimentReport> {
        if tracking.len() < 2 {
            return Err(UpliftError::InsufficientData(format!(
                "experiment {} has {} tracked variants, need at least 2",
                experiment.id,
                tracking.len()
            )));
        }

        if tracking.iter().any(|row| !row.revenue.is_finite()) {
            return Err(UpliftError::Statistical(format!(
                "experiment {} has a non-finite revenue accumulator",
                experiment.id
            )));
        }

        let by_variant: HashMap<Uuid, &VariantTracking> =
            tracking.iter().map(|row| (row.variant_id, row)).collect();

        let total_samples: u64 = tracking.iter().map(|row| row.impressions).sum();
        if total_samples == 0 {
            return Err(UpliftError::InsufficientData(format!(
                "experiment {} has no recorded exposures",
                experiment.id
            )));
        }

        let control = experiment.control().ok_or_else(|| {
            UpliftError::Validation(format!("experiment {} has no control variant", experiment.id))
        })?;
        let control_row = by_variant.get(&control.id).ok_or_else(|| {
            UpliftError::InsufficientData(format!(
                "control variant {} has no tracking row",
                control.id
            ))
        })?;

        let mut outcomes = Vec::new();
        for metric in &experiment.metrics {
            for variant in experiment.variants.iter().filter(|v| !v.is_control) {
                let Some(row) = by_variant.get(&variant.id) else {
                    continue;
                };
                let test = run_test(metric.kind, control_row, row);
                let observed = row.metric_value(metric.kind);
                let control_value = control_row.metric_value(metric.kind);
                outcomes.push(MetricOutcome {
                    metric_id: metric.id.clone(),
                    variant_id: variant.id,
                    variant_name: variant.name.clone(),
                    observed,
                    control_value,
                    lift_pct: lift_pct(control_value, observed),
                    confidence: test.confidence,
                    significant: test.significant,
                });
            }
        }

        let primary_ids: Vec<&str> = experiment
            .primary_metrics()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        let winner = pick_winner(&outcomes, &primary_ids);

        let recommendation = match winner {
            Some(winner_id) => {
                let name = experiment
                    .variant(winner_id)
                    .map(|v| v.name.as_str())
                    .unwrap_or("unknown");
                format!("Variant '{name}' shows a statistically significant improvement over control; roll it out to full traffic.")
            }
            None if total_samples < experiment.min_sample_size => format!(
                "Keep the experiment running: {total_samples} of {} minimum samples collected.",
                experiment.min_sample_size
            ),
            None => {
                "No variant significantly outperforms control; keep the control experience."
                    .to_string()
            }
        };

        debug!(
            experiment_id = %experiment.id,
            winner = ?winner,
            total_samples,
            "analysis computed"
        );

        Ok(ExperimentReport {
            experiment_id: experiment.id,
            winner,
            recommendation,
            outcomes,
            total_samples,
            computed_at,
        })
    }
}

fn run_test(kind: MetricKind, control: &VariantTracking, treatment: &VariantTracking) -> TestOutcome {
    match kind {
        MetricKind::ConversionRate => two_proportion_chi_square(
            BinaryArm {
                successes: control.conversions,
                trials: control.impressions,
            },
            BinaryArm {
                successes: treatment.conversions,
                trials: treatment.impressions,
            },
        ),
        MetricKind::ClickRate => two_proportion_chi_square(
            BinaryArm {
                successes: control.clicks,
                trials: control.impressions,
            },
            BinaryArm {
                successes: treatment.clicks,
                trials: treatment.impressions,
            },
        ),
        MetricKind::AverageOrderValue => two_sample_continuous(
            ContinuousArm {
                total: control.revenue,
                samples: control.conversions,
            },
            ContinuousArm {
                total: treatment.revenue,
                samples: treatment.conversions,
            },
        ),
        MetricKind::RevenuePerImpression => two_sample_continuous(
            ContinuousArm {
                total: control.revenue,
                samples: control.impressions,
            },
            ContinuousArm {
                total: treatment.revenue,
                samples: treatment.impressions,
            },
        ),
    }
}

/// Winner: the non-control variant with the highest sum of significant
/// positive lifts across the primary metrics. No significant positive lift
/// anywhere means control stands (None).
fn pick_winner(outcomes: &[MetricOutcome], primary_metric_ids: &[&str]) -> Option<Uuid> {
    let mut scores: HashMap<Uuid, f64> = HashMap::new();
    for outcome in outcomes {
        if primary_metric_ids.contains(&outcome.metric_id.as_str())
            && outcome.significant
            && outcome.lift_pct > 0.0
        {
            *scores.entry(outcome.variant_id).or_insert(0.0) += outcome.lift_pct;
        }
    }
    scores
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(variant_id, _)| variant_id)
}
