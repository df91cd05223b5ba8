use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    SingleFactor,
    Multivariate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Planning,
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum BanditAlgorithm {
    #[default]
    ThompsonSampling,
    Ucb1,
    EpsilonGreedy {
        epsilon: f64,
    },
}

/// How traffic is split across variants over the experiment's lifetime.
/// `Fixed` keeps the configured weights; `Dynamic` reweights by smoothed
/// performance; `Bandit` delegates to a multi-armed bandit algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    Fixed,
    Dynamic,
    Bandit(BanditAlgorithm),
}

/// One arm of an experiment. `weight` is a traffic percentage in [0, 100];
/// the weights of all variants in an experiment sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub is_control: bool,
    /// Opaque payload delivered to the consuming system (creative id,
    /// feature config, price point, ...).
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    ConversionRate,
    ClickRate,
    AverageOrderValue,
    RevenuePerImpression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    pub id: String,
    pub kind: MetricKind,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    pub experiment_type: ExperimentType,
    pub status: ExperimentStatus,
    pub variants: Vec<Variant>,
    pub metrics: Vec<MetricSpec>,
    pub confidence_level: f64,
    pub min_sample_size: u64,
    pub strategy: AllocationStrategy,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Experiment {
    pub fn control(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_control)
    }

    pub fn variant(&self, id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Metrics that drive winner selection. Falls back to the full metric
    /// set when none is flagged primary.
    pub fn primary_metrics(&self) -> Vec<&MetricSpec> {
        let primary: Vec<&MetricSpec> = self.metrics.iter().filter(|m| m.is_primary).collect();
        if primary.is_empty() {
            self.metrics.iter().collect()
        } else {
            primary
        }
    }
}

/// Caller-supplied payload for `create_experiment`. The lifecycle manager
/// validates it and stamps status/timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub name: String,
    pub experiment_type: ExperimentType,
    pub variants: Vec<Variant>,
    pub metrics: Vec<MetricSpec>,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    pub min_sample_size: u64,
    pub strategy: AllocationStrategy,
}

fn default_confidence_level() -> f64 {
    0.95
}

/// Per-variant counters, monotonically non-decreasing while the experiment
/// runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantTracking {
    pub experiment_id: Uuid,
    pub variant_id: Uuid,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub revenue: f64,
}

impl VariantTracking {
    pub fn zeroed(experiment_id: Uuid, variant_id: Uuid) -> Self {
        Self {
            experiment_id,
            variant_id,
            impressions: 0,
            clicks: 0,
            conversions: 0,
            revenue: 0.0,
        }
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.impressions > 0 {
            self.conversions as f64 / self.impressions as f64
        } else {
            0.0
        }
    }

    pub fn click_rate(&self) -> f64 {
        if self.impressions > 0 {
            self.clicks as f64 / self.impressions as f64
        } else {
            0.0
        }
    }

    pub fn average_order_value(&self) -> f64 {
        self.revenue / 1.0_f64.max(self.conversions as f64)
    }

    pub fn revenue_per_impression(&self) -> f64 {
        self.revenue / 1.0_f64.max(self.impressions as f64)
    }

    /// Observed value of a metric for this variant.
    pub fn metric_value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::ConversionRate => self.conversion_rate(),
            MetricKind::ClickRate => self.click_rate(),
            MetricKind::AverageOrderValue => self.average_order_value(),
            MetricKind::RevenuePerImpression => self.revenue_per_impression(),
        }
    }
}

/// A user's sticky variant choice. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub experiment_id: Uuid,
    pub user_id: String,
    pub variant_id: Uuid,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantWeight {
    pub variant_id: Uuid,
    pub name: String,
    pub weight: f64,
}

/// Immutable audit record written alongside every applied reallocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub experiment_id: Uuid,
    pub strategy: AllocationStrategy,
    pub weights: Vec<VariantWeight>,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of one metric for one non-control variant, compared against the
/// control arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricOutcome {
    pub metric_id: String,
    pub variant_id: Uuid,
    pub variant_name: String,
    pub observed: f64,
    pub control_value: f64,
    pub lift_pct: f64,
    pub confidence: f64,
    pub significant: bool,
}

/// Final (or interim) analysis of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_id: Uuid,
    pub winner: Option<Uuid>,
    pub recommendation: String,
    pub outcomes: Vec<MetricOutcome>,
    pub total_samples: u64,
    pub computed_at: DateTime<Utc>,
}
