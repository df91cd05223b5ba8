//! Per-variant event aggregation.

pub mod aggregator;

pub use aggregator::{EventPayload, EventRecord, MetricsAggregator};
