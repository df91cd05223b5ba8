//! Statistical significance testing and experiment analysis.

pub mod report;
pub mod significance;

pub use report::ExperimentAnalyzer;
pub use significance::{
    lift_pct, two_proportion_chi_square, two_sample_continuous, BinaryArm, ContinuousArm,
    TestOutcome,
};
