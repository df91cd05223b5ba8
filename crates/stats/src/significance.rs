//! Hypothesis-test primitives: a two-proportion chi-square for binary
//! metrics and a two-sample test for continuous metrics. Both degrade to a
//! non-significant, zero-confidence outcome on degenerate input instead of
//! erroring; callers only see errors for malformed experiments.

/// 95% critical value for chi-square with one degree of freedom.
pub const CHI_SQUARE_CRITICAL_95: f64 = 3.841;
/// 95% two-tailed critical value for the continuous-metric statistic.
pub const T_CRITICAL_95: f64 = 1.96;
/// Minimum per-arm sample count for the continuous test.
pub const MIN_CONTINUOUS_SAMPLES: u64 = 30;

/// Per-arm standard deviation approximation: 0.3x the arm mean. A stated
/// simplification carried over from the system this engine replaces, not a
/// population estimate.
const CONTINUOUS_SD_FACTOR: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    pub statistic: f64,
    pub significant: bool,
    pub confidence: f64,
}

impl TestOutcome {
    fn inconclusive() -> Self {
        Self {
            statistic: 0.0,
            significant: false,
            confidence: 0.0,
        }
    }
}

/// One arm of a binary-metric comparison (e.g. conversions/impressions).
#[derive(Debug, Clone, Copy)]
pub struct BinaryArm {
    pub successes: u64,
    pub trials: u64,
}

/// One arm of a continuous-metric comparison; `total` is the accumulated
/// value (revenue) and `samples` the divisor count.
#[derive(Debug, Clone, Copy)]
pub struct ContinuousArm {
    pub total: f64,
    pub samples: u64,
}

/// Two-proportion chi-square test, df=1. The reported confidence is 0.95
/// when significant, otherwise the statistic scaled against the critical
/// value; it approximates 1 - p, it is not an exact p-value.
pub fn two_proportion_chi_square(control: BinaryArm, treatment: BinaryArm) -> TestOutcome {
    if control.trials == 0 || treatment.trials == 0 {
        return TestOutcome::inconclusive();
    }

    let pooled = (control.successes + treatment.successes) as f64
        / (control.trials + treatment.trials) as f64;
    let expected_control = control.trials as f64 * pooled;
    let expected_treatment = treatment.trials as f64 * pooled;
    if expected_control == 0.0 || expected_treatment == 0.0 {
        return TestOutcome::inconclusive();
    }

    let chi_square = (control.successes as f64 - expected_control).powi(2) / expected_control
        + (treatment.successes as f64 - expected_treatment).powi(2) / expected_treatment;

    let significant = chi_square > CHI_SQUARE_CRITICAL_95;
    let confidence = if significant {
        0.95
    } else {
        chi_square / CHI_SQUARE_CRITICAL_95 * 0.95
    };

    TestOutcome {
        statistic: chi_square,
        significant,
        confidence,
    }
}

/// Two-sample test over per-arm means `total / max(1, samples)` with the
/// 0.3x-mean standard-deviation approximation. Arms below
/// MIN_CONTINUOUS_SAMPLES are inconclusive by policy.
pub fn two_sample_continuous(control: ContinuousArm, treatment: ContinuousArm) -> TestOutcome {
    if control.samples < MIN_CONTINUOUS_SAMPLES || treatment.samples < MIN_CONTINUOUS_SAMPLES {
        return TestOutcome::inconclusive();
    }

    let mean_control = control.total / 1.0_f64.max(control.samples as f64);
    let mean_treatment = treatment.total / 1.0_f64.max(treatment.samples as f64);
    let sd_control = CONTINUOUS_SD_FACTOR * mean_control.abs();
    let sd_treatment = CONTINUOUS_SD_FACTOR * mean_treatment.abs();

    let standard_error = (sd_control.powi(2) / control.samples as f64
        + sd_treatment.powi(2) / treatment.samples as f64)
        .sqrt();
    if standard_error == 0.0 {
        return TestOutcome::inconclusive();
    }

    let t_statistic = (mean_treatment - mean_control) / standard_error;
    let significant = t_statistic.abs() > T_CRITICAL_95;
    let confidence = if significant {
        0.95
    } else {
        (t_statistic.abs() / T_CRITICAL_95 * 0.95).min(0.94)
    };

    TestOutcome {
        statistic: t_statistic,
        significant,
        confidence,
    }
}

/// Relative lift of treatment over control, in percent. Zero control means
/// lift is undefined; report 0 rather than infinity.
pub fn lift_pct(control_value: f64, treatment_value: f64) -> f64 {
    if control_value == 0.0 {
        0.0
    } else {
        (treatment_value - control_value) / control_value * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chi_square_worked_example() {
        // 100/1000 vs 150/1000: pooled 0.125, expected 125 per arm,
        // chi-square = 25^2/125 + 25^2/125 = 10.
        let outcome = two_proportion_chi_square(
            BinaryArm {
                successes: 100,
                trials: 1000,
            },
            BinaryArm {
                successes: 150,
                trials: 1000,
            },
        );
        assert!((outcome.statistic - 10.0).abs() < 1e-9);
        assert!(outcome.significant);
        assert!((outcome.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_chi_square_zero_arm_is_inconclusive() {
        let outcome = two_proportion_chi_square(
            BinaryArm {
                successes: 0,
                trials: 0,
            },
            BinaryArm {
                successes: 10,
                trials: 100,
            },
        );
        assert!(!outcome.significant);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_chi_square_small_difference_scales_confidence() {
        let outcome = two_proportion_chi_square(
            BinaryArm {
                successes: 100,
                trials: 1000,
            },
            BinaryArm {
                successes: 105,
                trials: 1000,
            },
        );
        assert!(!outcome.significant);
        assert!(outcome.confidence > 0.0);
        assert!(outcome.confidence < 0.95);
        assert!((outcome.confidence - outcome.statistic / CHI_SQUARE_CRITICAL_95 * 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_chi_square_no_successes_anywhere_is_inconclusive() {
        let outcome = two_proportion_chi_square(
            BinaryArm {
                successes: 0,
                trials: 500,
            },
            BinaryArm {
                successes: 0,
                trials: 500,
            },
        );
        assert!(!outcome.significant);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_continuous_clear_difference_is_significant() {
        // Means 50 vs 60 over 100 samples each: sd 15/18, se ~2.343,
        // t ~4.27.
        let outcome = two_sample_continuous(
            ContinuousArm {
                total: 5000.0,
                samples: 100,
            },
            ContinuousArm {
                total: 6000.0,
                samples: 100,
            },
        );
        assert!(outcome.significant);
        assert!(outcome.statistic > T_CRITICAL_95);
        assert!((outcome.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_continuous_under_sampled_arm_is_inconclusive() {
        let outcome = two_sample_continuous(
            ContinuousArm {
                total: 500.0,
                samples: 10,
            },
            ContinuousArm {
                total: 900.0,
                samples: 100,
            },
        );
        assert!(!outcome.significant);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_continuous_non_significant_confidence_is_capped() {
        // Nearly identical means: tiny t, confidence stays under the
        // non-significant cap.
        let outcome = two_sample_continuous(
            ContinuousArm {
                total: 5000.0,
                samples: 100,
            },
            ContinuousArm {
                total: 5050.0,
                samples: 100,
            },
        );
        assert!(!outcome.significant);
        assert!(outcome.confidence <= 0.94);
    }

    #[test]
    fn test_lift_against_zero_control_is_zero() {
        assert_eq!(lift_pct(0.0, 0.5), 0.0);
        assert!((lift_pct(0.10, 0.15) - 50.0).abs() < 1e-9);
        assert!((lift_pct(0.20, 0.15) + 25.0).abs() < 1e-9);
    }
}
