//! Reallocation strategies. Each produces a proposed weight vector aligned
//! with the experiment's variant order; the optimizer floors, normalizes,
//! validates and commits.

use crate::sampling::beta;
use rand::Rng;
use uplift_stats::{two_proportion_chi_square, BinaryArm};

/// Per-variant evidence driving a reallocation round.
#[derive(Debug, Clone, Copy)]
pub struct ArmStats {
    pub impressions: u64,
    pub conversions: u64,
}

impl ArmStats {
    pub fn conversion_rate(&self) -> f64 {
        if self.impressions > 0 {
            self.conversions as f64 / self.impressions as f64
        } else {
            0.0
        }
    }

    fn binary(&self) -> BinaryArm {
        BinaryArm {
            successes: self.conversions,
            trials: self.impressions,
        }
    }
}

/// Performance-weighted reallocation: score each arm by conversion rate
/// scaled by its confidence against control, then smooth against the
/// current weights so no single round swings allocation hard.
pub fn dynamic_weights(
    arms: &[ArmStats],
    control_index: usize,
    current_weights: &[f64],
    smoothing: f64,
) -> Vec<f64> {
    let control = arms[control_index];
    let scores: Vec<f64> = arms
        .iter()
        .enumerate()
        .map(|(index, arm)| {
            let confidence = if index == control_index {
                0.0
            } else {
                two_proportion_chi_square(control.binary(), arm.binary()).confidence
            };
            arm.conversion_rate() * (0.5 + 0.5 * confidence)
        })
        .collect();

    let total: f64 = scores.iter().sum();
    let proposed: Vec<f64> = if total <= 0.0 {
        vec![100.0 / arms.len() as f64; arms.len()]
    } else {
        scores.iter().map(|score| score / total * 100.0).collect()
    };

    current_weights
        .iter()
        .zip(&proposed)
        .map(|(old, new)| (1.0 - smoothing) * old + smoothing * new)
        .collect()
}

/// Thompson Sampling: one Beta(conversions + 1, exposures - conversions + 1)
/// draw per arm, weight proportional to the draw.
pub fn thompson_weights(arms: &[ArmStats], rng: &mut impl Rng) -> Vec<f64> {
    arms.iter()
        .map(|arm| {
            let alpha = arm.conversions as f64 + 1.0;
            let failures = arm.impressions.saturating_sub(arm.conversions) as f64;
            beta(rng, alpha, failures + 1.0) * 100.0
        })
        .collect()
}

/// UCB1 band heuristic: the arm with the maximal UCB score is allocated a
/// randomized 40-60% share and the remainder splits evenly. This matches
/// the batch-reweighting behavior of the system this engine replaces, not
/// canonical per-request UCB1 arm selection.
pub fn ucb_weights(arms: &[ArmStats], rng: &mut impl Rng, exploration_factor: f64) -> Vec<f64> {
    let total_exposures: u64 = arms.iter().map(|arm| arm.impressions).sum();
    if total_exposures == 0 {
        return vec![100.0 / arms.len() as f64; arms.len()];
    }

    let log_total = (total_exposures as f64).ln();
    let scores: Vec<f64> = arms
        .iter()
        .map(|arm| {
            if arm.impressions == 0 {
                // Unexplored arms sort above everything.
                f64::INFINITY
            } else {
                arm.conversion_rate()
                    + (exploration_factor * log_total / arm.impressions as f64).sqrt()
            }
        })
        .collect();

    let leader = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(index, _)| index)
        .unwrap_or(0);

    let leader_share = rng.gen_range(40.0..=60.0);
    let follower_share = (100.0 - leader_share) / (arms.len() - 1).max(1) as f64;
    (0..arms.len())
        .map(|index| {
            if index == leader {
                leader_share
            } else {
                follower_share
            }
        })
        .collect()
}

/// Epsilon-Greedy: the best observed conversion rate takes (1 - epsilon) of
/// traffic, the rest split epsilon evenly.
pub fn epsilon_greedy_weights(arms: &[ArmStats], epsilon: f64) -> Vec<f64> {
    let best = arms
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.conversion_rate().total_cmp(&b.1.conversion_rate()))
        .map(|(index, _)| index)
        .unwrap_or(0);

    let explore_share = epsilon * 100.0 / (arms.len() - 1).max(1) as f64;
    (0..arms.len())
        .map(|index| {
            if index == best {
                (1.0 - epsilon) * 100.0
            } else {
                explore_share
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn arm(impressions: u64, conversions: u64) -> ArmStats {
        ArmStats {
            impressions,
            conversions,
        }
    }

    #[test]
    fn test_epsilon_greedy_matches_worked_example() {
        // 3 variants, epsilon 0.1: best takes 90, the others 5 each.
        let arms = vec![arm(1000, 50), arm(1000, 120), arm(1000, 80)];
        let weights = epsilon_greedy_weights(&arms, 0.1);
        assert!((weights[1] - 90.0).abs() < 1e-9);
        assert!((weights[0] - 5.0).abs() < 1e-9);
        assert!((weights[2] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_ucb_leader_lands_in_band() {
        let arms = vec![arm(4000, 600), arm(4000, 200), arm(4000, 210)];
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let weights = ucb_weights(&arms, &mut rng, 2.0);
            assert!((40.0..=60.0).contains(&weights[0]), "{weights:?}");
            assert!((weights[1] - weights[2]).abs() < 1e-9);
            assert!((weights.iter().sum::<f64>() - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ucb_prefers_unexplored_arm() {
        let arms = vec![arm(5000, 900), arm(0, 0)];
        let mut rng = StdRng::seed_from_u64(10);
        let weights = ucb_weights(&arms, &mut rng, 2.0);
        assert!(weights[1] > weights[0]);
    }

    #[test]
    fn test_ucb_with_no_data_splits_equally() {
        let arms = vec![arm(0, 0), arm(0, 0)];
        let mut rng = StdRng::seed_from_u64(11);
        let weights = ucb_weights(&arms, &mut rng, 2.0);
        assert!((weights[0] - 50.0).abs() < 1e-9);
        assert!((weights[1] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_thompson_favors_strong_arm_on_average() {
        let arms = vec![arm(5000, 500), arm(5000, 50)];
        let mut rng = StdRng::seed_from_u64(12);
        let mut strong_total = 0.0;
        for _ in 0..100 {
            let weights = thompson_weights(&arms, &mut rng);
            strong_total += weights[0] / (weights[0] + weights[1]);
        }
        assert!(strong_total / 100.0 > 0.8);
    }

    #[test]
    fn test_dynamic_smooths_toward_better_arm() {
        let arms = vec![arm(2000, 100), arm(2000, 200)];
        let current = vec![50.0, 50.0];
        let weights = dynamic_weights(&arms, 0, &current, 0.3);
        // Movement is bounded by the smoothing factor, direction follows
        // performance.
        assert!(weights[1] > 50.0);
        assert!(weights[1] < 80.0);
        assert!((weights.iter().sum::<f64>() - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_dynamic_with_no_signal_splits_equally() {
        let arms = vec![arm(0, 0), arm(0, 0)];
        let current = vec![70.0, 30.0];
        let weights = dynamic_weights(&arms, 0, &current, 0.3);
        // Proposal is the equal split; smoothing pulls 30% of the way there.
        assert!((weights[0] - 64.0).abs() < 1e-9);
        assert!((weights[1] - 36.0).abs() < 1e-9);
    }
}
