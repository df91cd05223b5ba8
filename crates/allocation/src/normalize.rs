//! Weight normalization shared by every allocation strategy.

/// Rescale weights in place so they sum to exactly 100: equal split when
/// the total is zero, otherwise scale by 100/total, round to 2 decimals,
/// and push the rounding remainder onto the last weight.
pub fn normalize_weights(weights: &mut [f64]) {
    let Some(last_index) = weights.len().checked_sub(1) else {
        return;
    };

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        let equal = round2(100.0 / weights.len() as f64);
        for weight in weights.iter_mut() {
            *weight = equal;
        }
    } else {
        let scale = 100.0 / total;
        for weight in weights.iter_mut() {
            *weight = round2(*weight * scale);
        }
    }

    let sum_except_last: f64 = weights[..last_index].iter().sum();
    weights[last_index] = round2(100.0 - sum_except_last);
}

/// Exploration floor: no variant drops below `floor` percent. The caller
/// renormalizes afterwards.
pub fn apply_floor(weights: &mut [f64], floor: f64) {
    for weight in weights.iter_mut() {
        if *weight < floor {
            *weight = floor;
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
