//! Shared variant-set validation. Every path that mutates variant weights
//! (experiment creation and all reallocation strategies) runs through here
//! before persisting.

use crate::error::{UpliftError, UpliftResult};
use crate::types::Variant;
use std::collections::HashSet;

/// Allowed drift on the sum-to-100 invariant.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

pub fn validate_variant_set(variants: &[Variant]) -> UpliftResult<()> {
    if variants.len() < 2 {
        return Err(UpliftError::Validation(format!(
            "experiment requires at least 2 variants, got {}",
            variants.len()
        )));
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for variant in variants {
        if !ids.insert(variant.id) {
            return Err(UpliftError::Validation(format!(
                "duplicate variant id {}",
                variant.id
            )));
        }
        if !names.insert(variant.name.as_str()) {
            return Err(UpliftError::Validation(format!(
                "duplicate variant name '{}'",
                variant.name
            )));
        }
        if !(0.0..=100.0).contains(&variant.weight) || !variant.weight.is_finite() {
            return Err(UpliftError::Validation(format!(
                "variant '{}' weight {} outside [0, 100]",
                variant.name, variant.weight
            )));
        }
    }

    let total: f64 = variants.iter().map(|v| v.weight).sum();
    if (total - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(UpliftError::Validation(format!(
            "variant weights sum to {total:.2}, expected 100"
        )));
    }

    Ok(())
}

/// Enforce the exactly-one-control invariant. When no variant is flagged,
/// the first one becomes control; more than one flagged is a caller error.
pub fn ensure_single_control(variants: &mut [Variant]) -> UpliftResult<()> {
    match variants.iter().filter(|v| v.is_control).count() {
        0 => {
            if let Some(first) = variants.first_mut() {
                first.is_control = true;
            }
            Ok(())
        }
        1 => Ok(()),
        n => Err(UpliftError::Validation(format!(
            "{n} variants flagged as control, expected exactly one"
        ))),
    }
}
