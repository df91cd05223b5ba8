//! Distribution sampling for Thompson allocation. All samplers are pure
//! functions over a caller-supplied generator, so draws replay exactly
//! under a fixed seed.

use rand::Rng;

/// Standard normal draw via Box-Muller.
pub fn standard_normal(rng: &mut impl Rng) -> f64 {
    let mut u1: f64 = rng.gen();
    while u1 <= f64::MIN_POSITIVE {
        u1 = rng.gen();
    }
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Gamma(shape, 1) via the Marsaglia-Tsang rejection method. Shapes below
/// 1 use the boost identity Gamma(shape) = Gamma(shape + 1) * U^(1/shape).
pub fn gamma(rng: &mut impl Rng, shape: f64) -> f64 {
    if shape < 1.0 {
        let boost: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
        return gamma(rng, shape + 1.0) * boost.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = standard_normal(rng);
        let v = (1.0 + c * x).powi(3);
        if v <= 0.0 {
            continue;
        }
        let u: f64 = rng.gen();
        // Squeeze check first, full log comparison as the fallback.
        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Beta(alpha, beta) combined from two independent Gamma draws.
pub fn beta(rng: &mut impl Rng, alpha: f64, beta_param: f64) -> f64 {
    let x = gamma(rng, alpha);
    let y = gamma(rng, beta_param);
    if x + y == 0.0 {
        0.5
    } else {
        x / (x + y)
    }
}
