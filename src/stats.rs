//! Scalar distribution helpers: standard normal CDF/quantile and the
//! chi-squared CDF with one degree of freedom.
//!
//! These are the only distribution functions the detectors need, so they are
//! hand-rolled closed-form approximations rather than a numerics dependency:
//!
//! - [`erf`]: Abramowitz & Stegun 7.1.26, absolute error ≤ 1.5e-7.
//! - [`normal_quantile`]: Abramowitz & Stegun 26.2.23 rational approximation,
//!   absolute error ≤ 4.5e-4 — ample for stopping boundaries quoted to two
//!   decimal places.
//! - [`chi_squared_cdf_1df`]: exact identity `χ²₁(x) = erf(√(x/2))`; no
//!   general incomplete-gamma machinery needed for df = 1.

use std::f64::consts::SQRT_2;

/// Error function approximation (Abramowitz & Stegun 7.1.26).
///
/// Maximum absolute error 1.5e-7 over the real line.
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// Standard normal cumulative distribution function `Φ(x)`.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

/// Standard normal quantile `Φ⁻¹(p)` (Abramowitz & Stegun 26.2.23).
///
/// Returns `-∞` for `p <= 0` and `+∞` for `p >= 1`.
pub fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if (p - 0.5).abs() < 1e-12 {
        return 0.0;
    }

    const C0: f64 = 2.515517;
    const C1: f64 = 0.802853;
    const C2: f64 = 0.010328;
    const D1: f64 = 1.432788;
    const D2: f64 = 0.189269;
    const D3: f64 = 0.001308;

    let p_low = if p < 0.5 { p } else { 1.0 - p };
    let t = (-2.0 * p_low.ln()).sqrt();
    let z = t - (C0 + C1 * t + C2 * t * t) / (1.0 + D1 * t + D2 * t * t + D3 * t * t * t);
    if p < 0.5 {
        -z
    } else {
        z
    }
}

/// Chi-squared CDF with one degree of freedom.
///
/// Uses the identity `P(χ²₁ ≤ x) = erf(√(x/2))`.  Returns 0 for `x <= 0`,
/// and clamps to `[0, 1]` to absorb approximation error in [`erf`].
pub fn chi_squared_cdf_1df(x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    erf((x / 2.0).sqrt()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_center_and_tails() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-3);
        assert!(normal_cdf(8.0) > 0.999_999);
        assert!(normal_cdf(-8.0) < 1e-6);
    }

    #[test]
    fn normal_quantile_known_values() {
        assert!((normal_quantile(0.975) - 1.96).abs() < 2e-3);
        assert!((normal_quantile(0.025) + 1.96).abs() < 2e-3);
        assert!((normal_quantile(0.95) - 1.6449).abs() < 2e-3);
        assert_eq!(normal_quantile(0.5), 0.0);
        assert!(normal_quantile(0.0).is_infinite());
        assert!(normal_quantile(1.0).is_infinite());
    }

    #[test]
    fn quantile_inverts_cdf_roundtrip() {
        for &p in &[0.01, 0.1, 0.25, 0.5, 0.75, 0.9, 0.99] {
            let z = normal_quantile(p);
            assert!((normal_cdf(z) - p).abs() < 1e-3, "p={p} z={z}");
        }
    }

    #[test]
    fn chi_squared_1df_known_values() {
        // 95th percentile of chi2(1) is 3.841.
        assert!((chi_squared_cdf_1df(3.841) - 0.95).abs() < 1e-3);
        // Median is ~0.4549.
        assert!((chi_squared_cdf_1df(0.4549) - 0.5).abs() < 1e-3);
        assert_eq!(chi_squared_cdf_1df(0.0), 0.0);
        assert_eq!(chi_squared_cdf_1df(-3.0), 0.0);
        assert!(chi_squared_cdf_1df(50.0) > 0.999_999);
    }

    #[test]
    fn erf_is_odd_and_bounded() {
        for &x in &[0.1, 0.5, 1.0, 2.0, 3.5] {
            assert!((erf(x) + erf(-x)).abs() < 1e-12);
            assert!(erf(x) <= 1.0 && erf(x) >= -1.0);
        }
        assert!(erf(0.0).abs() < 1e-7);
    }
}
