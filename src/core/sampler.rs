use std::f64::consts::{PI, SQRT_2};

use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::error::SimError;
use super::types::{RatePath, RateRange};

// Below this much retained mass, plain rejection wastes too many draws.
const REJECTION_MIN_MASS: f64 = 0.25;

/// Normal distribution restricted to `[lower, upper]` and renormalised.
#[derive(Debug, Clone, Copy)]
pub struct TruncatedNormal {
    mean: f64,
    std: f64,
    lower: f64,
    upper: f64,
    method: SamplingMethod,
}

#[derive(Debug, Clone, Copy)]
enum SamplingMethod {
    Point(f64),
    Rejection(Normal<f64>),
    /// Inverse CDF over `[lo_cdf, hi_cdf]` of the standardised interval.
    /// Mirrored intervals sit above the mean and are flipped into the lower
    /// tail, where `Phi` keeps its precision.
    InverseCdf {
        lo_z: f64,
        hi_z: f64,
        lo_cdf: f64,
        hi_cdf: f64,
        mirrored: bool,
    },
}

impl TruncatedNormal {
    pub fn new(mean: f64, std: f64, lower: f64, upper: f64) -> Result<Self, SimError> {
        if !mean.is_finite() {
            return Err(SimError::invalid("mean must be finite"));
        }
        if !std.is_finite() || std <= 0.0 {
            return Err(SimError::invalid(format!("std must be > 0, got {std}")));
        }
        RateRange::new(lower, upper).validate("truncation range")?;

        if lower == upper {
            return Ok(Self {
                mean,
                std,
                lower,
                upper,
                method: SamplingMethod::Point(lower),
            });
        }

        let a = (lower - mean) / std;
        let b = (upper - mean) / std;
        let mass = standard_normal_cdf(b) - standard_normal_cdf(a);

        let method = if mass >= REJECTION_MIN_MASS {
            let normal = Normal::new(mean, std)
                .map_err(|e| SimError::invalid(format!("normal distribution: {e}")))?;
            SamplingMethod::Rejection(normal)
        } else {
            let mirrored = a > 0.0;
            let (lo_z, hi_z) = if mirrored { (-b, -a) } else { (a, b) };
            SamplingMethod::InverseCdf {
                lo_z,
                hi_z,
                lo_cdf: standard_normal_cdf(lo_z),
                hi_cdf: standard_normal_cdf(hi_z),
                mirrored,
            }
        };

        Ok(Self {
            mean,
            std,
            lower,
            upper,
            method,
        })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }
}

impl Distribution<f64> for TruncatedNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self.method {
            SamplingMethod::Point(value) => value,
            SamplingMethod::Rejection(normal) => loop {
                let x = normal.sample(rng);
                if x >= self.lower && x <= self.upper {
                    return x;
                }
            },
            SamplingMethod::InverseCdf {
                lo_z,
                hi_z,
                lo_cdf,
                hi_cdf,
                mirrored,
            } => {
                let u = if hi_cdf > lo_cdf {
                    rng.gen_range(lo_cdf..=hi_cdf)
                } else {
                    lo_cdf
                };
                let z = standard_normal_quantile(u).clamp(lo_z, hi_z);
                let z = if mirrored { -z } else { z };
                (self.mean + self.std * z).clamp(self.lower, self.upper)
            }
        }
    }
}

/// Draws a `rows x cols` matrix of fractional rates from a normal with the
/// given percentage-scale `mean` / `std`, truncated to `range`.
///
/// Cells are drawn independently in row-major order.
pub fn sample_rate_path<R: Rng + ?Sized>(
    rng: &mut R,
    range: RateRange,
    mean: f64,
    std: f64,
    rows: usize,
    cols: usize,
) -> Result<RatePath, SimError> {
    let dist = TruncatedNormal::new(mean, std, range.min, range.max)?;
    Ok(RatePath::from_fn(rows, cols, |_, _| dist.sample(rng) / 100.0))
}

pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * libm::erfc(-z / SQRT_2)
}

/// Inverse of [`standard_normal_cdf`]: Acklam's rational approximation
/// followed by one Halley step.
pub fn standard_normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    let x = if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    };

    let e = standard_normal_cdf(x) - p;
    let u = e * (2.0 * PI).sqrt() * (x * x / 2.0).exp();
    let refined = x - u / (1.0 + x * u / 2.0);
    if refined.is_finite() { refined } else { x }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn mean_of(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[test]
    fn cdf_and_quantile_round_trip_across_tails() {
        for z in [-6.0, -3.5, -1.0, 0.0, 0.3, 2.0, 5.0] {
            let back = standard_normal_quantile(standard_normal_cdf(z));
            assert!((back - z).abs() < 1e-7, "z={z}, back={back}");
        }
    }

    #[test]
    fn cdf_matches_known_values() {
        assert!((standard_normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((standard_normal_cdf(1.96) - 0.975_002_104_851_780).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_std() {
        let err = TruncatedNormal::new(7.0, 0.0, -20.0, 20.0).expect_err("std 0");
        assert!(matches!(err, SimError::InvalidParameter(_)));
        assert!(TruncatedNormal::new(7.0, -1.0, -20.0, 20.0).is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = sample_rate_path(&mut rng, RateRange::new(5.0, 1.0), 2.0, 1.0, 2, 2)
            .expect_err("inverted range");
        assert!(err.to_string().contains("lower bound"));
    }

    #[test]
    fn degenerate_range_is_constant() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let path = sample_rate_path(&mut rng, RateRange::new(4.0, 4.0), 2.5, 3.0, 3, 5)
            .expect("valid");
        assert!(path.values().iter().all(|&v| (v - 0.04).abs() < 1e-15));
    }

    #[test]
    fn matrix_has_requested_shape_and_fractional_scale() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let path = sample_rate_path(&mut rng, RateRange::new(-20.0, 20.0), 7.0, 10.0, 40, 30)
            .expect("valid");
        assert_eq!(path.rows(), 40);
        assert_eq!(path.cols(), 30);
        assert!(path.values().iter().all(|&v| (-0.2..=0.2).contains(&v)));
    }

    #[test]
    fn symmetric_truncation_preserves_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let path = sample_rate_path(&mut rng, RateRange::new(-3.0, 17.0), 7.0, 10.0, 200, 100)
            .expect("valid");
        let mean = mean_of(path.values());
        assert!((mean - 0.07).abs() < 0.002, "mean = {mean}");
    }

    #[test]
    fn one_sided_truncation_shifts_mean_towards_interval() {
        // Half-normal above the mean: E[X] = mean + std * sqrt(2 / pi).
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let path = sample_rate_path(&mut rng, RateRange::new(2.5, 1_000.0), 2.5, 3.0, 200, 100)
            .expect("valid");
        let expected = (2.5 + 3.0 * (2.0 / PI).sqrt()) / 100.0;
        let mean = mean_of(path.values());
        assert!((mean - expected).abs() < 0.001, "mean = {mean}");
    }

    #[test]
    fn far_tail_interval_uses_inverse_cdf_and_stays_in_bounds() {
        let dist = TruncatedNormal::new(7.0, 10.0, 50.0, 55.0).expect("valid");
        assert!(matches!(
            dist.method,
            SamplingMethod::InverseCdf { mirrored: true, .. }
        ));
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let draws = (0..5_000).map(|_| dist.sample(&mut rng)).collect::<Vec<_>>();
        assert!(draws.iter().all(|v| (50.0..=55.0).contains(v)));
        // Density falls across the interval, so mass concentrates near 50.
        let near_lower = draws.iter().filter(|&&v| v < 52.5).count();
        assert!(near_lower > draws.len() / 2);
    }

    #[test]
    fn lower_tail_interval_is_not_mirrored() {
        let dist = TruncatedNormal::new(7.0, 10.0, -40.0, -30.0).expect("valid");
        assert!(matches!(
            dist.method,
            SamplingMethod::InverseCdf { mirrored: false, .. }
        ));
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        for _ in 0..1_000 {
            let v = dist.sample(&mut rng);
            assert!((-40.0..=-30.0).contains(&v));
        }
    }

    #[test]
    fn same_seed_same_matrix() {
        let range = RateRange::new(0.0, 10.0);
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        let pa = sample_rate_path(&mut a, range, 2.5, 3.0, 10, 10).expect("valid");
        let pb = sample_rate_path(&mut b, range, 2.5, 3.0, 10, 10).expect("valid");
        assert_eq!(pa, pb);
    }

    proptest! {
        #[test]
        fn samples_always_within_bounds(
            seed in 0_u64..1_000,
            mean in -20.0_f64..20.0,
            std in 0.1_f64..25.0,
            lo in -60.0_f64..60.0,
            width in 0.0_f64..40.0,
        ) {
            let dist = TruncatedNormal::new(mean, std, lo, lo + width).expect("valid");
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for _ in 0..64 {
                let v = dist.sample(&mut rng);
                prop_assert!(v >= dist.lower() && v <= dist.upper());
            }
        }
    }
}
