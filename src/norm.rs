/// Distance-decay normalization model: fits `E[d]`, the expected normalized count at
/// bin-distance `d`, from a scaffold's intra matrix (spec.md §4.4).
use crate::config::Config;
use crate::error::CoreError;
use crate::link_matrix::IntraMatrix;

#[derive(Debug, Clone)]
pub struct NormModel {
    /// `expected[d]` for `d in [0, r_max]`.
    expected: Vec<f64>,
    /// Count floor used as a no-data sentinel for distances beyond `r_max`.
    pub floor: f64,
    /// Quality-limited threshold used by graph construction (spec.md §4.4, §4.6).
    pub qla: f64,
}

impl NormModel {
    /// A flat model (`E[d] = 1` for every `d`), useful for tests that exercise graph or
    /// inter-matrix code without needing a real intra-matrix fit.
    pub fn trivial() -> Self {
        NormModel {
            expected: vec![1.0],
            floor: 0.0,
            qla: 0.0,
        }
    }

    pub fn r_max(&self) -> usize {
        self.expected.len().saturating_sub(1)
    }

    /// `E[d]`, clamped to the largest fitted distance (spec.md §4.3: used by the inter
    /// builder for bin-distances beyond any single scaffold's observed band).
    pub fn expected(&self, d: u32) -> f64 {
        let d = d as usize;
        if self.expected.is_empty() {
            return self.floor;
        }
        let idx = d.min(self.expected.len() - 1);
        self.expected[idx]
    }
}

/// Fit a `NormModel` from one or more scaffolds' intra matrices (spec.md §4.4):
/// bucket cells by integer bin-distance, trimmed-mean `count/denom` per bucket with
/// `>= K_min` samples, isotonic (pool-adjacent-violators) smoothing for monotonicity,
/// and a quality-limited threshold from the global mean.
pub fn fit(matrices: &[IntraMatrix], config: &Config) -> Result<NormModel, CoreError> {
    let band = matrices.iter().map(|m| m.band).max().unwrap_or(0);
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); band + 1];

    for matrix in matrices {
        for (i, j, count, denom) in matrix.iter_cells() {
            if denom < config.epsilon {
                continue;
            }
            let d = j - i;
            buckets[d].push(count / denom);
        }
    }

    let mut expected = Vec::new();
    for bucket in &buckets {
        if bucket.len() < config.norm_k_min {
            break;
        }
        expected.push(trimmed_mean(bucket));
    }

    let r_max = expected.len().saturating_sub(1);
    if expected.is_empty() || expected.len() < config.r_min_bands {
        return Err(CoreError::NoBands {
            r_max,
            r_min_bands: config.r_min_bands,
        });
    }

    isotonic_nonincreasing(&mut expected);

    let all_values: Vec<f64> = buckets
        .iter()
        .take(expected.len())
        .flat_map(|b| b.iter().copied())
        .collect();
    let global_mean = if all_values.is_empty() {
        0.0
    } else {
        all_values.iter().sum::<f64>() / all_values.len() as f64
    };
    let n0 = all_values.len().max(1) as f64;
    let qla = binomial_quantile(0.99, n0, global_mean) / n0;

    Ok(NormModel {
        expected,
        floor: config.epsilon,
        qla,
    })
}

/// Trimmed mean: drop the top and bottom 10% of samples, average the rest. With fewer
/// than 10 samples nothing is trimmed (all contribute).
fn trimmed_mean(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let trim = n / 10;
    let lo = trim;
    let hi = if n > 2 * trim { n - trim } else { n };
    let kept = &sorted[lo..hi];
    if kept.is_empty() {
        return sorted.iter().sum::<f64>() / n as f64;
    }
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Pool-adjacent-violators: the smallest non-increasing sequence (in the L2 sense)
/// that does not increase anywhere, applied left to right as spec.md §3 requires
/// (`E[d] >= E[d+1]`).
fn isotonic_nonincreasing(values: &mut Vec<f64>) {
    // PAVA on the negated sequence gives a non-decreasing fit; negate back.
    let mut negated: Vec<f64> = values.iter().map(|v| -v).collect();
    pava_nondecreasing(&mut negated);
    for (v, n) in values.iter_mut().zip(negated.iter()) {
        *v = -n;
    }
}

fn pava_nondecreasing(values: &mut Vec<f64>) {
    // Stack of (value, weight) blocks.
    let mut blocks: Vec<(f64, usize)> = Vec::new();
    for &v in values.iter() {
        let mut value = v;
        let mut weight = 1usize;
        while let Some(&(prev_value, prev_weight)) = blocks.last() {
            if prev_value > value {
                let total_weight = prev_weight + weight;
                value = (prev_value * prev_weight as f64 + value * weight as f64) / total_weight as f64;
                weight = total_weight;
                blocks.pop();
            } else {
                break;
            }
        }
        blocks.push((value, weight));
    }
    let mut out = Vec::with_capacity(values.len());
    for (value, weight) in blocks {
        for _ in 0..weight {
            out.push(value);
        }
    }
    *values = out;
}

/// Quantile of a Binomial(n0, p) distribution via normal approximation, matching the
/// spec's `quantile(0.99, Binomial(n0, la))` definition closely enough for a
/// configuration threshold (spec.md §4.4).
fn binomial_quantile(quantile: f64, n0: f64, p: f64) -> f64 {
    if n0 <= 0.0 || !(0.0..=1.0).contains(&p) {
        return 0.0;
    }
    let mean = n0 * p;
    let var = n0 * p * (1.0 - p).max(0.0);
    let sd = var.sqrt();
    let z = inverse_normal_cdf(quantile);
    (mean + z * sd).max(0.0)
}

/// Acklam's rational approximation to the inverse standard normal CDF.
fn inverse_normal_cdf(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    // Good enough for the quantiles graph construction actually needs (>= 0.5).
    let a = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    let b = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    let c = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    let d = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    let p_low = 0.02425;
    if p < p_low {
        let q = (-2.0 * p.ln()).sqrt();
        (((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    } else if p <= 1.0 - p_low {
        let q = p - 0.5;
        let r = q * q;
        (((((a[0] * r + a[1]) * r + a[2]) * r + a[3]) * r + a[4]) * r + a[5]) * q
            / (((((b[0] * r + b[1]) * r + b[2]) * r + b[3]) * r + b[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;
    use crate::link_matrix::build_intra_matrix;
    use crate::link_store::ScaffoldLink;
    use crate::restriction::RestrictionSites;
    use crate::seq_dict::SeqDict;

    fn decaying_links(n_bins: usize, per_distance: usize) -> Vec<ScaffoldLink> {
        let mut links = Vec::new();
        for d in 0..n_bins {
            let count = (per_distance * 50).saturating_sub(d * per_distance * 2);
            for _ in 0..count.max(0) {
                links.push(ScaffoldLink {
                    scaffold_a: 0,
                    pos_a: 0,
                    scaffold_b: 0,
                    pos_b: (d as u64) * 100,
                });
            }
        }
        links
    }

    #[test]
    fn test_fit_produces_monotonic_curve() {
        let mut dict = SeqDict::new();
        dict.put("a", 10_000);
        let layout = Layout::identity(&dict);
        let cfg = Config {
            max_band_bases: 1_000,
            norm_k_min: 5,
            r_min_bands: 2,
            ..Config::default()
        };
        let sites = RestrictionSites::new();
        let links = decaying_links(10, 40);
        let matrix = build_intra_matrix(&layout, 0, &cfg, &sites, 100, links.iter());
        let model = fit(&[matrix], &cfg).expect("fit should succeed");

        for d in 0..model.r_max() {
            assert!(model.expected(d as u32) >= model.expected(d as u32 + 1));
        }
    }

    #[test]
    fn test_fit_fails_with_too_few_bands() {
        let mut dict = SeqDict::new();
        dict.put("a", 1000);
        let layout = Layout::identity(&dict);
        let cfg = Config {
            max_band_bases: 1_000,
            norm_k_min: 1000, // impossible to satisfy with this tiny scaffold
            r_min_bands: 3,
            ..Config::default()
        };
        let sites = RestrictionSites::new();
        let links = decaying_links(5, 2);
        let matrix = build_intra_matrix(&layout, 0, &cfg, &sites, 100, links.iter());
        let result = fit(&[matrix], &cfg);
        assert!(matches!(result, Err(CoreError::NoBands { .. })));
    }

    #[test]
    fn test_pava_monotonic_noop() {
        let mut values = vec![5.0, 4.0, 3.0, 2.0, 1.0];
        let before = values.clone();
        isotonic_nonincreasing(&mut values);
        assert_eq!(values, before);
    }

    #[test]
    fn test_pava_fixes_violation() {
        let mut values = vec![5.0, 2.0, 4.0, 1.0];
        isotonic_nonincreasing(&mut values);
        for w in values.windows(2) {
            assert!(w[0] >= w[1] - 1e-9);
        }
    }
}
