/// Break detector: locates candidate mis-joins from a scaffold's intra link profile
/// (spec.md §4.5). Two modes share the same one-dimensional scan.
use crate::config::Config;
use crate::layout::{Component, Layout};
use crate::link_matrix::IntraMatrix;
use crate::norm::NormModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Internal,
    JointLocal,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakPoint {
    pub scaffold_id: u32,
    /// Break coordinate in scaffold-space bins; translated to contig coordinates by
    /// the caller via the layout before being applied (spec.md §4.5: "emit cuts in
    /// source-contig coordinates").
    pub bin: usize,
    pub kind: BreakKind,
}

/// `L(i) = sum(count(i-k, i+k)) / sum(E[2k])` for `k = 1..D/r`, the local-support
/// statistic the spec's break scan thresholds against (spec.md §4.5).
fn local_support(matrix: &IntraMatrix, norm: &NormModel, i: usize) -> Option<f64> {
    let mut num = 0.0;
    let mut denom = 0.0;
    let mut any = false;
    for k in 1..=matrix.band {
        if i < k || i + k >= matrix.n_bins {
            continue;
        }
        any = true;
        num += matrix.get_count(i - k, i + k);
        denom += norm.expected((2 * k) as u32);
    }
    if !any || denom <= 0.0 {
        None
    } else {
        Some(num / denom)
    }
}

/// Contig-internal break scan over one scaffold's intra matrix (spec.md §4.5). Returns
/// break candidates in scaffold-bin coordinates, already merged and dual-break-coalesced.
pub fn detect_internal_breaks(
    matrix: &IntraMatrix,
    norm: &NormModel,
    config: &Config,
) -> Vec<BreakPoint> {
    let profile: Vec<Option<f64>> = (0..matrix.n_bins)
        .map(|i| local_support(matrix, norm, i))
        .collect();

    let values: Vec<f64> = profile.iter().filter_map(|v| *v).collect();
    if values.is_empty() {
        return Vec::new();
    }
    let running_mean = values.iter().sum::<f64>() / values.len() as f64;
    let threshold = config.break_rho * running_mean;

    let mut candidates: Vec<usize> = Vec::new();
    for (i, v) in profile.iter().enumerate() {
        let Some(v) = v else { continue };
        if *v >= threshold {
            continue;
        }
        // Local minimum among immediate, defined neighbors.
        let left_ok = i == 0 || profile[i - 1].map(|l| l >= *v).unwrap_or(true);
        let right_ok = i + 1 >= profile.len() || profile[i + 1].map(|r| r >= *v).unwrap_or(true);
        if left_ok && right_ok {
            candidates.push(i);
        }
    }

    let merged = merge_adjacent(&candidates, config.break_merge_thresh as usize);
    let coalesced = coalesce_dual_breaks(&merged, config.dual_break_thresh as usize);

    coalesced
        .into_iter()
        .map(|bin| BreakPoint {
            scaffold_id: matrix.scaffold_id,
            bin,
            kind: BreakKind::Internal,
        })
        .collect()
}

/// Coalesce candidates within `merge_thresh` bins of each other into one, keeping the
/// earliest of each cluster (spec.md §4.5: "adjacent candidates ... are coalesced").
fn merge_adjacent(candidates: &[usize], merge_thresh: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut iter = candidates.iter().copied();
    let Some(mut cluster_start) = iter.next() else {
        return out;
    };
    let mut cluster_repr = cluster_start;
    for c in iter {
        if c.saturating_sub(cluster_repr) <= merge_thresh {
            cluster_repr = c;
        } else {
            out.push(cluster_start);
            cluster_start = c;
            cluster_repr = c;
        }
    }
    out.push(cluster_start);
    out
}

/// Candidates flanked by two symmetric drops within `dual_break_thresh` become a single
/// dual break (spec.md §4.5). We approximate "symmetric flanking drop" as two surviving
/// candidates within the threshold of each other collapsing to their midpoint.
fn coalesce_dual_breaks(candidates: &[usize], dual_break_thresh: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < candidates.len() {
        if i + 1 < candidates.len() && candidates[i + 1] - candidates[i] <= dual_break_thresh {
            out.push((candidates[i] + candidates[i + 1]) / 2);
            i += 2;
        } else {
            out.push(candidates[i]);
            i += 1;
        }
    }
    out
}

/// Scaffold-joint break scan: checks only existing segment-join positions against a
/// within-segment control (spec.md §4.5).
pub fn detect_joint_breaks(
    layout: &Layout,
    matrix: &IntraMatrix,
    norm: &NormModel,
    config: &Config,
) -> Vec<BreakPoint> {
    let scaffold = &layout.scaffolds[matrix.scaffold_id as usize];
    let flank_bins = ((config.flank as usize) / matrix.resolution as usize).max(1);

    let mut joins: Vec<usize> = Vec::new();
    let mut cursor = 0u64;
    for (idx, component) in scaffold.components.iter().enumerate() {
        let len = match component {
            Component::Seq(s) => s.length,
            Component::Gap(g) => g.length,
        };
        cursor += len;
        if idx + 1 < scaffold.components.len() {
            let join_bin = (cursor / matrix.resolution as u64) as usize;
            joins.push(join_bin.min(matrix.n_bins.saturating_sub(1)));
        }
    }

    let mut breaks = Vec::new();
    for join_bin in joins {
        let lo = join_bin.saturating_sub(flank_bins);
        let hi = (join_bin + flank_bins).min(matrix.n_bins.saturating_sub(1));

        let support_across = support_between(matrix, norm, lo.min(join_bin), hi.max(join_bin));
        let control_lo = support_between(matrix, norm, lo, join_bin.saturating_sub(1).max(lo));
        let control_hi = support_between(matrix, norm, (join_bin + 1).min(hi), hi);
        let control = match (control_lo, control_hi) {
            (Some(a), Some(b)) => Some((a + b) / 2.0),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };

        if let (Some(across), Some(control)) = (support_across, control) {
            if control > 0.0 && across < config.break_rho * control {
                breaks.push(BreakPoint {
                    scaffold_id: matrix.scaffold_id,
                    bin: join_bin,
                    kind: BreakKind::JointLocal,
                });
            }
        }
    }
    breaks
}

fn support_between(matrix: &IntraMatrix, norm: &NormModel, from: usize, to: usize) -> Option<f64> {
    if from >= to {
        return None;
    }
    let mut num = 0.0;
    let mut denom = 0.0;
    for i in from..to {
        let d = (to - i) as u32;
        num += matrix.get_count(i, to.min(matrix.n_bins - 1));
        denom += norm.expected(d);
    }
    if denom <= 0.0 {
        None
    } else {
        Some(num / denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link_matrix::build_intra_matrix;
    use crate::link_store::ScaffoldLink;
    use crate::restriction::RestrictionSites;
    use crate::seq_dict::SeqDict;

    fn mis_assembled_matrix() -> (Layout, IntraMatrix, NormModel) {
        let mut dict = SeqDict::new();
        dict.put("a", 2_000_000);
        let layout = Layout::identity(&dict);
        let cfg = Config {
            max_band_bases: 500_000,
            norm_k_min: 3,
            r_min_bands: 2,
            ..Config::default()
        };
        let sites = RestrictionSites::new();

        // Dense links within [0, 1Mb) and within [1Mb, 2Mb), none crossing, so the
        // midpoint should show a support drop.
        let mut links = Vec::new();
        for half_start in [0u64, 1_000_000] {
            for offset in (0..900_000).step_by(20_000) {
                links.push(ScaffoldLink {
                    scaffold_a: 0,
                    pos_a: half_start + offset,
                    scaffold_b: 0,
                    pos_b: half_start + offset + 50_000,
                });
            }
        }
        let matrix = build_intra_matrix(&layout, 0, &cfg, &sites, 50_000, links.iter());
        let norm = crate::norm::fit(&[matrix.clone()], &cfg).expect("fit");
        (layout, matrix, norm)
    }

    #[test]
    fn test_detect_internal_break_near_midpoint() {
        let (_layout, matrix, norm) = mis_assembled_matrix();
        let cfg = Config {
            max_band_bases: 500_000,
            break_rho: 0.5,
            ..Config::default()
        };
        let breaks = detect_internal_breaks(&matrix, &norm, &cfg);
        assert!(!breaks.is_empty(), "expected at least one break candidate");
        let midpoint_bin = 1_000_000 / 50_000;
        for b in &breaks {
            let distance = (b.bin as i64 - midpoint_bin as i64).abs();
            assert!(distance <= 3, "break at {} too far from midpoint {midpoint_bin}", b.bin);
        }
    }

    #[test]
    fn test_merge_adjacent_coalesces() {
        let merged = merge_adjacent(&[10, 11, 12, 50], 2);
        assert_eq!(merged, vec![12, 50]);
    }

    #[test]
    fn test_idempotent_no_new_breaks_on_clean_profile() {
        // A scaffold with uniform coverage (no mis-join) should not emit internal breaks.
        let mut dict = SeqDict::new();
        dict.put("a", 1_000_000);
        let layout = Layout::identity(&dict);
        let cfg = Config {
            max_band_bases: 500_000,
            norm_k_min: 3,
            r_min_bands: 2,
            break_rho: 0.2,
            ..Config::default()
        };
        let sites = RestrictionSites::new();
        let mut links = Vec::new();
        for offset in (0..900_000).step_by(10_000) {
            for d in [10_000u64, 20_000, 30_000] {
                links.push(ScaffoldLink {
                    scaffold_a: 0,
                    pos_a: offset,
                    scaffold_b: 0,
                    pos_b: offset + d,
                });
            }
        }
        let matrix = build_intra_matrix(&layout, 0, &cfg, &sites, 50_000, links.iter());
        let norm = crate::norm::fit(&[matrix.clone()], &cfg).expect("fit");
        let breaks = detect_internal_breaks(&matrix, &norm, &cfg);
        assert!(breaks.is_empty());
    }
}
