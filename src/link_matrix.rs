/// Link matrix engine: intra-sequence banded count matrices with restriction-site and
/// area normalization, and sparse inter-sequence end-flank scores (spec.md §4.3).
use crate::config::Config;
use crate::layout::{Component, Layout, Scaffold};
use crate::link_store::ScaffoldLink;
use crate::restriction::RestrictionSites;
use std::collections::HashMap;

/// Bytes charged per matrix cell in the memory estimator (count + denominator, both
/// `f64`) — spec.md §4.3.
const CELL_BYTES: u64 = 16;

/// A banded, symmetric intra-sequence count/denominator matrix for one scaffold.
/// Only cells with `|i-j| <= band` are stored; `get_count`/`get_denom` always look the
/// pair up via `(min, max)` so the query view is symmetric by construction (spec.md §8
/// property 3).
#[derive(Debug, Clone)]
pub struct IntraMatrix {
    pub scaffold_id: u32,
    pub resolution: u32,
    pub n_bins: usize,
    pub band: usize,
    counts: Vec<Vec<f64>>,
    denom: Vec<Vec<f64>>,
    pub effective_size: Vec<f64>,
    pub cut_sites: Vec<f64>,
}

impl IntraMatrix {
    fn new(scaffold_id: u32, resolution: u32, n_bins: usize, band: usize) -> Self {
        let counts = (0..n_bins)
            .map(|i| vec![0.0; (band + 1).min(n_bins - i)])
            .collect();
        let denom = (0..n_bins)
            .map(|i| vec![0.0; (band + 1).min(n_bins - i)])
            .collect();
        IntraMatrix {
            scaffold_id,
            resolution,
            n_bins,
            band,
            counts,
            denom,
            effective_size: vec![0.0; n_bins],
            cut_sites: vec![0.0; n_bins],
        }
    }

    fn add_pair(&mut self, i: usize, j: usize) {
        let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
        let k = hi - lo;
        if k <= self.band {
            self.counts[lo][k] += 1.0;
        }
    }

    pub fn get_count(&self, i: usize, j: usize) -> f64 {
        let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
        let k = hi - lo;
        if k <= self.band && lo < self.counts.len() {
            self.counts[lo][k]
        } else {
            0.0
        }
    }

    pub fn get_denom(&self, i: usize, j: usize) -> f64 {
        let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
        let k = hi - lo;
        if k <= self.band && lo < self.denom.len() {
            self.denom[lo][k]
        } else {
            0.0
        }
    }

    pub fn is_no_data(&self, i: usize, j: usize, epsilon: f64) -> bool {
        self.get_denom(i, j) < epsilon
    }

    fn set_denom(&mut self, i: usize, k: usize, value: f64) {
        self.denom[i][k] = value;
    }

    /// Iterate over every stored `(i, j, count, denom)` cell, `i <= j`.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, f64, f64)> + '_ {
        self.counts.iter().enumerate().flat_map(move |(i, row)| {
            row.iter()
                .enumerate()
                .map(move |(k, &c)| (i, i + k, c, self.denom[i][k]))
        })
    }
}

/// Per-bin effective size: bin width minus the portion covered by gaps (spec.md §4.3).
fn compute_effective_sizes(scaffold: &Scaffold, resolution: u32, n_bins: usize) -> Vec<f64> {
    let r = resolution as u64;
    let mut eff = vec![0.0f64; n_bins];
    for i in 0..n_bins {
        let bin_start = i as u64 * r;
        let bin_end = (bin_start + r).min(scaffold.length);
        eff[i] = (bin_end - bin_start) as f64;
    }
    for component in &scaffold.components {
        if let Component::Gap(gap) = component {
            let gap_start = gap.scaffold_offset;
            let gap_end = gap.scaffold_offset + gap.length;
            let first_bin = (gap_start / r) as usize;
            let last_bin = ((gap_end.saturating_sub(1)) / r) as usize;
            for bin in first_bin..=last_bin.min(n_bins.saturating_sub(1)) {
                let bin_start = bin as u64 * r;
                let bin_end = (bin_start + r).min(scaffold.length);
                let ov_start = gap_start.max(bin_start);
                let ov_end = gap_end.min(bin_end);
                if ov_end > ov_start {
                    eff[bin] -= (ov_end - ov_start) as f64;
                }
            }
        }
    }
    for v in eff.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
    eff
}

fn compute_cut_sites(
    layout: &Layout,
    scaffold_id: u32,
    scaffold: &Scaffold,
    resolution: u32,
    n_bins: usize,
    sites: &RestrictionSites,
) -> Vec<f64> {
    let r = resolution as u64;
    (0..n_bins)
        .map(|i| {
            let start = i as u64 * r;
            let end = ((i as u64 + 1) * r).min(scaffold.length);
            sites.count_in_scaffold_range(layout, scaffold_id, start, end) as f64
        })
        .collect()
}

pub fn n_bins_for(length: u64, resolution: u32) -> usize {
    ((length + resolution as u64 - 1) / resolution as u64).max(1) as usize
}

/// Allocate and accumulate the intra matrix for one scaffold by scanning `links`
/// (already converted and restricted to this scaffold's coordinate space). Denominators
/// are filled in from effective size and, when `sites` carries any motif, restriction
/// cut-site counts (spec.md §4.3).
pub fn build_intra_matrix<'a>(
    layout: &Layout,
    scaffold_id: u32,
    config: &Config,
    sites: &RestrictionSites,
    resolution: u32,
    links: impl Iterator<Item = &'a ScaffoldLink>,
) -> IntraMatrix {
    let scaffold = &layout.scaffolds[scaffold_id as usize];
    let n_bins = n_bins_for(scaffold.length, resolution);
    let band = config.band_bins(resolution);
    let mut matrix = IntraMatrix::new(scaffold_id, resolution, n_bins, band);

    for link in links {
        if link.scaffold_a != scaffold_id || link.scaffold_b != scaffold_id {
            continue;
        }
        let i = ((link.pos_a / resolution as u64) as usize).min(n_bins - 1);
        let j = ((link.pos_b / resolution as u64) as usize).min(n_bins - 1);
        matrix.add_pair(i, j);
    }

    matrix.effective_size = compute_effective_sizes(scaffold, resolution, n_bins);
    matrix.cut_sites = compute_cut_sites(layout, scaffold_id, scaffold, resolution, n_bins, sites);

    let enzymes_configured = !sites.is_empty();
    for i in 0..n_bins {
        let max_k = (band + 1).min(n_bins - i);
        for k in 0..max_k {
            let j = i + k;
            let eff = matrix.effective_size[i].min(matrix.effective_size[j]);
            let value = if enzymes_configured {
                let cuts = matrix.cut_sites[i].min(matrix.cut_sites[j]);
                eff * cuts
            } else {
                matrix.effective_size[i] * matrix.effective_size[j]
            };
            matrix.set_denom(i, k, value);
        }
    }

    matrix
}

/// Conservative upper-bound byte estimate for building every scaffold's intra matrix at
/// `resolution`, without allocating anything (spec.md §4.3).
pub fn estimate_intra_bytes(layout: &Layout, resolution: u32, band: usize) -> u64 {
    layout
        .scaffolds
        .iter()
        .map(|s| {
            let n_bins = n_bins_for(s.length, resolution) as u64;
            n_bins.saturating_mul((band + 1) as u64).saturating_mul(CELL_BYTES)
        })
        .sum()
}

/// Conservative upper-bound byte estimate for the sparsified inter-sequence matrix:
/// `N * N * 4 * sizeof(cell)` (spec.md §4.3).
pub fn estimate_inter_bytes(n_scaffolds: usize) -> u64 {
    (n_scaffolds as u64)
        .saturating_mul(n_scaffolds as u64)
        .saturating_mul(4)
        .saturating_mul(CELL_BYTES)
}

/// Which end of a scaffold a position falls within the configured flank, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndSide {
    Five,
    Three,
}

fn classify_end(pos: u64, scaffold_len: u64, flank: u64) -> Option<(EndSide, u64)> {
    if pos < flank {
        Some((EndSide::Five, pos))
    } else if pos >= scaffold_len.saturating_sub(flank) {
        Some((EndSide::Three, scaffold_len - 1 - pos))
    } else {
        None
    }
}

/// One of the four `(end_a, end_b)` orientation buckets for an unordered scaffold pair
/// `(lo, hi)`, `lo < hi` (spec.md §3, §4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct InterBucket {
    pub raw_count: f64,
    pub denom: f64,
    pub normalized: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaffoldPairKey {
    pub lo: u32,
    pub hi: u32,
}

/// `buckets[0] = (5',5'), [1] = (5',3'), [2] = (3',5'), [3] = (3',3')`, all relative to
/// `(lo, hi)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterEntry {
    pub buckets: [InterBucket; 4],
}

fn bucket_index(end_lo: EndSide, end_hi: EndSide) -> usize {
    match (end_lo, end_hi) {
        (EndSide::Five, EndSide::Five) => 0,
        (EndSide::Five, EndSide::Three) => 1,
        (EndSide::Three, EndSide::Five) => 2,
        (EndSide::Three, EndSide::Three) => 3,
    }
}

/// Build the sparse inter-sequence matrix from the scanned links and a fitted
/// normalization curve, after the intra build and fit have completed (spec.md §4.3).
/// `expected: impl Fn(u32) -> f64` returns `E[d]` for bin-distance `d` (clamped to
/// `r_max` by the caller, `norm.rs`).
pub fn build_inter_matrix<'a>(
    layout: &Layout,
    config: &Config,
    resolution: u32,
    links: impl Iterator<Item = &'a ScaffoldLink>,
    expected: impl Fn(u32) -> f64,
) -> HashMap<ScaffoldPairKey, InterEntry> {
    let flank = config.flank as u64;
    let mut entries: HashMap<ScaffoldPairKey, InterEntry> = HashMap::new();

    for link in links {
        if link.scaffold_a == link.scaffold_b {
            continue;
        }
        let (lo_id, lo_pos, hi_id, hi_pos) = if link.scaffold_a < link.scaffold_b {
            (link.scaffold_a, link.pos_a, link.scaffold_b, link.pos_b)
        } else {
            (link.scaffold_b, link.pos_b, link.scaffold_a, link.pos_a)
        };
        let lo_len = layout.scaffolds[lo_id as usize].length;
        let hi_len = layout.scaffolds[hi_id as usize].length;

        let Some((end_lo, _)) = classify_end(lo_pos, lo_len, flank) else {
            continue;
        };
        let Some((end_hi, _)) = classify_end(hi_pos, hi_len, flank) else {
            continue;
        };

        let key = ScaffoldPairKey { lo: lo_id, hi: hi_id };
        let entry = entries.entry(key).or_default();
        entry.buckets[bucket_index(end_lo, end_hi)].raw_count += 1.0;
    }

    for (key, entry) in entries.iter_mut() {
        let lo_len = layout.scaffolds[key.lo as usize].length;
        let hi_len = layout.scaffolds[key.hi as usize].length;
        let n_flank_lo = n_bins_for(lo_len.min(flank), resolution);
        let n_flank_hi = n_bins_for(hi_len.min(flank), resolution);

        for bucket in entry.buckets.iter_mut() {
            let mut denom = 0.0;
            for oa in 0..n_flank_lo {
                for ob in 0..n_flank_hi {
                    let d_eff = (oa + ob + 1) as u32;
                    denom += expected(d_eff);
                }
            }
            bucket.denom = denom;
            bucket.normalized = if denom > 0.0 {
                bucket.raw_count / denom
            } else {
                0.0
            };
        }
    }

    // Pairs with zero pairs inside the flank are omitted entirely (spec.md §4.3).
    entries.retain(|_, e| e.buckets.iter().any(|b| b.raw_count > 0.0));
    entries
}

/// Translate a bucket's `(end_lo, end_hi)` orientation into the oriented-end semantics
/// used by the scaffolding graph: which physical end of each scaffold the edge attaches
/// to, and what orientation each scaffold must take for that end to face the join.
pub fn bucket_orientation(bucket_idx: usize) -> (EndSide, EndSide) {
    match bucket_idx {
        0 => (EndSide::Five, EndSide::Five),
        1 => (EndSide::Five, EndSide::Three),
        2 => (EndSide::Three, EndSide::Five),
        _ => (EndSide::Three, EndSide::Three),
    }
}
