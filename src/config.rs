/// Global configuration record threaded into every component by reference. There is no
/// process-wide mutable state (spec.md §9): a component only ever sees the slice of
/// `Config` it needs, passed explicitly, the same way the teacher crate threads
/// `FilterConfig` into `FilterEngine`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bin resolutions to scaffold at, ascending (bases per bin).
    pub resolutions: Vec<u32>,
    /// Bin resolution used for the initial contig-break pass.
    pub ec_resolution: u32,
    /// Fixed genomic window in bases (D_max) stored in the intra band matrix. The
    /// stored band width in bins is `D_max / r` at each round's resolution `r`, so it
    /// shrinks as `r` grows across the ascending `resolutions` list (spec.md §3, §4.3).
    pub max_band_bases: u64,
    /// Flank width (bases) used for inter-scaffold end scoring and joint-break checks.
    pub flank: u32,
    /// Minimum mapq for a link record to be counted.
    pub min_mapq: u8,
    /// Minimum contig length kept in the dictionary; shorter contigs are excluded until
    /// finalization, then merged back unscaffolded.
    pub min_contig_length: u64,
    /// Minimum sample count per bin-distance bucket to fit the normalization curve.
    pub norm_k_min: usize,
    /// Smallest number of retained bin-distance bands required to trust a fit.
    pub r_min_bands: usize,
    /// Denominator floor below which a matrix cell is marked no-data.
    pub epsilon: f64,
    /// Break-detector drop ratio against the running mean (rho).
    pub break_rho: f64,
    /// Distance (bins) within which adjacent break candidates are coalesced.
    pub break_merge_thresh: u32,
    /// Distance (bins) within which two symmetric drops become one dual break.
    pub dual_break_thresh: u32,
    /// Simple-filter dominance ratio (alpha): drop arcs under alpha * best.
    pub alpha: f64,
    /// Simple-filter second-best/best ratio ceiling (beta); also used by ambiguous trim.
    pub beta: f64,
    /// Simple-filter alternative-path dominance margin (gamma).
    pub gamma: f64,
    /// Transitive-reduction slack factor (tau).
    pub tau: f64,
    /// Weak-edge absolute weight floor (delta).
    pub delta: f64,
    /// Minimum normalized score for an edge to be created at all (theta_min).
    pub theta_min: f64,
    /// Nominal AGP gap length in bases.
    pub gap_length: u32,
    /// Resident-set budget, in bytes, checked before each matrix build.
    pub rss_limit_bytes: u64,
    /// Hard ceiling on scaffold count; exceeding it aborts the run.
    pub scaffold_ceiling: usize,
    /// Whether the initial contig-break stage runs at all.
    pub run_contig_break: bool,
    /// Whether scaffold-joint break detection runs after each scaffolding round.
    pub run_scaffold_break: bool,
    /// Whether the memory estimator is consulted before each build.
    pub check_memory: bool,
    /// Restriction-enzyme motifs (already expanded, `N` resolved to A/C/G/T), or empty
    /// when no enzyme normalization is configured.
    pub enzyme_motifs: Vec<String>,
}

impl Config {
    /// Band width in bins at `resolution`: `D_max / r`, floored to at least one bin so
    /// a band always exists even at the coarsest configured resolution.
    pub fn band_bins(&self, resolution: u32) -> usize {
        (self.max_band_bases / resolution as u64).max(1) as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            resolutions: vec![25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000],
            ec_resolution: 10_000,
            max_band_bases: 2_000_000,
            flank: 1_000_000,
            min_mapq: 1,
            min_contig_length: 10_000,
            norm_k_min: 30,
            r_min_bands: 3,
            epsilon: 1e-9,
            break_rho: 0.2,
            break_merge_thresh: 2,
            dual_break_thresh: 5,
            alpha: 0.1,
            beta: 0.7,
            gamma: 0.1,
            tau: 1.0,
            delta: 1e-6,
            theta_min: 0.1,
            gap_length: 100,
            rss_limit_bytes: 32 * 1024 * 1024 * 1024,
            scaffold_ceiling: 45_000,
            run_contig_break: true,
            run_scaffold_break: true,
            check_memory: true,
            enzyme_motifs: Vec::new(),
        }
    }
}

/// Expand a restriction-enzyme motif string into concrete `{A,C,G,T}` motifs, resolving
/// each `N` into all four bases (spec.md §9, "pure pre-processing step on the motif
/// list"). Motifs are comma-separated on input (spec.md §6).
pub fn expand_enzyme_motifs(spec: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in spec.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let mut variants = vec![String::new()];
        for ch in raw.chars().map(|c| c.to_ascii_uppercase()) {
            if ch == 'N' {
                let mut next = Vec::with_capacity(variants.len() * 4);
                for v in &variants {
                    for base in ['A', 'C', 'G', 'T'] {
                        let mut s = v.clone();
                        s.push(base);
                        next.push(s);
                    }
                }
                variants = next;
            } else {
                for v in variants.iter_mut() {
                    v.push(ch);
                }
            }
        }
        out.extend(variants);
    }
    out.sort();
    out.dedup();
    out
}
