//! S3 from spec.md §8: a mis-assembled contig whose two halves share no cross-pairs
//! should yield a single break near the midpoint.
use hicscaf::break_detect::detect_internal_breaks;
use hicscaf::config::Config;
use hicscaf::layout::Layout;
use hicscaf::link_matrix::build_intra_matrix;
use hicscaf::link_store::ScaffoldLink;
use hicscaf::norm::fit;
use hicscaf::restriction::RestrictionSites;
use hicscaf::seq_dict::SeqDict;

#[test]
fn s3_mis_assembly_break_near_midpoint() {
    let mut dict = SeqDict::new();
    dict.put("ctg", 2_000_000);
    let layout = Layout::identity(&dict);
    let config = Config {
        max_band_bases: 500_000,
        norm_k_min: 3,
        r_min_bands: 2,
        break_rho: 0.4,
        ..Config::default()
    };
    let sites = RestrictionSites::new();

    let mut links = Vec::new();
    for half_start in [0u64, 1_000_000] {
        for offset in (0..900_000).step_by(15_000) {
            links.push(ScaffoldLink {
                scaffold_a: 0,
                pos_a: half_start + offset,
                scaffold_b: 0,
                pos_b: half_start + offset + 40_000,
            });
        }
    }

    let matrix = build_intra_matrix(&layout, 0, &config, &sites, 50_000, links.iter());
    let norm = fit(&[matrix.clone()], &config).expect("normalization curve should fit");
    let breaks = detect_internal_breaks(&matrix, &norm, &config);

    assert!(!breaks.is_empty(), "expected the mis-assembly to register as a break candidate");
    let midpoint_bin = 1_000_000 / 50_000;
    assert!(breaks.iter().any(|b| (b.bin as i64 - midpoint_bin as i64).abs() <= 3));
}

#[test]
fn break_detection_is_idempotent_on_a_clean_profile() {
    // Re-running the scan against a profile with no mis-join should find nothing on
    // either pass (spec.md §8 property 6).
    let mut dict = SeqDict::new();
    dict.put("ctg", 1_000_000);
    let layout = Layout::identity(&dict);
    let config = Config {
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

    let matrix = build_intra_matrix(&layout, 0, &config, &sites, 50_000, links.iter());
    let norm = fit(&[matrix.clone()], &config).expect("fit");
    let first_pass = detect_internal_breaks(&matrix, &norm, &config);
    let second_pass = detect_internal_breaks(&matrix, &norm, &config);
    assert!(first_pass.is_empty());
    assert!(second_pass.is_empty());
}
