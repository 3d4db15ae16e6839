//! Property-style tests for the core invariants in spec.md §8.
use hicscaf::layout::{Layout, Orientation};
use hicscaf::link_matrix::build_intra_matrix;
use hicscaf::link_store::ScaffoldLink;
use hicscaf::norm::fit;
use hicscaf::config::Config;
use hicscaf::restriction::RestrictionSites;
use hicscaf::seq_dict::{PutResult, SeqDict};
use proptest::prelude::*;

proptest! {
    /// Invariant 1: dictionary bijection.
    #[test]
    fn prop_dictionary_bijection(names in prop::collection::vec("[a-z]{1,8}", 1..20)) {
        let mut dict = SeqDict::new();
        let mut seen = std::collections::HashSet::new();
        for (i, name) in names.iter().enumerate() {
            let result = dict.put(name, 1000 + i as u64);
            if seen.insert(name.clone()) {
                prop_assert!(matches!(result, PutResult::Index(_)));
            } else {
                prop_assert_eq!(result, PutResult::Duplicate);
            }
        }
        for id in 0..dict.len() as u32 {
            prop_assert_eq!(dict.get(dict.name(id)), Some(id));
            prop_assert!(id < dict.len() as u32);
        }
    }

    /// Invariant 2: coordinate round-trip through a single-contig identity layout, both
    /// orientations.
    #[test]
    fn prop_coordinate_round_trip(length in 10u64..100_000, pos in 0u64..10_000, reverse in any::<bool>()) {
        let pos = pos % length.max(1);
        let orientation = if reverse { Orientation::Reverse } else { Orientation::Forward };
        let mut layout = Layout::default();
        layout.add_scaffold(
            "ctg".to_string(),
            vec![hicscaf::layout::Component::Seq(hicscaf::layout::Segment {
                contig_id: 0,
                contig_start: 0,
                length,
                orientation,
                scaffold_offset: 0,
            })],
        );
        layout.finalize();

        let converted = layout.coord_convert(0, pos);
        prop_assert!(converted.is_some());
        let converted = converted.unwrap();
        let expected_offset = if reverse { length - 1 - pos } else { pos };
        prop_assert_eq!(converted.scaffold_pos, expected_offset);
    }

    /// Invariant 3: intra matrix symmetry.
    #[test]
    fn prop_matrix_symmetry(pairs in prop::collection::vec((0u64..90_000, 0u64..90_000), 0..50)) {
        let mut dict = SeqDict::new();
        dict.put("ctg", 100_000);
        let layout = Layout::identity(&dict);
        let config = Config { max_band_bases: 10_000, ..Config::default() };
        let sites = RestrictionSites::new();
        let links: Vec<ScaffoldLink> = pairs
            .into_iter()
            .map(|(a, b)| ScaffoldLink { scaffold_a: 0, pos_a: a, scaffold_b: 0, pos_b: b })
            .collect();
        let matrix = build_intra_matrix(&layout, 0, &config, &sites, 1000, links.iter());
        for i in 0..matrix.n_bins.min(50) {
            for j in i..(i + matrix.band + 1).min(matrix.n_bins) {
                prop_assert_eq!(matrix.get_count(i, j), matrix.get_count(j, i));
            }
        }
    }
}

#[test]
fn prop_norm_monotonicity_holds_on_a_decaying_profile() {
    let mut dict = SeqDict::new();
    dict.put("ctg", 20_000);
    let layout = Layout::identity(&dict);
    let config = Config {
        max_band_bases: 1_000,
        norm_k_min: 2,
        r_min_bands: 2,
        ..Config::default()
    };
    let sites = RestrictionSites::new();
    let mut links = Vec::new();
    for d in 0..10usize {
        let count = 40usize.saturating_sub(d * 3);
        for k in 0..count {
            links.push(ScaffoldLink {
                scaffold_a: 0,
                pos_a: (k as u64 * 97) % 19_000,
                scaffold_b: 0,
                pos_b: ((k as u64 * 97) % 19_000) + (d as u64) * 100,
            });
        }
    }
    let matrix = build_intra_matrix(&layout, 0, &config, &sites, 100, links.iter());
    let model = fit(&[matrix], &config).expect("fit should succeed");
    for d in 0..model.r_max() {
        assert!(model.expected(d as u32) >= model.expected(d as u32 + 1));
    }
}
