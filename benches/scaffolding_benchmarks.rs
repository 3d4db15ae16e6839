/// Performance benchmarks for the scaffolding pipeline's per-round hot paths.
///
/// Run with: cargo bench
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hicscaf::config::Config;
use hicscaf::layout::Layout;
use hicscaf::link_matrix::{build_inter_matrix, build_intra_matrix};
use hicscaf::link_store::ScaffoldLink;
use hicscaf::norm::fit;
use hicscaf::restriction::RestrictionSites;
use hicscaf::seq_dict::SeqDict;

fn synthetic_links(scaffold_id: u32, count: usize, contig_len: u64) -> Vec<ScaffoldLink> {
    (0..count)
        .map(|i| {
            let pos_a = (i as u64 * 997) % contig_len;
            let pos_b = (pos_a + (i as u64 * 131) % 50_000).min(contig_len - 1);
            ScaffoldLink { scaffold_a: scaffold_id, pos_a, scaffold_b: scaffold_id, pos_b }
        })
        .collect()
}

/// Benchmark: intra-matrix construction at a fixed resolution, scaling link count.
fn bench_build_intra_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_intra_matrix");
    let mut dict = SeqDict::new();
    dict.put("ctg", 5_000_000);
    let layout = Layout::identity(&dict);
    let config = Config { max_band_bases: 200_000, ..Config::default() };
    let sites = RestrictionSites::new();

    for &count in [1_000usize, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(count as u64));
        let links = synthetic_links(0, count, 5_000_000);
        group.bench_with_input(BenchmarkId::from_parameter(count), &links, |b, links| {
            b.iter(|| {
                black_box(build_intra_matrix(&layout, 0, &config, &sites, 10_000, links.iter()))
            });
        });
    }
    group.finish();
}

/// Benchmark: distance-decay curve fitting, scaling scaffold count (one matrix each).
fn bench_norm_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("norm_fit");
    let config = Config { max_band_bases: 200_000, norm_k_min: 2, r_min_bands: 2, ..Config::default() };
    let sites = RestrictionSites::new();

    for &n_scaffolds in [1usize, 8, 32].iter() {
        let mut dict = SeqDict::new();
        for i in 0..n_scaffolds {
            dict.put(&format!("ctg{i}"), 2_000_000);
        }
        let layout = Layout::identity(&dict);
        let matrices: Vec<_> = (0..n_scaffolds as u32)
            .map(|id| {
                let links = synthetic_links(id, 5_000, 2_000_000);
                build_intra_matrix(&layout, id, &config, &sites, 10_000, links.iter())
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(n_scaffolds), &matrices, |b, matrices| {
            b.iter(|| black_box(fit(matrices, &config).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark: inter-scaffold matrix assembly, scaling scaffold count.
fn bench_build_inter_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_inter_matrix");
    let config = Config { max_band_bases: 200_000, norm_k_min: 1, r_min_bands: 1, ..Config::default() };
    let sites = RestrictionSites::new();

    for &n_scaffolds in [2usize, 8, 16].iter() {
        let mut dict = SeqDict::new();
        for i in 0..n_scaffolds {
            dict.put(&format!("ctg{i}"), 500_000);
        }
        let layout = Layout::identity(&dict);
        let mut links = Vec::new();
        for i in 0..n_scaffolds as u32 {
            let j = (i + 1) % n_scaffolds as u32;
            for k in 0..200u64 {
                links.push(ScaffoldLink { scaffold_a: i, pos_a: 490_000 + k, scaffold_b: j, pos_b: k });
            }
        }
        let norm = {
            let matrices: Vec<_> = (0..n_scaffolds as u32)
                .map(|id| build_intra_matrix(&layout, id, &config, &sites, 10_000, links.iter()))
                .collect();
            fit(&matrices, &config).unwrap()
        };

        group.bench_with_input(BenchmarkId::from_parameter(n_scaffolds), &links, |b, links| {
            b.iter(|| {
                black_box(build_inter_matrix(&layout, &config, 10_000, links.iter(), |d| {
                    norm.expected(d)
                }))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_intra_matrix, bench_norm_fit, bench_build_inter_matrix);
criterion_main!(benches);
