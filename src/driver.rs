/// Pipeline driver: the top-level state machine spec.md §4.7 describes — an initial
/// contig-break loop, then ascending-resolution scaffolding rounds with memory/band
/// escalation, then finalization.
use crate::break_detect::{detect_internal_breaks, detect_joint_breaks, BreakPoint};
use crate::config::Config;
use crate::error::CoreError;
use crate::layout::{Component, Gap, Layout, Orientation, Scaffold, Segment};
use crate::link_matrix::{build_inter_matrix, build_intra_matrix, estimate_inter_bytes, estimate_intra_bytes};
use crate::link_store::ScaffoldLink;
use crate::norm::{fit, NormModel};
use crate::restriction::RestrictionSites;
use crate::seq_dict::SeqDict;
use anyhow::Result;
use log::{info, warn};
use rayon::prelude::*;

pub struct RunReport {
    pub contig_break_rounds: usize,
    pub scaffold_rounds: usize,
    pub final_resolution: u32,
    pub scaffold_count: usize,
}

/// Drive the full pipeline over an already-loaded sequence dictionary and the full set
/// of converted links (kept in memory here for simplicity; spec.md §4.2 allows a
/// streaming re-scan per round, which a production driver would do instead of cloning
/// this vector on every layout change).
pub fn run(
    dict: &SeqDict,
    mut links: Vec<ScaffoldLink>,
    sites: &RestrictionSites,
    config: &Config,
) -> Result<(Layout, RunReport)> {
    let mut layout = Layout::identity(dict);
    let mut contig_break_rounds = 0usize;

    if config.run_contig_break {
        loop {
            check_memory_budget(&layout, config.ec_resolution, config)?;
            let breaks = scan_for_internal_breaks(&layout, sites, config, &links)?;
            if breaks.is_empty() {
                break;
            }
            let new_layout = apply_breaks(&layout, config, &breaks);
            links = reconvert_links(&layout, &new_layout, &links);
            layout = new_layout;
            contig_break_rounds += 1;
            info!("contig-break round {contig_break_rounds}: {} cuts applied", breaks.len());
        }
    }

    let mut scaffold_rounds = 0usize;
    let mut final_resolution = config.resolutions.first().copied().unwrap_or(config.ec_resolution);

    for &resolution in &config.resolutions {
        if layout.scaffolds.len() > config.scaffold_ceiling {
            return Err(CoreError::SeqLimit {
                count: layout.scaffolds.len(),
                ceiling: config.scaffold_ceiling,
            }
            .into());
        }

        match run_scaffold_round(&layout, dict, sites, config, resolution, &links) {
            Ok(new_layout) => {
                links = reconvert_links(&layout, &new_layout, &links);
                layout = new_layout;
                scaffold_rounds += 1;
                final_resolution = resolution;

                if config.run_scaffold_break {
                    let joint_breaks = scan_for_joint_breaks(&layout, sites, config, &links)?;
                    if !joint_breaks.is_empty() {
                        let broken_layout = apply_breaks(&layout, config, &joint_breaks);
                        links = reconvert_links(&layout, &broken_layout, &links);
                        layout = broken_layout;
                        warn!("scaffold-joint break: {} joins reverted", joint_breaks.len());
                    }
                }
            }
            Err(err) => match downcast_core_error(&err) {
                Some(CoreError::NoMem { .. }) | Some(CoreError::NoBands { .. }) => {
                    warn!("resolution {resolution} skipped: {err}");
                    continue;
                }
                _ => return Err(err),
            },
        }
    }

    layout.sort_by_length_desc();
    let scaffold_count = layout.scaffolds.len();

    Ok((
        layout,
        RunReport {
            contig_break_rounds,
            scaffold_rounds,
            final_resolution,
            scaffold_count,
        },
    ))
}

fn downcast_core_error(err: &anyhow::Error) -> Option<&CoreError> {
    crate::error::downcast(err)
}

fn check_memory_budget(layout: &Layout, resolution: u32, config: &Config) -> Result<(), CoreError> {
    if !config.check_memory {
        return Ok(());
    }
    let band = config.band_bins(resolution);
    let bytes = estimate_intra_bytes(layout, resolution, band)
        + estimate_inter_bytes(layout.scaffolds.len());
    if bytes > config.rss_limit_bytes {
        return Err(CoreError::NoMem {
            stage: format!("resolution {resolution}"),
            estimate_bytes: bytes,
            limit_bytes: config.rss_limit_bytes,
        });
    }
    Ok(())
}

fn scan_for_internal_breaks(
    layout: &Layout,
    sites: &RestrictionSites,
    config: &Config,
    links: &[ScaffoldLink],
) -> Result<Vec<BreakPoint>> {
    let mut all_breaks = Vec::new();
    for (scaffold_id, _scaffold) in layout.scaffolds.iter().enumerate() {
        let scaffold_id = scaffold_id as u32;
        let matrix = build_intra_matrix(
            layout,
            scaffold_id,
            config,
            sites,
            config.ec_resolution,
            links.iter(),
        );
        let norm = match fit(&[matrix.clone()], config) {
            Ok(n) => n,
            Err(CoreError::NoBands { .. }) => continue,
            Err(other) => return Err(other.into()),
        };
        all_breaks.extend(detect_internal_breaks(&matrix, &norm, config));
    }
    Ok(all_breaks)
}

fn scan_for_joint_breaks(
    layout: &Layout,
    sites: &RestrictionSites,
    config: &Config,
    links: &[ScaffoldLink],
) -> Result<Vec<BreakPoint>> {
    let mut all_breaks = Vec::new();
    for (scaffold_id, _scaffold) in layout.scaffolds.iter().enumerate() {
        let scaffold_id = scaffold_id as u32;
        let matrix = build_intra_matrix(
            layout,
            scaffold_id,
            config,
            sites,
            config.ec_resolution,
            links.iter(),
        );
        let norm = match fit(&[matrix.clone()], config) {
            Ok(n) => n,
            Err(CoreError::NoBands { .. }) => continue,
            Err(other) => return Err(other.into()),
        };
        all_breaks.extend(detect_joint_breaks(layout, &matrix, &norm, config));
    }
    Ok(all_breaks)
}

/// Rebuild the layout with each flagged scaffold split at its break points' bin
/// boundaries (converted to scaffold-offset coordinates via `config.ec_resolution`, the
/// resolution both break scans run at), in source-contig coordinates; every untouched
/// scaffold and join carries over unchanged (spec.md §4.5 "emit cuts in source-contig
/// coordinates", §4.7).
fn apply_breaks(layout: &Layout, config: &Config, breaks: &[BreakPoint]) -> Layout {
    use std::collections::HashMap;
    let mut by_scaffold: HashMap<u32, Vec<usize>> = HashMap::new();
    for b in breaks {
        by_scaffold.entry(b.scaffold_id).or_default().push(b.bin);
    }

    let mut new_layout = Layout::default();
    for (scaffold_id, scaffold) in layout.scaffolds.iter().enumerate() {
        match by_scaffold.get(&(scaffold_id as u32)) {
            None => {
                new_layout.add_scaffold(scaffold.name.clone(), scaffold.components.clone());
            }
            Some(bins) => {
                let fragments = split_scaffold_at_bins(scaffold, config.ec_resolution as u64, bins);
                for (k, components) in fragments.into_iter().enumerate() {
                    new_layout.add_scaffold(format!("{}_brk{k}", scaffold.name), components);
                }
            }
        }
    }
    new_layout.finalize();
    new_layout
}

fn component_scaffold_start(c: &Component) -> u64 {
    match c {
        Component::Seq(s) => s.scaffold_offset,
        Component::Gap(g) => g.scaffold_offset,
    }
}

fn component_length(c: &Component) -> u64 {
    match c {
        Component::Seq(s) => s.length,
        Component::Gap(g) => g.length,
    }
}

/// Split a component at an absolute scaffold offset `cut` that is guaranteed (by the
/// caller) to fall strictly inside it, re-expressing each half in its own original
/// coordinate system (contig coordinates for a `Seq`, gap length for a `Gap`). A
/// reversed segment's earliest scaffold positions map to its *highest* contig
/// coordinates, so the left half there takes the tail of the contig range.
fn split_component(c: &Component, start: u64, cut: u64) -> (Component, Component) {
    let offset = cut - start;
    match c {
        Component::Seq(seg) => {
            let (left, right) = match seg.orientation {
                Orientation::Forward => (
                    Segment { contig_id: seg.contig_id, contig_start: seg.contig_start, length: offset, orientation: seg.orientation, scaffold_offset: 0 },
                    Segment { contig_id: seg.contig_id, contig_start: seg.contig_start + offset, length: seg.length - offset, orientation: seg.orientation, scaffold_offset: 0 },
                ),
                Orientation::Reverse => (
                    Segment { contig_id: seg.contig_id, contig_start: seg.contig_start + (seg.length - offset), length: offset, orientation: seg.orientation, scaffold_offset: 0 },
                    Segment { contig_id: seg.contig_id, contig_start: seg.contig_start, length: seg.length - offset, orientation: seg.orientation, scaffold_offset: 0 },
                ),
            };
            (Component::Seq(left), Component::Seq(right))
        }
        Component::Gap(gap) => (
            Component::Gap(Gap { length: offset, scaffold_offset: 0 }),
            Component::Gap(Gap { length: gap.length - offset, scaffold_offset: 0 }),
        ),
    }
}

fn push_with_offset(fragment: &mut Vec<Component>, c: Component, offset: u64) {
    let positioned = match c {
        Component::Seq(mut s) => {
            s.scaffold_offset = offset;
            Component::Seq(s)
        }
        Component::Gap(mut g) => {
            g.scaffold_offset = offset;
            Component::Gap(g)
        }
    };
    fragment.push(positioned);
}

/// Cut `scaffold`'s component list into independent fragments at each `bin *
/// resolution` boundary, clamped to the scaffold's interior; each fragment's
/// `scaffold_offset`s are renumbered from zero. A cut landing exactly on an existing
/// component boundary just closes out the fragment there without splitting anything.
fn split_scaffold_at_bins(scaffold: &Scaffold, resolution: u64, bins: &[usize]) -> Vec<Vec<Component>> {
    let mut cuts: Vec<u64> = bins
        .iter()
        .map(|&b| b as u64 * resolution.max(1))
        .filter(|&p| p > 0 && p < scaffold.length)
        .collect();
    cuts.sort_unstable();
    cuts.dedup();
    if cuts.is_empty() {
        return vec![scaffold.components.clone()];
    }

    let mut fragments: Vec<Vec<Component>> = Vec::new();
    let mut current: Vec<Component> = Vec::new();
    let mut local_offset: u64 = 0;
    let mut cut_idx = 0usize;

    for component in &scaffold.components {
        let mut remaining = component.clone();
        let mut remaining_start = component_scaffold_start(component);

        if cuts.get(cut_idx) == Some(&remaining_start) {
            fragments.push(std::mem::take(&mut current));
            local_offset = 0;
            cut_idx += 1;
        }

        loop {
            let remaining_len = component_length(&remaining);
            let comp_end = remaining_start + remaining_len;
            let at_cut = cuts
                .get(cut_idx)
                .copied()
                .filter(|&cp| cp > remaining_start && cp < comp_end);
            match at_cut {
                None => {
                    push_with_offset(&mut current, remaining, local_offset);
                    local_offset += remaining_len;
                    break;
                }
                Some(cut_pos) => {
                    let (left, right) = split_component(&remaining, remaining_start, cut_pos);
                    push_with_offset(&mut current, left, local_offset);
                    fragments.push(std::mem::take(&mut current));
                    local_offset = 0;
                    remaining_start = cut_pos;
                    remaining = right;
                    cut_idx += 1;
                }
            }
        }
    }
    fragments.push(current);
    fragments.into_iter().filter(|f| !f.is_empty()).collect()
}

/// Re-express every link's scaffold-space coordinates against `new_layout` by routing
/// them through the stable underlying contig coordinate space both layouts share
/// (spec.md §4.5, §4.7): a break or join changes scaffold boundaries, but never drops or
/// moves a contig base, so every link that was valid under `old_layout` converts cleanly.
fn reconvert_links(old_layout: &Layout, new_layout: &Layout, links: &[ScaffoldLink]) -> Vec<ScaffoldLink> {
    links
        .iter()
        .filter_map(|link| {
            let (contig_a, pos_a) = old_layout.scaffold_to_contig(link.scaffold_a, link.pos_a)?;
            let (contig_b, pos_b) = old_layout.scaffold_to_contig(link.scaffold_b, link.pos_b)?;
            let a = new_layout.coord_convert(contig_a, pos_a)?;
            let b = new_layout.coord_convert(contig_b, pos_b)?;
            Some(ScaffoldLink {
                scaffold_a: a.scaffold_id,
                pos_a: a.scaffold_pos,
                scaffold_b: b.scaffold_id,
                pos_b: b.scaffold_pos,
            })
        })
        .collect()
}

fn run_scaffold_round(
    layout: &Layout,
    _dict: &SeqDict,
    sites: &RestrictionSites,
    config: &Config,
    resolution: u32,
    links: &[ScaffoldLink],
) -> Result<Layout> {
    check_memory_budget(layout, resolution, config)?;

    // Each scaffold's intra matrix is independent of the others, so this fans out
    // across cores the same way the teacher parallelizes its per-pair filtering work.
    let matrices: Vec<_> = (0..layout.scaffolds.len() as u32)
        .into_par_iter()
        .map(|scaffold_id| build_intra_matrix(layout, scaffold_id, config, sites, resolution, links.iter()))
        .collect();

    let norm = fit(&matrices, config)?;

    let inter = build_inter_matrix(layout, config, resolution, links.iter(), |d| norm.expected(d));
    let mut graph = crate::graph::build_graph(layout.scaffolds.len() as u32, &inter, &norm, config);
    graph.prune_to_convergence(config);
    graph.trim_ambiguous(config);
    let paths = graph.extract_paths(layout.scaffolds.len() as u32);

    Ok(materialize_layout(layout, &paths, config))
}

/// Turn a set of oriented-scaffold-end paths into a new layout: each path becomes one
/// scaffold, its member (sub-)scaffolds concatenated with a nominal gap between them
/// (spec.md §4.1, §4.6).
fn materialize_layout(
    old: &Layout,
    paths: &[Vec<(u32, crate::layout::Orientation)>],
    config: &Config,
) -> Layout {
    let mut new_layout = Layout::default();
    for (path_idx, path) in paths.iter().enumerate() {
        let name = format!("scaffold_{path_idx}");
        let mut components = Vec::new();
        let mut cursor = 0u64;
        for (i, &(old_scaffold_id, orientation)) in path.iter().enumerate() {
            if i > 0 {
                components.push(crate::layout::Component::Gap(crate::layout::Gap {
                    length: config.gap_length as u64,
                    scaffold_offset: cursor,
                }));
                cursor += config.gap_length as u64;
            }
            let reversed = orientation == crate::layout::Orientation::Reverse;
            let segs: Vec<_> = old.scaffolds[old_scaffold_id as usize].segments().cloned().collect();
            let ordered: Vec<_> = if reversed {
                segs.into_iter().rev().collect()
            } else {
                segs
            };
            for seg in ordered {
                let effective_orientation = match orientation {
                    crate::layout::Orientation::Forward => seg.orientation,
                    crate::layout::Orientation::Reverse => seg.orientation.flip(),
                };
                let length = seg.length;
                components.push(crate::layout::Component::Seq(crate::layout::Segment {
                    contig_id: seg.contig_id,
                    contig_start: seg.contig_start,
                    length,
                    orientation: effective_orientation,
                    scaffold_offset: cursor,
                }));
                cursor += length;
            }
        }
        new_layout.add_scaffold(name, components);
    }
    new_layout.finalize();
    new_layout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_single_contig_no_links_is_noop() {
        let mut dict = SeqDict::new();
        dict.put("a", 50_000);
        let config = Config {
            run_contig_break: false,
            run_scaffold_break: false,
            resolutions: vec![10_000],
            norm_k_min: 1,
            r_min_bands: 1,
            ..Config::default()
        };
        let sites = RestrictionSites::new();
        let (layout, report) = run(&dict, Vec::new(), &sites, &config).expect("run should not fail outright");
        assert_eq!(layout.scaffolds.len(), 1);
        assert_eq!(report.contig_break_rounds, 0);
    }

    #[test]
    fn test_scaffold_round_parallelism_scales_past_available_cores() {
        // The per-scaffold matrix build in `run_scaffold_round` fans out over rayon's
        // global pool regardless of how many scaffolds there are; this just checks it
        // doesn't deadlock or panic when the scaffold count exceeds core count.
        let max_threads = num_cpus::get();
        let mut dict = SeqDict::new();
        for i in 0..(max_threads * 2 + 1) {
            dict.put(&format!("ctg{i}"), 20_000);
        }
        let config = Config {
            run_contig_break: false,
            run_scaffold_break: false,
            resolutions: vec![5_000],
            norm_k_min: 1,
            r_min_bands: 1,
            ..Config::default()
        };
        let sites = RestrictionSites::new();
        let (layout, _report) = run(&dict, Vec::new(), &sites, &config).expect("run should not fail outright");
        assert_eq!(layout.scaffolds.len(), max_threads * 2 + 1);
    }

    #[test]
    fn test_contig_break_loop_splits_the_mis_assembly_and_terminates() {
        // A mis-assembled contig whose two halves share no cross-links (scenario S3)
        // should actually be cut at the midpoint and the loop should converge in one
        // round, rather than resetting to identity and re-finding the same break
        // forever.
        let mut dict = SeqDict::new();
        dict.put("ctg", 2_000_000);
        let config = Config {
            run_contig_break: true,
            run_scaffold_break: false,
            resolutions: vec![500_000],
            ec_resolution: 50_000,
            max_band_bases: 500_000,
            norm_k_min: 3,
            r_min_bands: 2,
            break_rho: 0.5,
            ..Config::default()
        };
        let sites = RestrictionSites::new();

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

        let (layout, report) =
            run(&dict, links, &sites, &config).expect("run should terminate and succeed");
        assert!(
            report.contig_break_rounds >= 1,
            "expected the mis-assembly to trigger at least one break round"
        );
        assert!(
            layout.scaffolds.len() >= 2,
            "the mis-assembled contig should have been split into at least two pieces, got {}",
            layout.scaffolds.len()
        );
        let total_length: u64 = layout.scaffolds.iter().map(|s| s.length).sum();
        assert_eq!(total_length, 2_000_000, "splitting must not drop or duplicate any bases");
    }
}
