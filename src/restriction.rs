/// Restriction-enzyme site oracle: a sorted per-contig list of motif-match offsets,
/// mapped through the layout into per-scaffold-bin cut-site counts (spec.md §4.3).
///
/// The raw-sequence motif scan itself is an external collaborator (spec.md §1); this
/// module consumes its output (a sorted offset list per contig) and answers
/// "how many sites fall in `[start, end)` of scaffold `s`".
use crate::layout::Layout;
use crate::seq_dict::SeqDict;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct RestrictionSites {
    /// contig_id -> sorted restriction-site offsets on that contig.
    by_contig: HashMap<u32, Vec<u64>>,
}

impl RestrictionSites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_contig(&mut self, contig_id: u32, mut offsets: Vec<u64>) {
        offsets.sort_unstable();
        self.by_contig.insert(contig_id, offsets);
    }

    pub fn is_empty(&self) -> bool {
        self.by_contig.values().all(|v| v.is_empty())
    }

    fn count_in_contig_range(&self, contig_id: u32, start: u64, end: u64) -> u64 {
        let Some(offsets) = self.by_contig.get(&contig_id) else {
            return 0;
        };
        let lo = offsets.partition_point(|&o| o < start);
        let hi = offsets.partition_point(|&o| o < end);
        (hi - lo) as u64
    }

    /// Count restriction sites falling within `[scaffold_start, scaffold_end)` of
    /// scaffold `scaffold_id`, by walking the segments the bin overlaps and mapping
    /// each overlap back to contig coordinates.
    pub fn count_in_scaffold_range(
        &self,
        layout: &Layout,
        scaffold_id: u32,
        scaffold_start: u64,
        scaffold_end: u64,
    ) -> u64 {
        let Some(scaffold) = layout.scaffolds.get(scaffold_id as usize) else {
            return 0;
        };
        let mut total = 0u64;
        for seg in scaffold.segments() {
            let seg_start = seg.scaffold_offset;
            let seg_end = seg.scaffold_offset + seg.length;
            let ov_start = scaffold_start.max(seg_start);
            let ov_end = scaffold_end.min(seg_end);
            if ov_start >= ov_end {
                continue;
            }
            // Translate the overlap back into contig coordinates, respecting strand.
            let (contig_start, contig_end) = match seg.orientation {
                crate::layout::Orientation::Forward => {
                    let a = seg.contig_start + (ov_start - seg_start);
                    let b = seg.contig_start + (ov_end - seg_start);
                    (a, b)
                }
                crate::layout::Orientation::Reverse => {
                    let a = seg.contig_start + (seg_end - ov_end);
                    let b = seg.contig_start + (seg_end - ov_start);
                    (a, b)
                }
            };
            total += self.count_in_contig_range(seg.contig_id, contig_start, contig_end);
        }
        total
    }
}

/// Scan a plain FASTA file for every configured motif's occurrences per contig. Matches
/// are literal (motifs are already `N`-expanded to concrete `{A,C,G,T}` strings) and
/// overlapping hits all count, since recognition sites can overlap. Contigs in the
/// FASTA but absent from `dict` are skipped; contigs in `dict` but absent from the
/// FASTA are simply left with no sites.
pub fn scan_fasta_for_motifs<P: AsRef<Path>>(path: P, dict: &SeqDict, motifs: &[String]) -> Result<RestrictionSites> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening sequence file {}", path.display()))?;
    let reader = BufReader::new(file);

    let motifs: Vec<Vec<u8>> = motifs.iter().map(|m| m.to_ascii_uppercase().into_bytes()).collect();
    let mut sites = RestrictionSites::new();
    let mut current_id: Option<u32> = None;
    let mut seq: Vec<u8> = Vec::new();

    fn flush(id: Option<u32>, seq: &[u8], motifs: &[Vec<u8>], sites: &mut RestrictionSites) {
        let Some(id) = id else { return };
        let mut offsets = Vec::new();
        for motif in motifs {
            if motif.is_empty() || motif.len() > seq.len() {
                continue;
            }
            for start in 0..=(seq.len() - motif.len()) {
                if &seq[start..start + motif.len()] == motif.as_slice() {
                    offsets.push(start as u64);
                }
            }
        }
        sites.insert_contig(id, offsets);
    }

    for line in reader.lines() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if let Some(name) = line.strip_prefix('>') {
            flush(current_id.take(), &seq, &motifs, &mut sites);
            seq.clear();
            let name = name.split_whitespace().next().unwrap_or("");
            current_id = dict.get(name);
        } else if current_id.is_some() {
            seq.extend(line.trim_end().bytes().map(|b| b.to_ascii_uppercase()));
        }
    }
    flush(current_id.take(), &seq, &motifs, &mut sites);

    Ok(sites)
}
