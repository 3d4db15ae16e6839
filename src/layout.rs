/// Assembly layout (scaffold dictionary): scaffolds as ordered sequences of oriented
/// contig segments, plus the coordinate-conversion oracle from contig space to
/// scaffold space (spec.md §3, §4.1).
///
/// Grounded on the teacher's `PafRecord`/`Mapping` pair (a plain data record plus a
/// packed-flag struct with accessor methods) for `Segment`'s orientation bit, and on
/// `SequenceIndex`/`SequenceRegistry` for the name<->id bookkeeping reused from
/// `seq_dict`.
use crate::seq_dict::SeqDict;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Reverse,
}

impl Orientation {
    pub fn from_sign(c: char) -> Self {
        if c == '-' {
            Orientation::Reverse
        } else {
            Orientation::Forward
        }
    }

    pub fn sign(&self) -> char {
        match self {
            Orientation::Forward => '+',
            Orientation::Reverse => '-',
        }
    }

    pub fn flip(&self) -> Self {
        match self {
            Orientation::Forward => Orientation::Reverse,
            Orientation::Reverse => Orientation::Forward,
        }
    }
}

/// One oriented contig segment placed into a scaffold.
#[derive(Debug, Clone)]
pub struct Segment {
    pub contig_id: u32,
    /// Zero-based start offset on the source contig.
    pub contig_start: u64,
    /// Segment length in bases.
    pub length: u64,
    pub orientation: Orientation,
    /// Offset of this segment's first base within its scaffold.
    pub scaffold_offset: u64,
}

impl Segment {
    pub fn contig_end(&self) -> u64 {
        self.contig_start + self.length
    }
}

/// A gap placeholder between segments; never receives link counts and always uses the
/// nominal gap length (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct Gap {
    pub length: u64,
    pub scaffold_offset: u64,
}

#[derive(Debug, Clone)]
pub enum Component {
    Seq(Segment),
    Gap(Gap),
}

#[derive(Debug, Clone)]
pub struct Scaffold {
    pub name: String,
    pub components: Vec<Component>,
    pub length: u64,
}

impl Scaffold {
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.components.iter().filter_map(|c| match c {
            Component::Seq(s) => Some(s),
            Component::Gap(_) => None,
        })
    }
}

/// Result of `coord_convert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaffoldPos {
    pub scaffold_id: u32,
    pub scaffold_pos: u64,
    pub orientation: Orientation,
}

/// Per-contig index entry used by the coordinate-conversion oracle: which scaffold and
/// segment a contig interval maps to, sorted by `contig_start` for binary search.
#[derive(Debug, Clone)]
struct ContigPlacement {
    contig_start: u64,
    contig_end: u64,
    scaffold_id: u32,
    segment_offset: u64,
    orientation: Orientation,
}

#[derive(Debug, Default)]
pub struct Layout {
    pub scaffolds: Vec<Scaffold>,
    /// contig_id -> placements sorted by contig_start, for O(log k) coord_convert.
    by_contig: std::collections::HashMap<u32, Vec<ContigPlacement>>,
}

impl Layout {
    /// A layout with one single-segment scaffold per contig in the dictionary, i.e. the
    /// identity layout used before any scaffolding round has run.
    pub fn identity(dict: &SeqDict) -> Self {
        let mut layout = Layout::default();
        for (id, entry) in dict.entries().iter().enumerate() {
            let id = id as u32;
            let segment = Segment {
                contig_id: id,
                contig_start: 0,
                length: entry.length,
                orientation: Orientation::Forward,
                scaffold_offset: 0,
            };
            layout.push_scaffold(entry.name.clone(), vec![Component::Seq(segment)]);
        }
        layout
    }

    /// Append a fully-formed scaffold (its components' `scaffold_offset`s already
    /// computed by the caller) and index its segments for coordinate conversion. Used
    /// by scaffolding-round output, which builds components directly rather than
    /// parsing them from an AGP (spec.md §4.6).
    pub fn add_scaffold(&mut self, name: String, components: Vec<Component>) {
        self.push_scaffold(name, components);
    }

    /// Sort every contig's placement list after a batch of `add_scaffold` calls so
    /// `coord_convert` can binary search it. Must be called once after all scaffolds for
    /// a round have been added.
    pub fn finalize(&mut self) {
        self.finalize_index();
    }

    fn push_scaffold(&mut self, name: String, components: Vec<Component>) {
        let length = components
            .iter()
            .map(|c| match c {
                Component::Seq(s) => s.length,
                Component::Gap(g) => g.length,
            })
            .sum();
        let scaffold_id = self.scaffolds.len() as u32;
        for (i, c) in components.iter().enumerate() {
            if let Component::Seq(s) = c {
                self.index_segment(scaffold_id, i, s);
            }
        }
        self.scaffolds.push(Scaffold {
            name,
            components,
            length,
        });
    }

    fn index_segment(&mut self, scaffold_id: u32, _component_index: usize, seg: &Segment) {
        let placements = self.by_contig.entry(seg.contig_id).or_default();
        placements.push(ContigPlacement {
            contig_start: seg.contig_start,
            contig_end: seg.contig_end(),
            scaffold_id,
            segment_offset: seg.scaffold_offset,
            orientation: seg.orientation,
        });
    }

    fn finalize_index(&mut self) {
        for placements in self.by_contig.values_mut() {
            placements.sort_by_key(|p| p.contig_start);
        }
    }

    /// Map `(contig_id, contig_pos)` to `(scaffold_id, scaffold_pos, orientation)` in
    /// O(log #segments_of_that_contig), or `None` if `contig_pos` falls outside any
    /// segment (excluded by a prior break) — spec.md §4.1, §8 property 2.
    pub fn coord_convert(&self, contig_id: u32, contig_pos: u64) -> Option<ScaffoldPos> {
        let placements = self.by_contig.get(&contig_id)?;
        let idx = match placements.binary_search_by_key(&contig_pos, |p| p.contig_start) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let p = &placements[idx];
        if contig_pos < p.contig_start || contig_pos >= p.contig_end {
            return None;
        }
        let offset_in_segment = contig_pos - p.contig_start;
        let seg_len = p.contig_end - p.contig_start;
        let scaffold_pos = match p.orientation {
            Orientation::Forward => p.segment_offset + offset_in_segment,
            Orientation::Reverse => p.segment_offset + (seg_len - 1 - offset_in_segment),
        };
        Some(ScaffoldPos {
            scaffold_id: p.scaffold_id,
            scaffold_pos,
            orientation: p.orientation,
        })
    }

    /// Map `(scaffold_id, scaffold_pos)` back to the original contig coordinate it was
    /// placed from, or `None` if the position falls inside a gap. The inverse of
    /// `coord_convert`; used to re-express scaffold-space links against a new layout
    /// after a break or join changes scaffold boundaries (spec.md §4.5, §4.7).
    pub fn scaffold_to_contig(&self, scaffold_id: u32, scaffold_pos: u64) -> Option<(u32, u64)> {
        let scaffold = self.scaffolds.get(scaffold_id as usize)?;
        for seg in scaffold.segments() {
            let start = seg.scaffold_offset;
            let end = start + seg.length;
            if scaffold_pos >= start && scaffold_pos < end {
                let offset_in_segment = scaffold_pos - start;
                let contig_pos = match seg.orientation {
                    Orientation::Forward => seg.contig_start + offset_in_segment,
                    Orientation::Reverse => seg.contig_start + (seg.length - 1 - offset_in_segment),
                };
                return Some((seg.contig_id, contig_pos));
            }
        }
        None
    }

    /// Parse an AGP file into a layout, resolving component source names through
    /// `dict` (spec.md §4.1, §6). Rows with `component_type` `W` are sequence
    /// segments; `N` rows are gaps. An AGP referencing an unknown contig name is
    /// rejected.
    pub fn from_agp<P: AsRef<Path>>(path: P, dict: &SeqDict) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening AGP {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut layout = Layout::default();
        let mut current_name: Option<String> = None;
        let mut current_components: Vec<Component> = Vec::new();
        let mut cursor: u64 = 0;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("reading AGP line {}", lineno + 1))?;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 9 {
                anyhow::bail!("AGP line {} has fewer than 9 fields", lineno + 1);
            }
            let scaffold_name = fields[0].to_string();
            let component_type = fields[4];

            if current_name.as_deref() != Some(scaffold_name.as_str()) {
                if let Some(name) = current_name.take() {
                    layout.push_scaffold(name, std::mem::take(&mut current_components));
                }
                current_name = Some(scaffold_name.clone());
                cursor = 0;
            }

            match component_type {
                "W" => {
                    let source_name = fields[5];
                    let contig_id = dict.get(source_name).with_context(|| {
                        format!(
                            "AGP line {} references unknown contig '{source_name}'",
                            lineno + 1
                        )
                    })?;
                    let comp_beg: u64 = fields[6]
                        .parse()
                        .with_context(|| format!("AGP line {} has non-numeric component_beg", lineno + 1))?;
                    let comp_end: u64 = fields[7]
                        .parse()
                        .with_context(|| format!("AGP line {} has non-numeric component_end", lineno + 1))?;
                    let orientation = Orientation::from_sign(
                        fields.get(8).and_then(|s| s.chars().next()).unwrap_or('+'),
                    );
                    let length = comp_end - comp_beg + 1;
                    let segment = Segment {
                        contig_id,
                        contig_start: comp_beg - 1,
                        length,
                        orientation,
                        scaffold_offset: cursor,
                    };
                    cursor += length;
                    current_components.push(Component::Seq(segment));
                }
                "N" | "U" => {
                    let gap_length: u64 = fields[5].parse().unwrap_or(0);
                    current_components.push(Component::Gap(Gap {
                        length: gap_length,
                        scaffold_offset: cursor,
                    }));
                    cursor += gap_length;
                }
                other => anyhow::bail!("AGP line {} has unknown component type '{other}'", lineno + 1),
            }
        }

        if let Some(name) = current_name.take() {
            layout.push_scaffold(name, current_components);
        }

        layout.finalize_index();
        Ok(layout)
    }

    /// Write the layout as an AGP file, one row per component, in current scaffold
    /// order (spec.md §6). `dict` resolves contig ids back to names.
    pub fn write_agp<P: AsRef<Path>>(&self, path: P, dict: &SeqDict) -> Result<()> {
        let path = path.as_ref();
        let mut out = File::create(path).with_context(|| format!("creating AGP {}", path.display()))?;
        for scaffold in &self.scaffolds {
            let mut part_number = 1u32;
            let mut obj_beg = 1u64;
            for component in &scaffold.components {
                match component {
                    Component::Seq(seg) => {
                        let obj_end = obj_beg + seg.length - 1;
                        writeln!(
                            out,
                            "{}\t{}\t{}\t{}\tW\t{}\t{}\t{}\t{}",
                            scaffold.name,
                            obj_beg,
                            obj_end,
                            part_number,
                            dict.name(seg.contig_id),
                            seg.contig_start + 1,
                            seg.contig_end(),
                            seg.orientation.sign(),
                        )?;
                        obj_beg = obj_end + 1;
                    }
                    Component::Gap(gap) => {
                        let obj_end = obj_beg + gap.length - 1;
                        writeln!(
                            out,
                            "{}\t{}\t{}\t{}\tN\t{}\tscaffold\tyes\tproximity_ligation",
                            scaffold.name, obj_beg, obj_end, part_number, gap.length,
                        )?;
                        obj_beg = obj_end + 1;
                    }
                }
                part_number += 1;
            }
        }
        Ok(())
    }

    /// Sort scaffolds by descending total length, for the final AGP (spec.md §6).
    pub fn sort_by_length_desc(&mut self) {
        self.scaffolds.sort_by(|a, b| b.length.cmp(&a.length));
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.by_contig.clear();
        for (scaffold_id, scaffold) in self.scaffolds.iter().enumerate() {
            for c in &scaffold.components {
                if let Component::Seq(s) = c {
                    let placements = self.by_contig.entry(s.contig_id).or_default();
                    placements.push(ContigPlacement {
                        contig_start: s.contig_start,
                        contig_end: s.contig_end(),
                        scaffold_id: scaffold_id as u32,
                        segment_offset: s.scaffold_offset,
                        orientation: s.orientation,
                    });
                }
            }
        }
        self.finalize_index();
    }
}
