/// Sequence dictionary: bijective name<->index mapping over contigs, with lengths.
///
/// Grounded on the teacher's `SequenceRegistry`/`SequenceIndex` (name<->u32 id,
/// insertion-order-irrelevant, duplicate-detecting map), generalized to also carry
/// contig length and to reject duplicate `put`s rather than silently reusing the id
/// (spec.md §4.1, §8 property 1).
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SeqEntry {
    pub name: String,
    pub length: u64,
}

/// Result of a `put`: either the freshly assigned index, or a marker that the name was
/// already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    Index(u32),
    Duplicate,
}

#[derive(Debug, Default)]
pub struct SeqDict {
    entries: Vec<SeqEntry>,
    /// Insertion-ordered so diagnostics that iterate names see the same order the FAI
    /// or contig dictionary was built in.
    name_to_id: IndexMap<String, u32>,
}

impl SeqDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new contig. Indices are assigned densely in `[0, N)` in insertion
    /// order and never change afterward (spec.md §3 invariant).
    pub fn put(&mut self, name: &str, length: u64) -> PutResult {
        if self.name_to_id.contains_key(name) {
            return PutResult::Duplicate;
        }
        let id = self.entries.len() as u32;
        self.entries.push(SeqEntry {
            name: name.to_string(),
            length,
        });
        self.name_to_id.insert(name.to_string(), id);
        PutResult::Index(id)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.name_to_id.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name(&self, id: u32) -> &str {
        &self.entries[id as usize].name
    }

    pub fn length(&self, id: u32) -> u64 {
        self.entries[id as usize].length
    }

    pub fn entries(&self) -> &[SeqEntry] {
        &self.entries
    }

    /// Build a dictionary from a FAI-style index file: whitespace-delimited columns
    /// `(name, length, offset, line_bases, line_width)`; only `name` and `length` are
    /// read (spec.md §6). Contigs shorter than `min_length` are dropped.
    pub fn from_fai<P: AsRef<Path>>(path: P, min_length: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening FAI index {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut dict = SeqDict::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("reading line {} of {}", lineno + 1, path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let mut cols = line.split_whitespace();
            let name = cols
                .next()
                .with_context(|| format!("FAI line {} missing name column", lineno + 1))?;
            let length_str = cols
                .next()
                .with_context(|| format!("FAI line {} missing length column", lineno + 1))?;
            let length: u64 = length_str
                .parse()
                .with_context(|| format!("FAI line {} has non-numeric length '{length_str}'", lineno + 1))?;

            if length < min_length {
                continue;
            }
            if let PutResult::Duplicate = dict.put(name, length) {
                anyhow::bail!("duplicate contig name '{name}' in {}", path.display());
            }
        }
        Ok(dict)
    }
}
