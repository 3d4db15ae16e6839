/// On-disk Hi-C link record stream and the forward-only scanner over it (spec.md §4.2,
/// §6). Records are little-endian `(ref_a: u32, pos_a: u32, ref_b: u32, pos_b: u32,
/// mapq: u8)`, 17 bytes, no header — mirroring the teacher's `byteorder`-based reading
/// of other fixed-width binary structures (`Mapping`'s `#[repr(C, packed)]` layout).
use crate::layout::Layout;
use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub const RECORD_SIZE: usize = 17;

#[derive(Debug, Clone, Copy)]
pub struct RawLinkRecord {
    pub ref_a: u32,
    pub pos_a: u32,
    pub ref_b: u32,
    pub pos_b: u32,
    pub mapq: u8,
}

/// A link record after coordinate conversion into the current layout's scaffold space,
/// with `scaffold_a <= scaffold_b` (ties broken by position) per spec.md §4.2.
#[derive(Debug, Clone, Copy)]
pub struct ScaffoldLink {
    pub scaffold_a: u32,
    pub pos_a: u64,
    pub scaffold_b: u32,
    pub pos_b: u64,
}

pub struct LinkStoreReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> LinkStoreReader<R> {
    pub fn new(inner: R) -> Self {
        LinkStoreReader {
            reader: BufReader::new(inner),
        }
    }

    /// Read the next raw record, or `None` at clean EOF. A truncated trailing record is
    /// an `INPUT_INVALID`-flavored error (fatal for the round, per spec.md §4.2, §7).
    pub fn read_record(&mut self) -> Result<Option<RawLinkRecord>> {
        let mut header = [0u8; RECORD_SIZE];
        let mut read = 0;
        loop {
            match self.reader.read(&mut header[read..])? {
                0 => break,
                n => read += n,
            }
            if read == RECORD_SIZE {
                break;
            }
        }
        if read == 0 {
            return Ok(None);
        }
        if read != RECORD_SIZE {
            anyhow::bail!("truncated link record: got {read} of {RECORD_SIZE} bytes");
        }
        let mut cursor = &header[..];
        let ref_a = cursor.read_u32::<LittleEndian>()?;
        let pos_a = cursor.read_u32::<LittleEndian>()?;
        let ref_b = cursor.read_u32::<LittleEndian>()?;
        let pos_b = cursor.read_u32::<LittleEndian>()?;
        let mapq = cursor.read_u8()?;
        Ok(Some(RawLinkRecord {
            ref_a,
            pos_a,
            ref_b,
            pos_b,
            mapq,
        }))
    }
}

/// Open a link dump file for scanning (spec.md §4.2: "not held in memory").
pub fn open_link_store<P: AsRef<Path>>(path: P) -> Result<LinkStoreReader<File>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening link store {}", path.display()))?;
    Ok(LinkStoreReader::new(file))
}

/// Apply the mapq filter and layout coordinate conversion to a raw record, yielding a
/// `ScaffoldLink` with `scaffold_a <= scaffold_b`, or `None` if either end is filtered
/// out (low mapq) or unmapped (excluded by a prior break) — spec.md §4.2.
pub fn convert_record(raw: &RawLinkRecord, layout: &Layout, min_mapq: u8) -> Option<ScaffoldLink> {
    if raw.mapq < min_mapq {
        return None;
    }
    let a = layout.coord_convert(raw.ref_a, raw.pos_a as u64)?;
    let b = layout.coord_convert(raw.ref_b, raw.pos_b as u64)?;

    let (a, b) = if a.scaffold_id < b.scaffold_id
        || (a.scaffold_id == b.scaffold_id && a.scaffold_pos <= b.scaffold_pos)
    {
        (a, b)
    } else {
        (b, a)
    };

    Some(ScaffoldLink {
        scaffold_a: a.scaffold_id,
        pos_a: a.scaffold_pos,
        scaffold_b: b.scaffold_id,
        pos_b: b.scaffold_pos,
    })
}

/// Scan every record in a link store, converting through `layout` and invoking `visit`
/// for each surviving link. Returns the total number of raw records seen (for
/// diagnostics) regardless of how many survived filtering.
pub fn scan<R: Read>(
    reader: &mut LinkStoreReader<R>,
    layout: &Layout,
    min_mapq: u8,
    mut visit: impl FnMut(ScaffoldLink),
) -> Result<u64> {
    let mut total = 0u64;
    while let Some(raw) = reader.read_record()? {
        total += 1;
        if let Some(link) = convert_record(&raw, layout, min_mapq) {
            visit(link);
        }
    }
    Ok(total)
}
