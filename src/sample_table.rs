//! Track-metadata sources: turn `moov` sample tables or `moof` track runs
//! into the sample layout of a media-data box.

use crate::known_boxes::{CO64, MDIA, MINF, MVEX, STBL, STCO, STSC, STSZ, TFHD, TKHD, TRAF, TREX, TRAK, TRUN};
use crate::mdat::{MaterializeError, MediaDataBox};
use crate::track::LayoutBuilder;
use crate::tree::{ContainerBox, IsoBox, RawBox};
use crate::util::Region;
use anyhow::{Context, anyhow, bail};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

/// Something that knows which samples a media-data box holds.
pub trait TrackMetadataSource {
    /// Push the chunks of every track stored in `mdat` into `layout`, in file
    /// order, with absolute offsets and sizes as the metadata declares them.
    fn parse_media_data(&self, mdat: &MediaDataBox, layout: &mut LayoutBuilder) -> Result<(), MaterializeError>;
}

// ---------- Helpers ----------

/// Version, flags and the remaining body of an opaque FullBox.
fn full_box(b: &dyn IsoBox) -> anyhow::Result<(u8, u32, Cursor<&[u8]>)> {
    let raw = b
        .as_any()
        .downcast_ref::<RawBox>()
        .with_context(|| format!("'{}' at offset {} is not an opaque box", b.key(), b.offset()))?;
    let mut cur = Cursor::new(raw.content());
    let version = cur.read_u8()?;
    let flags = cur.read_u24::<BigEndian>()?;
    Ok((version, flags, cur))
}

fn child<'a>(parent: &'a ContainerBox, typ: crate::boxes::FourCC) -> anyhow::Result<&'a dyn IsoBox> {
    parent
        .find_first(typ)
        .with_context(|| format!("'{}' at offset {} has no '{}'", parent.fourcc(), parent.offset(), typ))
}

// tkhd: only the track id matters here
fn track_id(tkhd: &dyn IsoBox) -> anyhow::Result<u32> {
    let (version, _flags, mut cur) = full_box(tkhd).context("tkhd")?;
    if version == 1 {
        let _creation = cur.read_u64::<BigEndian>()?;
        let _modification = cur.read_u64::<BigEndian>()?;
    } else {
        let _creation = cur.read_u32::<BigEndian>()?;
        let _modification = cur.read_u32::<BigEndian>()?;
    }
    cur.read_u32::<BigEndian>()
        .context("tkhd: truncated before track id")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SampleSizes {
    Constant { size: u32, count: u32 },
    Table(Vec<u32>),
}

impl SampleSizes {
    fn get(&self, index: usize) -> Option<u64> {
        match self {
            SampleSizes::Constant { size, count } => ((index as u64) < *count as u64).then_some(*size as u64),
            SampleSizes::Table(sizes) => sizes.get(index).map(|&s| s as u64),
        }
    }

    /// Total size of `count` samples starting at `first`, or `None` if the
    /// table is shorter than that.
    fn span(&self, first: usize, count: usize) -> Option<u64> {
        match self {
            SampleSizes::Constant { size, count: total } => {
                let last = first.checked_add(count)?;
                (last as u64 <= *total as u64).then_some(*size as u64 * count as u64)
            }
            SampleSizes::Table(sizes) => {
                let run = sizes.get(first..first.checked_add(count)?)?;
                Some(run.iter().map(|&s| s as u64).sum())
            }
        }
    }
}

// stsz: sample sizes
fn decode_stsz(b: &dyn IsoBox) -> anyhow::Result<SampleSizes> {
    let (_version, _flags, mut cur) = full_box(b)?;
    let sample_size = cur.read_u32::<BigEndian>()?;
    let sample_count = cur.read_u32::<BigEndian>()?;

    // If sample_size is 0, each sample has its own size
    if sample_size != 0 {
        return Ok(SampleSizes::Constant {
            size: sample_size,
            count: sample_count,
        });
    }
    let mut sizes = Vec::with_capacity(sample_count.min(1 << 20) as usize);
    for _ in 0..sample_count {
        sizes.push(cur.read_u32::<BigEndian>()?);
    }
    Ok(SampleSizes::Table(sizes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StscEntry {
    first_chunk: u32,
    samples_per_chunk: u32,
}

// stsc: sample-to-chunk
fn decode_stsc(b: &dyn IsoBox) -> anyhow::Result<Vec<StscEntry>> {
    let (_version, _flags, mut cur) = full_box(b)?;
    let entry_count = cur.read_u32::<BigEndian>()?;
    let mut entries = Vec::with_capacity(entry_count.min(1 << 16) as usize);
    for _ in 0..entry_count {
        let first_chunk = cur.read_u32::<BigEndian>()?;
        let samples_per_chunk = cur.read_u32::<BigEndian>()?;
        let _sample_description_index = cur.read_u32::<BigEndian>()?;
        entries.push(StscEntry {
            first_chunk,
            samples_per_chunk,
        });
    }
    Ok(entries)
}

// stco / co64: chunk offsets
fn decode_chunk_offsets(b: &dyn IsoBox, wide: bool) -> anyhow::Result<Vec<u64>> {
    let (_version, _flags, mut cur) = full_box(b)?;
    let entry_count = cur.read_u32::<BigEndian>()?;
    let mut offsets = Vec::with_capacity(entry_count.min(1 << 20) as usize);
    for _ in 0..entry_count {
        let offset = if wide {
            cur.read_u64::<BigEndian>()?
        } else {
            cur.read_u32::<BigEndian>()? as u64
        };
        offsets.push(offset);
    }
    Ok(offsets)
}

/// A chunk as `(offset of first sample, [(offset, size)])`.
type ChunkRun = (u64, Vec<(u64, u64)>);

/// End of a run of `span` bytes at `start`, as a sample-table error on overflow.
fn run_end(track_id: u32, start: u64, span: u64) -> anyhow::Result<u64> {
    start
        .checked_add(span)
        .with_context(|| format!("track {track_id}: run of {span} bytes at offset {start} overflows"))
}

/// A run belongs to every media data box it overlaps. One that does must
/// fit: offsets strictly increase, so there can be at most one sample per
/// remaining byte plus a trailing empty one.
fn run_in_region(region: Region, track_id: u32, start: u64, span: u64, count: u64) -> anyhow::Result<bool> {
    if count == 0 || !region.overlaps(Region::new(start, span)) {
        return Ok(false);
    }
    let room = region.end().saturating_sub(start);
    if count > room.saturating_add(1) {
        bail!("track {track_id}: run of {count} samples at offset {start} cannot fit in {room} bytes of media data");
    }
    Ok(true)
}

/// `(offset, size)` of consecutive samples laid out from `start`.
fn lay_out(start: u64, sizes: impl Iterator<Item = u64>) -> Vec<(u64, u64)> {
    let mut offset = start;
    sizes
        .map(|size| {
            let sample = (offset, size);
            offset += size;
            sample
        })
        .collect()
}

/// Decoded sample table of one `trak`.
#[derive(Debug)]
struct TrackTable {
    track_id: u32,
    sizes: SampleSizes,
    stsc: Vec<StscEntry>,
    chunk_offsets: Vec<u64>,
}

impl TrackTable {
    /// `None` for tracks without a sample table.
    fn from_trak(trak: &ContainerBox) -> anyhow::Result<Option<Self>> {
        let track_id = track_id(child(trak, TKHD)?)?;
        let Some(stbl) = trak.find_path(&[MDIA, MINF, STBL]) else {
            return Ok(None);
        };
        let ctx = || format!("sample table of track {track_id}");

        let sizes = decode_stsz(child(stbl, STSZ).with_context(ctx)?).with_context(ctx)?;
        let stsc = decode_stsc(child(stbl, STSC).with_context(ctx)?).with_context(ctx)?;
        let chunk_offsets = match (stbl.find_first(STCO), stbl.find_first(CO64)) {
            (Some(stco), _) => decode_chunk_offsets(stco, false),
            (None, Some(co64)) => decode_chunk_offsets(co64, true),
            (None, None) => bail!("{}: no stco or co64", ctx()),
        }
        .with_context(ctx)?;

        Ok(Some(TrackTable {
            track_id,
            sizes,
            stsc,
            chunk_offsets,
        }))
    }

    /// Chunks overlapping `region`, expanded into samples.
    fn chunks(&self, region: Region) -> anyhow::Result<Vec<ChunkRun>> {
        let mut out = Vec::new();
        let mut entry = 0usize;
        let mut sample = 0usize;
        for (i, &chunk_offset) in self.chunk_offsets.iter().enumerate() {
            let chunk_number = i as u64 + 1;
            while entry + 1 < self.stsc.len() && self.stsc[entry + 1].first_chunk as u64 <= chunk_number {
                entry += 1;
            }
            let per_chunk = match self.stsc.get(entry) {
                Some(e) if e.first_chunk as u64 <= chunk_number => e.samples_per_chunk,
                _ => 0,
            };

            let first = sample;
            let count = per_chunk as usize;
            let span = self.sizes.span(first, count).with_context(|| {
                format!(
                    "track {}: chunk {} needs samples {}..{} but stsz is shorter",
                    self.track_id,
                    chunk_number,
                    first,
                    first as u64 + count as u64
                )
            })?;
            run_end(self.track_id, chunk_offset, span)?;
            sample += count;

            if run_in_region(region, self.track_id, chunk_offset, span, count as u64)? {
                let sizes = (first..sample).filter_map(|i| self.sizes.get(i));
                out.push((chunk_offset, lay_out(chunk_offset, sizes)));
            }
        }
        Ok(out)
    }
}

/// Reads sample layout from the sample tables of a `moov`.
pub struct MovieSource<'a> {
    moov: &'a ContainerBox,
}

impl<'a> MovieSource<'a> {
    pub fn new(moov: &'a ContainerBox) -> Self {
        MovieSource { moov }
    }
}

impl TrackMetadataSource for MovieSource<'_> {
    fn parse_media_data(&self, mdat: &MediaDataBox, layout: &mut LayoutBuilder) -> Result<(), MaterializeError> {
        let region = mdat.region();
        let mut chunks: Vec<(u64, u32, Vec<(u64, u64)>)> = Vec::new();
        for trak in self.moov.find_all(TRAK) {
            let Some(trak) = trak.as_container() else {
                continue;
            };
            let Some(table) = TrackTable::from_trak(trak)? else {
                continue;
            };
            for (offset, samples) in table.chunks(region)? {
                chunks.push((offset, table.track_id, samples));
            }
        }

        // Chunks of different tracks interleave; file order is offset order.
        chunks.sort_by_key(|c| c.0);
        for (_, track_id, samples) in chunks {
            layout.push_chunk(track_id, samples);
        }
        Ok(())
    }
}

const TFHD_BASE_DATA_OFFSET: u32 = 0x000001;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x000008;
const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x000010;
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

const TRUN_DATA_OFFSET: u32 = 0x000001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
const TRUN_SAMPLE_DURATION: u32 = 0x000100;
const TRUN_SAMPLE_SIZE: u32 = 0x000200;
const TRUN_SAMPLE_FLAGS: u32 = 0x000400;
const TRUN_SAMPLE_CTO: u32 = 0x000800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tfhd {
    flags: u32,
    track_id: u32,
    base_data_offset: Option<u64>,
    default_sample_size: Option<u32>,
}

fn decode_tfhd(b: &dyn IsoBox) -> anyhow::Result<Tfhd> {
    let (_version, flags, mut cur) = full_box(b).context("tfhd")?;
    let track_id = cur.read_u32::<BigEndian>()?;
    let base_data_offset = if flags & TFHD_BASE_DATA_OFFSET != 0 {
        Some(cur.read_u64::<BigEndian>()?)
    } else {
        None
    };
    if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
        let _sample_description_index = cur.read_u32::<BigEndian>()?;
    }
    if flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 {
        let _default_sample_duration = cur.read_u32::<BigEndian>()?;
    }
    let default_sample_size = if flags & TFHD_DEFAULT_SAMPLE_SIZE != 0 {
        Some(cur.read_u32::<BigEndian>()?)
    } else {
        None
    };
    Ok(Tfhd {
        flags,
        track_id,
        base_data_offset,
        default_sample_size,
    })
}

/// A track run. `sample_sizes` is empty unless the run carries per-sample
/// sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Trun {
    sample_count: u32,
    data_offset: Option<i32>,
    sample_sizes: Vec<u32>,
}

fn decode_trun(b: &dyn IsoBox) -> anyhow::Result<Trun> {
    let (_version, flags, mut cur) = full_box(b).context("trun")?;
    let sample_count = cur.read_u32::<BigEndian>()?;
    let data_offset = if flags & TRUN_DATA_OFFSET != 0 {
        Some(cur.read_i32::<BigEndian>()?)
    } else {
        None
    };
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        let _first_sample_flags = cur.read_u32::<BigEndian>()?;
    }

    // Without per-sample fields there is nothing to read for each sample.
    let per_sample = TRUN_SAMPLE_DURATION | TRUN_SAMPLE_SIZE | TRUN_SAMPLE_FLAGS | TRUN_SAMPLE_CTO;
    let mut sample_sizes = Vec::new();
    if flags & per_sample != 0 {
        for _ in 0..sample_count {
            if flags & TRUN_SAMPLE_DURATION != 0 {
                let _duration = cur.read_u32::<BigEndian>()?;
            }
            if flags & TRUN_SAMPLE_SIZE != 0 {
                sample_sizes.push(cur.read_u32::<BigEndian>()?);
            }
            if flags & TRUN_SAMPLE_FLAGS != 0 {
                let _sample_flags = cur.read_u32::<BigEndian>()?;
            }
            if flags & TRUN_SAMPLE_CTO != 0 {
                let _composition_offset = cur.read_u32::<BigEndian>()?;
            }
        }
    }
    Ok(Trun {
        sample_count,
        data_offset,
        sample_sizes,
    })
}

// trex: track id -> default sample size
fn decode_trex_defaults(moov: &ContainerBox) -> anyhow::Result<HashMap<u32, u32>> {
    let mut defaults = HashMap::new();
    let Some(mvex) = moov.find_container(MVEX) else {
        return Ok(defaults);
    };
    for trex in mvex.find_all(TREX) {
        let (_version, _flags, mut cur) = full_box(trex).context("trex")?;
        let track_id = cur.read_u32::<BigEndian>()?;
        let _sample_description_index = cur.read_u32::<BigEndian>()?;
        let _duration = cur.read_u32::<BigEndian>()?;
        let size = cur.read_u32::<BigEndian>()?;
        defaults.insert(track_id, size);
    }
    Ok(defaults)
}

/// Reads sample layout from the track runs of a `moof`, using the movie's
/// `trex` defaults where a fragment leaves sample sizes unspecified.
pub struct FragmentSource<'a> {
    moof: &'a ContainerBox,
    moov: Option<&'a ContainerBox>,
}

impl<'a> FragmentSource<'a> {
    pub fn new(moof: &'a ContainerBox, moov: Option<&'a ContainerBox>) -> Self {
        FragmentSource { moof, moov }
    }
}

impl TrackMetadataSource for FragmentSource<'_> {
    fn parse_media_data(&self, mdat: &MediaDataBox, layout: &mut LayoutBuilder) -> Result<(), MaterializeError> {
        let region = mdat.region();
        let trex = match self.moov {
            Some(moov) => decode_trex_defaults(moov)?,
            None => HashMap::new(),
        };
        let moof_start = self.moof.offset();

        // Track runs may point at data in any order; file order is offset order.
        let mut runs: Vec<(u64, u32, Vec<(u64, u64)>)> = Vec::new();
        let mut previous_end: Option<u64> = None;
        for traf in self.moof.find_all(TRAF) {
            let Some(traf) = traf.as_container() else {
                continue;
            };
            let tfhd = decode_tfhd(child(traf, TFHD)?)?;
            let base = match tfhd.base_data_offset {
                Some(base) => base,
                None if tfhd.flags & TFHD_DEFAULT_BASE_IS_MOOF != 0 => moof_start,
                None => previous_end.unwrap_or(moof_start),
            };
            let default_size = tfhd
                .default_sample_size
                .or_else(|| trex.get(&tfhd.track_id).copied());

            let mut data_end = base;
            for trun in traf.find_all(TRUN) {
                let run = decode_trun(trun)?;
                let start = match run.data_offset {
                    Some(d) => base.checked_add_signed(d as i64).with_context(|| {
                        format!("track {}: data offset {d} from base {base} is out of range", tfhd.track_id)
                    })?,
                    None => data_end,
                };

                let count = run.sample_count as u64;
                let explicit = !run.sample_sizes.is_empty();
                let default = match default_size {
                    Some(size) => size as u64,
                    None if explicit || count == 0 => 0,
                    None => return Err(anyhow!("track {}: trun sample without size and no default", tfhd.track_id).into()),
                };
                let span = if explicit {
                    run.sample_sizes.iter().map(|&s| s as u64).sum()
                } else {
                    default * count
                };
                data_end = run_end(tfhd.track_id, start, span)?;

                if run_in_region(region, tfhd.track_id, start, span, count)? {
                    let samples = if explicit {
                        lay_out(start, run.sample_sizes.iter().map(|&s| s as u64))
                    } else {
                        lay_out(start, std::iter::repeat_n(default, count as usize))
                    };
                    runs.push((start, tfhd.track_id, samples));
                }
            }
            previous_end = Some(data_end);
        }

        runs.sort_by_key(|r| r.0);
        for (_, track_id, samples) in runs {
            layout.push_chunk(track_id, samples);
        }
        Ok(())
    }
}
