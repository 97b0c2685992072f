use crate::boxes::BoxHeader;
use crate::parser::{BoxParser, ParseContext, ParseError};
use crate::sample_table::TrackMetadataSource;
use crate::track::{LayoutBuilder, Sample, Track, reindex};
use crate::tree::IsoBox;
use crate::util::{ReadSeek, Region, copy_region, read_slice};
use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::io::{self, SeekFrom, Write};
use tracing::{debug, warn};

#[derive(thiserror::Error, Debug)]
pub enum MaterializeError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("no movie or movie fragment box describes the media data at offset {offset}")]
    MissingMetadata { offset: u64 },
    #[error("inconsistent sample layout in media data at offset {offset}: {source}")]
    Layout {
        offset: u64,
        #[source]
        source: LayoutError,
    },
    #[error(transparent)]
    SampleTable(#[from] anyhow::Error),
    #[error("box {index} is not a media data box")]
    NotMediaData { index: usize },
    #[error("media data box is not materialized")]
    NotMaterialized,
    #[error("sample index {index} out of range ({count} samples)")]
    SampleIndex { index: usize, count: usize },
}

/// Ways the declared samples can fail to tile the media-data region.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("sample {index} at offset {offset} does not follow the previous sample at {previous}")]
    NonMonotonic { index: usize, previous: u64, offset: u64 },
    #[error("gap before sample {index}: expected offset {expected}, found {offset}")]
    Gap { index: usize, expected: u64, offset: u64 },
    #[error("sample {index} at offset {offset} overlaps the previous sample ending at {expected}")]
    Overlap { index: usize, expected: u64, offset: u64 },
    #[error("samples end at {end}, past the media data end at {limit}")]
    OutOfBounds { end: u64, limit: u64 },
}

/// Check that `samples` follow each other without gaps, starting at `start`.
///
/// Offsets must strictly increase and each sample must begin exactly where
/// the previous one ended.
pub fn validate_layout(samples: &[Sample], start: u64) -> Result<u64, LayoutError> {
    let mut ends_at = start;
    let mut previous: Option<u64> = None;
    for (index, s) in samples.iter().enumerate() {
        if let Some(previous) = previous
            && s.offset <= previous
        {
            return Err(LayoutError::NonMonotonic {
                index,
                previous,
                offset: s.offset,
            });
        }
        if s.offset > ends_at {
            return Err(LayoutError::Gap {
                index,
                expected: ends_at,
                offset: s.offset,
            });
        }
        if s.offset < ends_at {
            return Err(LayoutError::Overlap {
                index,
                expected: ends_at,
                offset: s.offset,
            });
        }
        ends_at = s.end();
        previous = Some(s.offset);
    }
    Ok(ends_at)
}

#[derive(Debug)]
struct Layout {
    tracks: HashMap<u32, Track>,
    samples: Vec<Sample>,
    dead_bytes_before: Vec<u8>,
    /// Bytes between the last sample and the end of the box, streamed on write.
    tail: Region,
    negative_lead_in: bool,
    cached_size: Cell<Option<u64>>,
}

#[derive(Debug)]
enum Contents {
    Unparsed,
    Materialized(Box<Layout>),
}

/// The `mdat` box.
///
/// Parsing only records where the payload lives. [`MediaDataBox::materialize`]
/// later turns the payload into per-track samples using a
/// [`TrackMetadataSource`].
#[derive(Debug)]
pub struct MediaDataBox {
    header: BoxHeader,
    region: Region,
    fragment: Option<usize>,
    contents: Contents,
}

impl MediaDataBox {
    pub fn new(header: BoxHeader) -> Self {
        let region = Region::new(header.content_start(), 0);
        MediaDataBox {
            header,
            region,
            fragment: None,
            contents: Contents::Unparsed,
        }
    }

    /// Source range of the box content as parsed.
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn start_offset(&self) -> u64 {
        self.region.offset
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.contents, Contents::Materialized(_))
    }

    /// Index among the top-level boxes of the movie fragment preceding this
    /// box, if any.
    pub fn fragment_index(&self) -> Option<usize> {
        self.fragment
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment.is_some()
    }

    fn layout(&self) -> Option<&Layout> {
        match &self.contents {
            Contents::Materialized(l) => Some(l),
            Contents::Unparsed => None,
        }
    }

    fn layout_mut(&mut self) -> Option<&mut Layout> {
        match &mut self.contents {
            Contents::Materialized(l) => Some(l),
            Contents::Unparsed => None,
        }
    }

    pub fn dead_bytes_before(&self) -> &[u8] {
        self.layout()
            .map(|l| l.dead_bytes_before.as_slice())
            .unwrap_or_default()
    }

    /// Length of the bytes kept after the last sample.
    pub fn dead_bytes_after(&self) -> u64 {
        self.layout().map(|l| l.tail.length).unwrap_or(0)
    }

    /// The first sample was declared before the start of this box's content.
    pub fn has_negative_lead_in(&self) -> bool {
        self.layout().is_some_and(|l| l.negative_lead_in)
    }

    /// Size of the content: the sum of all samples once materialized, the
    /// parsed length otherwise.
    pub fn content_size(&self) -> u64 {
        let Some(l) = self.layout() else {
            return self.region.length;
        };
        if let Some(size) = l.cached_size.get() {
            return size;
        }
        let size: u64 = l.tracks.values().map(|t| t.size(&l.samples)).sum();
        debug_assert_eq!(
            size,
            l.samples.iter().map(|s| s.size).sum::<u64>(),
            "track sizes disagree with the sample list"
        );
        l.cached_size.set(Some(size));
        size
    }

    pub fn samples(&self) -> &[Sample] {
        self.layout().map(|l| l.samples.as_slice()).unwrap_or_default()
    }

    pub fn sample(&self, index: usize) -> Option<&Sample> {
        self.samples().get(index)
    }

    pub fn sample_count(&self) -> usize {
        self.samples().len()
    }

    pub fn track(&self, id: u32) -> Option<&Track> {
        self.layout().and_then(|l| l.tracks.get(&id))
    }

    /// Tracks sorted by id.
    pub fn tracks(&self) -> Vec<&Track> {
        let mut tracks: Vec<&Track> = self
            .layout()
            .map(|l| l.tracks.values().collect())
            .unwrap_or_default();
        tracks.sort();
        tracks
    }

    pub fn track_size(&self, id: u32) -> Option<u64> {
        let l = self.layout()?;
        l.tracks.get(&id).map(|t| t.size(&l.samples))
    }

    /// Swap the sample at `index` for `sample`, keeping its track and chunk.
    /// Returns the sample that was replaced.
    pub fn replace_sample(&mut self, index: usize, mut sample: Sample) -> Result<Sample, MaterializeError> {
        let l = self.layout_mut().ok_or(MaterializeError::NotMaterialized)?;
        let count = l.samples.len();
        let slot = l
            .samples
            .get_mut(index)
            .ok_or(MaterializeError::SampleIndex { index, count })?;
        sample.track_id = slot.track_id;
        sample.chunk = slot.chunk;
        let old = std::mem::replace(slot, sample);
        l.cached_size.set(None);
        Ok(old)
    }

    /// Drop every sample of track `id` from the flat list.
    ///
    /// Offsets are left as they are: the remaining samples no longer tile
    /// the region, and whoever writes the file must fix the offsets up.
    pub fn remove_track(&mut self, id: u32) -> bool {
        let Some(l) = self.layout_mut() else {
            return false;
        };
        if l.tracks.remove(&id).is_none() {
            return false;
        }
        l.samples.retain(|s| s.track_id != id);
        reindex(&mut l.tracks, &l.samples);
        l.cached_size.set(None);
        true
    }

    /// Reconstruct tracks and samples from `source`. A no-op once
    /// materialized; on error the box stays unparsed.
    pub fn materialize(
        &mut self,
        source: &dyn TrackMetadataSource,
        src: &mut dyn ReadSeek,
    ) -> Result<(), MaterializeError> {
        if self.is_materialized() {
            return Ok(());
        }
        let mut builder = LayoutBuilder::new();
        source.parse_media_data(self, &mut builder)?;
        let layout = self.build_layout(builder, src)?;
        debug!(
            offset = self.header.start,
            tracks = layout.tracks.len(),
            samples = layout.samples.len(),
            lead_in = layout.dead_bytes_before.len(),
            "materialized media data"
        );
        self.contents = Contents::Materialized(Box::new(layout));
        Ok(())
    }

    fn build_layout(&self, builder: LayoutBuilder, src: &mut dyn ReadSeek) -> Result<Layout, MaterializeError> {
        let (tracks, samples) = builder.finish();
        let start = self.region.offset;
        let limit = self.region.end();
        let layout_err = |source| MaterializeError::Layout {
            offset: self.header.start,
            source,
        };

        let mut negative_lead_in = false;
        let first = match samples.first() {
            Some(s) if s.offset < start => {
                warn!(
                    mdat_offset = self.header.start,
                    content_start = start,
                    first_sample = s.offset,
                    "first sample lies before the media data content, assuming no lead-in"
                );
                negative_lead_in = true;
                s.offset
            }
            Some(s) => s.offset,
            None => start,
        };

        let end = validate_layout(&samples, first).map_err(layout_err)?;
        if end > limit {
            return Err(layout_err(LayoutError::OutOfBounds { end, limit }));
        }

        let lead_in = first.saturating_sub(start);
        let dead_bytes_before = if lead_in > 0 {
            read_slice(src, start, lead_in)?
        } else {
            Vec::new()
        };
        let tail_start = end.max(start);

        Ok(Layout {
            tracks,
            samples,
            dead_bytes_before,
            tail: Region::new(tail_start, limit - tail_start),
            negative_lead_in,
            cached_size: Cell::new(None),
        })
    }
}

impl IsoBox for MediaDataBox {
    fn header(&self) -> &BoxHeader {
        &self.header
    }

    fn payload_size(&self) -> u64 {
        let padding = self
            .layout()
            .map(|l| l.dead_bytes_before.len() as u64 + l.tail.length)
            .unwrap_or(0);
        self.content_size() + padding
    }

    fn parse_content(
        &mut self,
        r: &mut dyn ReadSeek,
        content_len: u64,
        _parser: &BoxParser,
        ctx: &mut ParseContext,
    ) -> Result<(), ParseError> {
        let start = r.stream_position()?;
        self.region = Region::new(start, content_len);
        self.fragment = ctx.last_fragment();
        self.contents = Contents::Unparsed;
        r.seek(SeekFrom::Start(start + content_len))?;
        Ok(())
    }

    fn write(&self, out: &mut dyn Write, src: &mut dyn ReadSeek) -> io::Result<()> {
        let hdr = BoxHeader::for_content(self.key(), self.payload_size(), self.header.start);
        hdr.write(out)?;
        match &self.contents {
            Contents::Unparsed => copy_region(src, self.region, out),
            Contents::Materialized(l) => {
                out.write_all(&l.dead_bytes_before)?;
                for s in &l.samples {
                    match s.payload() {
                        Some(p) => out.write_all(p)?,
                        None => copy_region(src, Region::new(s.offset, s.size), out)?,
                    }
                }
                copy_region(src, l.tail, out)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
