use std::cmp::Ordering;
use std::collections::HashMap;

/// Smallest addressable unit of media payload.
///
/// `offset` and `size` are as declared by the sample table. A sample built
/// with [`Sample::with_payload`] carries its bytes in memory instead of
/// pointing into the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub offset: u64,
    pub size: u64,
    pub track_id: u32,
    /// Index of the owning chunk within its track.
    pub chunk: usize,
    payload: Option<Vec<u8>>,
}

impl Sample {
    pub fn new(track_id: u32, chunk: usize, offset: u64, size: u64) -> Self {
        Sample {
            offset,
            size,
            track_id,
            chunk,
            payload: None,
        }
    }

    /// A replacement sample whose content lives in memory.
    pub fn with_payload(payload: Vec<u8>) -> Self {
        Sample {
            offset: 0,
            size: payload.len() as u64,
            track_id: 0,
            chunk: 0,
            payload: Some(payload),
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// A run of samples of one track, stored as indices into the flat sample list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    samples: Vec<usize>,
}

impl Chunk {
    pub fn sample_indices(&self) -> &[usize] {
        &self.samples
    }

    pub fn size(&self, samples: &[Sample]) -> u64 {
        self.samples.iter().map(|&i| samples[i].size).sum()
    }
}

/// A logical media stream. Identity and ordering are by track id.
#[derive(Debug, Clone)]
pub struct Track {
    id: u32,
    chunks: Vec<Chunk>,
}

impl Track {
    pub fn new(id: u32) -> Self {
        Track {
            id,
            chunks: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(|c| c.samples.len()).sum()
    }

    /// Sum of the sizes of every sample in this track.
    pub fn size(&self, samples: &[Sample]) -> u64 {
        self.chunks.iter().map(|c| c.size(samples)).sum()
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl PartialOrd for Track {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Track {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// Collects tracks and the flat sample list while a track-metadata source
/// describes a media-data box.
///
/// Push order is the order samples are expected to appear in the file.
#[derive(Debug, Default)]
pub struct LayoutBuilder {
    tracks: HashMap<u32, Track>,
    samples: Vec<Sample>,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk of `track_id` given as `(offset, size)` pairs.
    pub fn push_chunk<I>(&mut self, track_id: u32, samples: I)
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let track = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| Track::new(track_id));
        let chunk_index = track.chunks.len();
        let mut chunk = Chunk::default();
        for (offset, size) in samples {
            chunk.samples.push(self.samples.len());
            self.samples
                .push(Sample::new(track_id, chunk_index, offset, size));
        }
        track.chunks.push(chunk);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub(crate) fn finish(self) -> (HashMap<u32, Track>, Vec<Sample>) {
        (self.tracks, self.samples)
    }
}

/// Rebuild every chunk's index list from the flat sample list.
pub(crate) fn reindex(tracks: &mut HashMap<u32, Track>, samples: &[Sample]) {
    for track in tracks.values_mut() {
        for chunk in &mut track.chunks {
            chunk.samples.clear();
        }
    }
    for (i, s) in samples.iter().enumerate() {
        if let Some(chunk) = tracks
            .get_mut(&s.track_id)
            .and_then(|t| t.chunks.get_mut(s.chunk))
        {
            chunk.samples.push(i);
        }
    }
}
