use crate::file::IsoFile;
use crate::known_boxes::KnownBox;
use crate::mdat::MediaDataBox;
use crate::tree::{ContainerBox, IsoBox, RawBox};
use serde::Serialize;
use std::io::{Read, Seek};

/// A JSON-serializable view of one box and its subtree.
///
/// Sizes are the ones the box would serialize to now, which differ from the
/// parsed sizes when a header gets normalized or samples were edited.
#[derive(Debug, Serialize)]
pub struct BoxSummary {
    pub offset: u64,
    pub size: u64,
    pub header_size: u64,
    pub typ: String,
    pub uuid: Option<String>,
    pub kind: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_data: Option<MediaDataSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BoxSummary>>,
}

#[derive(Debug, Serialize)]
pub struct TrackSummary {
    pub id: u32,
    pub chunks: usize,
    pub samples: usize,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct MediaDataSummary {
    pub content_offset: u64,
    pub materialized: bool,
    pub fragment: bool,
    pub content_size: u64,
    pub dead_bytes_before: u64,
    pub dead_bytes_after: u64,
    pub tracks: Vec<TrackSummary>,
}

impl MediaDataSummary {
    pub fn of(mdat: &MediaDataBox) -> Self {
        let tracks = mdat
            .tracks()
            .into_iter()
            .map(|t| TrackSummary {
                id: t.id(),
                chunks: t.chunks().len(),
                samples: t.sample_count(),
                size: t.size(mdat.samples()),
            })
            .collect();
        MediaDataSummary {
            content_offset: mdat.start_offset(),
            materialized: mdat.is_materialized(),
            fragment: mdat.is_fragment(),
            content_size: mdat.content_size(),
            dead_bytes_before: mdat.dead_bytes_before().len() as u64,
            dead_bytes_after: mdat.dead_bytes_after(),
            tracks,
        }
    }
}

impl BoxSummary {
    /// Summarize `b`, descending at most `max_depth` container levels.
    pub fn of(b: &dyn IsoBox, max_depth: usize) -> Self {
        let key = b.key();
        let any = b.as_any();

        let (kind, media_data) = if let Some(mdat) = any.downcast_ref::<MediaDataBox>() {
            ("media-data", Some(MediaDataSummary::of(mdat)))
        } else if any.is::<ContainerBox>() {
            ("container", None)
        } else if any.is::<RawBox>() {
            ("raw", None)
        } else {
            ("custom", None)
        };

        let children = b.as_container().map(|c| {
            if max_depth == 0 {
                Vec::new()
            } else {
                summarize_children(c, max_depth - 1)
            }
        });

        BoxSummary {
            offset: b.offset(),
            size: b.size(),
            header_size: b.header_size(),
            typ: key.fourcc().to_string(),
            uuid: key.uuid().map(hex::encode),
            kind: kind.to_string(),
            full_name: KnownBox::from(key.fourcc()).full_name().to_string(),
            media_data,
            children,
        }
    }
}

pub fn summarize_children(c: &ContainerBox, max_depth: usize) -> Vec<BoxSummary> {
    c.children()
        .iter()
        .map(|b| BoxSummary::of(b.as_ref(), max_depth))
        .collect()
}

/// Summaries of every top-level box of `file`.
pub fn summarize<R: Read + Seek>(file: &IsoFile<R>, max_depth: usize) -> Vec<BoxSummary> {
    summarize_children(file.root(), max_depth)
}
