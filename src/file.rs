use crate::boxes::FourCC;
use crate::known_boxes::MOOV;
use crate::mdat::{MaterializeError, MediaDataBox};
use crate::parser::{BoxParser, ParseContext, ParseError};
use crate::registry::Registry;
use crate::sample_table::{FragmentSource, MovieSource, TrackMetadataSource};
use crate::tree::{ContainerBox, IsoBox, RawBox};
use crate::util::ReadSeek;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{debug, warn};

/// An in-memory ISO base media file: the headerless root container plus the
/// stream it was parsed from.
///
/// The stream stays owned by the file because unparsed media data is read
/// from it again on write and on materialization.
pub struct IsoFile<R> {
    source: R,
    root: ContainerBox,
    parser: BoxParser,
}

impl<R: Read + Seek> IsoFile<R> {
    /// Parse `source` from its current position to its end with the default
    /// registry.
    pub fn parse(source: R) -> Result<Self, ParseError> {
        Self::parse_with(source, crate::registry::default_registry())
    }

    pub fn parse_with(mut source: R, registry: Registry) -> Result<Self, ParseError> {
        let start = source.stream_position()?;
        let end = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(start))?;

        let parser = BoxParser::new(registry);
        let mut root = ContainerBox::root();
        let mut ctx = ParseContext::new();
        root.parse_children(&mut source, end, &parser, &mut ctx)?;

        if !root.dead_bytes().is_empty() {
            warn!(
                len = root.dead_bytes().len(),
                "stream ends with bytes too short for a box header"
            );
        }
        debug!(boxes = root.children().len(), size = end - start, "parsed file");

        Ok(IsoFile {
            source,
            root,
            parser,
        })
    }

    pub fn root(&self) -> &ContainerBox {
        &self.root
    }

    pub fn boxes(&self) -> &[Box<dyn IsoBox>] {
        self.root.children()
    }

    pub fn registry(&self) -> &Registry {
        self.parser.registry()
    }

    pub fn find_first(&self, typ: FourCC) -> Option<&dyn IsoBox> {
        self.root.find_first(typ)
    }

    pub fn find_all(&self, typ: FourCC) -> Vec<&dyn IsoBox> {
        self.root.find_all(typ)
    }

    /// The top-level `moov`, if any. Files carrying only media data have none.
    pub fn movie_box(&self) -> Option<&ContainerBox> {
        self.root.find_container(MOOV)
    }

    /// Sum of the sizes of all top-level boxes.
    pub fn size(&self) -> u64 {
        self.root.size()
    }

    /// Indices of the top-level media-data boxes.
    pub fn media_data_indices(&self) -> Vec<usize> {
        self.boxes()
            .iter()
            .enumerate()
            .filter(|(_, b)| b.as_any().is::<MediaDataBox>())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn media_data(&self, index: usize) -> Option<&MediaDataBox> {
        self.boxes()
            .get(index)
            .and_then(|b| b.as_any().downcast_ref::<MediaDataBox>())
    }

    pub fn media_data_mut(&mut self, index: usize) -> Option<&mut MediaDataBox> {
        self.root
            .children_mut()
            .get_mut(index)
            .and_then(|b| b.as_any_mut().downcast_mut::<MediaDataBox>())
    }

    /// Materialize the media-data box at top-level `index` from the metadata
    /// that describes it: the preceding movie fragment if there is one, the
    /// movie box otherwise.
    pub fn materialize(&mut self, index: usize) -> Result<(), MaterializeError> {
        let mdat = self
            .media_data(index)
            .ok_or(MaterializeError::NotMediaData { index })?;
        if mdat.is_materialized() {
            return Ok(());
        }
        let fragment = mdat.fragment_index();
        let offset = mdat.offset();

        self.with_detached(index, |root, mdat, src| {
            let movie = root.find_container(MOOV);
            let moof = fragment
                .and_then(|i| root.children().get(i))
                .and_then(|b| b.as_container());
            match (moof, movie) {
                (Some(moof), moov) => mdat.materialize(&FragmentSource::new(moof, moov), src),
                (None, Some(moov)) => mdat.materialize(&MovieSource::new(moov), src),
                (None, None) => Err(MaterializeError::MissingMetadata { offset }),
            }
        })
    }

    /// Materialize with a caller-supplied metadata source.
    pub fn materialize_with(
        &mut self,
        index: usize,
        source: &dyn TrackMetadataSource,
    ) -> Result<(), MaterializeError> {
        self.with_detached(index, |_, mdat, src| mdat.materialize(source, src))
    }

    /// Run `f` on the media-data box at `index` while it is lifted out of the
    /// tree, so `f` can read its siblings. A placeholder holds the slot so
    /// sibling indices stay valid; the box is put back whatever `f` returns.
    fn with_detached<F>(&mut self, index: usize, f: F) -> Result<(), MaterializeError>
    where
        F: FnOnce(&ContainerBox, &mut MediaDataBox, &mut dyn ReadSeek) -> Result<(), MaterializeError>,
    {
        let slot = self
            .root
            .children_mut()
            .get_mut(index)
            .ok_or(MaterializeError::NotMediaData { index })?;
        let placeholder: Box<dyn IsoBox> = Box::new(RawBox::new(slot.header().clone()));
        let mut detached = std::mem::replace(slot, placeholder);

        let result = match detached.as_any_mut().downcast_mut::<MediaDataBox>() {
            Some(mdat) => f(&self.root, mdat, &mut self.source),
            None => Err(MaterializeError::NotMediaData { index }),
        };
        self.root.children_mut()[index] = detached;
        result
    }

    /// Materialize every top-level media-data box, stopping at the first error.
    pub fn materialize_all(&mut self) -> Result<(), MaterializeError> {
        for index in self.media_data_indices() {
            self.materialize(index)?;
        }
        Ok(())
    }

    /// Serialize the whole tree.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        self.root.write(out, &mut self.source)
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}
