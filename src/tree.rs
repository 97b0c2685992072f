use crate::boxes::{BoxHeader, BoxKey, FourCC, header_size_for};
use crate::parser::{BoxParser, ParseContext, ParseError, Parsed};
use crate::util::ReadSeek;
use std::any::Any;
use std::fmt;
use std::io::{self, Read, Write};
use tracing::trace;

/// A node of the box tree.
///
/// Implementations are created by the [`Registry`](crate::registry::Registry)
/// from a decoded header and then fill themselves in via `parse_content`.
pub trait IsoBox: fmt::Debug + Any + 'static {
    /// The header this box was parsed from.
    fn header(&self) -> &BoxHeader;

    /// Number of bytes this box serializes to after its header.
    fn payload_size(&self) -> u64;

    /// Read exactly `content_len` bytes of content from `r`. The cursor must
    /// end up at the end of the declared content.
    fn parse_content(
        &mut self,
        r: &mut dyn ReadSeek,
        content_len: u64,
        parser: &BoxParser,
        ctx: &mut ParseContext,
    ) -> Result<(), ParseError>;

    /// Serialize header and content. `src` is the stream the tree was parsed
    /// from, for boxes that kept their content there.
    fn write(&self, out: &mut dyn Write, src: &mut dyn ReadSeek) -> io::Result<()>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn key(&self) -> BoxKey {
        self.header().key()
    }

    fn fourcc(&self) -> FourCC {
        self.header().typ
    }

    /// Offset of the box header in the source stream.
    fn offset(&self) -> u64 {
        self.header().start
    }

    fn header_size(&self) -> u64 {
        header_size_for(&self.key(), self.payload_size())
    }

    fn size(&self) -> u64 {
        self.header_size() + self.payload_size()
    }

    fn as_container(&self) -> Option<&ContainerBox> {
        None
    }
}

impl dyn IsoBox {
    pub fn downcast_ref<T: IsoBox>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: IsoBox>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

fn write_header(out: &mut dyn Write, b: &dyn IsoBox) -> io::Result<()> {
    BoxHeader::for_content(b.key(), b.payload_size(), b.offset()).write(out)
}

/// Box whose content is a sequence of child boxes.
///
/// The root of a file is a `ContainerBox` without a header.
#[derive(Debug)]
pub struct ContainerBox {
    header: BoxHeader,
    is_root: bool,
    children: Vec<Box<dyn IsoBox>>,
    dead_bytes: Vec<u8>,
}

impl ContainerBox {
    pub fn new(header: BoxHeader) -> Self {
        ContainerBox {
            header,
            is_root: false,
            children: Vec::new(),
            dead_bytes: Vec::new(),
        }
    }

    pub fn root() -> Self {
        ContainerBox {
            header: BoxHeader {
                size: 0,
                typ: FourCC([0; 4]),
                uuid: None,
                header_size: 0,
                start: 0,
            },
            is_root: true,
            children: Vec::new(),
            dead_bytes: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn children(&self) -> &[Box<dyn IsoBox>] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Box<dyn IsoBox>] {
        &mut self.children
    }

    pub fn push(&mut self, child: Box<dyn IsoBox>) {
        self.children.push(child);
    }

    /// Trailing bytes too short to hold another header, kept verbatim.
    pub fn dead_bytes(&self) -> &[u8] {
        &self.dead_bytes
    }

    pub fn find_first(&self, typ: FourCC) -> Option<&dyn IsoBox> {
        self.children
            .iter()
            .find(|c| c.fourcc() == typ)
            .map(|c| c.as_ref())
    }

    pub fn find_all(&self, typ: FourCC) -> Vec<&dyn IsoBox> {
        self.children
            .iter()
            .filter(|c| c.fourcc() == typ)
            .map(|c| c.as_ref())
            .collect()
    }

    /// First direct child of type `typ` that is itself a container.
    pub fn find_container(&self, typ: FourCC) -> Option<&ContainerBox> {
        self.children
            .iter()
            .filter(|c| c.fourcc() == typ)
            .find_map(|c| c.as_container())
    }

    /// Follow a path of container types, e.g. `[MDIA, MINF, STBL]`.
    pub fn find_path(&self, path: &[FourCC]) -> Option<&ContainerBox> {
        path.iter()
            .try_fold(self, |node, typ| node.find_container(*typ))
    }

    /// Parse child boxes until `end`. A tail shorter than a header is kept as
    /// dead bytes.
    pub(crate) fn parse_children(
        &mut self,
        r: &mut dyn ReadSeek,
        end: u64,
        parser: &BoxParser,
        ctx: &mut ParseContext,
    ) -> Result<(), ParseError> {
        let parent = if self.is_root { None } else { Some(self.header.typ) };
        while let Parsed::Box(child) = parser.parse_one(r, end, parent, ctx)? {
            ctx.observe(self.children.len(), child.as_ref());
            self.children.push(child);
        }

        let pos = r.stream_position()?;
        if pos < end {
            let mut tail = Vec::new();
            (&mut *r).take(end - pos).read_to_end(&mut tail)?;
            trace!(offset = pos, len = tail.len(), "keeping dead bytes after last child");
            self.dead_bytes = tail;
        }
        Ok(())
    }

    pub(crate) fn write_children(&self, out: &mut dyn Write, src: &mut dyn ReadSeek) -> io::Result<()> {
        for child in &self.children {
            child.write(out, src)?;
        }
        out.write_all(&self.dead_bytes)
    }
}

impl IsoBox for ContainerBox {
    fn header(&self) -> &BoxHeader {
        &self.header
    }

    fn payload_size(&self) -> u64 {
        self.children.iter().map(|c| c.size()).sum::<u64>() + self.dead_bytes.len() as u64
    }

    fn header_size(&self) -> u64 {
        if self.is_root {
            0
        } else {
            header_size_for(&self.key(), self.payload_size())
        }
    }

    fn parse_content(
        &mut self,
        r: &mut dyn ReadSeek,
        content_len: u64,
        parser: &BoxParser,
        ctx: &mut ParseContext,
    ) -> Result<(), ParseError> {
        let end = r.stream_position()? + content_len;
        self.parse_children(r, end, parser, ctx)
    }

    fn write(&self, out: &mut dyn Write, src: &mut dyn ReadSeek) -> io::Result<()> {
        if !self.is_root {
            write_header(out, self)?;
        }
        self.write_children(out, src)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_container(&self) -> Option<&ContainerBox> {
        Some(self)
    }
}

/// Pass-through box for types without a registered implementation.
pub struct RawBox {
    header: BoxHeader,
    content: Vec<u8>,
}

impl RawBox {
    pub fn new(header: BoxHeader) -> Self {
        RawBox {
            header,
            content: Vec::new(),
        }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

impl fmt::Debug for RawBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBox")
            .field("key", &self.header.key())
            .field("offset", &self.header.start)
            .field("content_len", &self.content.len())
            .finish()
    }
}

impl IsoBox for RawBox {
    fn header(&self) -> &BoxHeader {
        &self.header
    }

    fn payload_size(&self) -> u64 {
        self.content.len() as u64
    }

    fn parse_content(
        &mut self,
        r: &mut dyn ReadSeek,
        content_len: u64,
        _parser: &BoxParser,
        _ctx: &mut ParseContext,
    ) -> Result<(), ParseError> {
        let mut content = vec![0u8; content_len as usize];
        r.read_exact(&mut content)?;
        self.content = content;
        Ok(())
    }

    fn write(&self, out: &mut dyn Write, _src: &mut dyn ReadSeek) -> io::Result<()> {
        write_header(out, self)?;
        out.write_all(&self.content)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
