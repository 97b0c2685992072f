use crate::boxes::{BoxHeader, BoxKey, EXTENDED_TYPE, FourCC, MIN_HEADER_SIZE};
use crate::known_boxes::MOOF;
use crate::registry::{Registry, default_registry};
use crate::tree::IsoBox;
use crate::util::ReadSeek;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Read, Seek};
use tracing::{debug, trace};

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed header at offset {offset}: '{typ}' needs {needed} header bytes, {available} available")]
    MalformedHeader {
        offset: u64,
        typ: FourCC,
        needed: u64,
        available: u64,
    },
    #[error("invalid box size {size} at offset {offset}")]
    InvalidSize { offset: u64, size: u64 },
    #[error("box '{key}' at offset {offset} declares {declared} content bytes, only {available} remain")]
    Truncated {
        key: BoxKey,
        offset: u64,
        declared: u64,
        available: u64,
    },
    #[error("box '{key}' at offset {offset} consumed {consumed} of {declared} content bytes")]
    ContentLengthMismatch {
        key: BoxKey,
        offset: u64,
        declared: u64,
        consumed: u64,
    },
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Outcome of [`BoxParser::parse_one`].
#[derive(Debug)]
pub enum Parsed {
    Box(Box<dyn IsoBox>),
    /// Fewer bytes than a minimal header remain before the end of the region.
    EndOfStream,
}

/// Read one box header, never looking past `end`.
///
/// Returns `Ok(None)` when fewer than 8 bytes remain; the cursor is left
/// untouched in that case.
pub fn read_box_header<R: Read + Seek + ?Sized>(r: &mut R, end: u64) -> Result<Option<BoxHeader>> {
    let start = r.stream_position()?;
    let available = end.saturating_sub(start);
    if available < MIN_HEADER_SIZE {
        return Ok(None);
    }

    let size32 = r.read_u32::<BigEndian>()?;
    let mut typ = [0u8; 4];
    r.read_exact(&mut typ)?;
    let typ = FourCC(typ);

    let large = size32 == 1;
    let extended = typ == EXTENDED_TYPE;
    let header_size = match (large, extended) {
        (true, true) => 8 + 8 + 16,
        (true, false) => 8 + 8,
        (false, true) => 8 + 16,
        (false, false) => 8,
    };

    if available < header_size {
        return Err(ParseError::MalformedHeader {
            offset: start,
            typ,
            needed: header_size,
            available,
        });
    }

    let size = if large {
        r.read_u64::<BigEndian>()?
    } else {
        size32 as u64
    };

    let mut uuid = None;
    if extended {
        let mut u = [0u8; 16];
        r.read_exact(&mut u)?;
        uuid = Some(u);
    }

    // 0 means "to the end of the enclosing region", but only in the 32-bit field.
    if (large || size != 0) && size < header_size {
        return Err(ParseError::InvalidSize {
            offset: start,
            size,
        });
    }

    Ok(Some(BoxHeader {
        size,
        typ,
        uuid,
        header_size,
        start,
    }))
}

/// State threaded through a parse pass.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    depth: usize,
    last_fragment: Option<usize>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nesting level of the box currently being parsed (0 = top level).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Index among the top-level boxes of the most recent movie fragment.
    pub fn last_fragment(&self) -> Option<usize> {
        self.last_fragment
    }

    pub(crate) fn observe(&mut self, index: usize, b: &dyn IsoBox) {
        if self.depth == 0 && b.fourcc() == MOOF {
            self.last_fragment = Some(index);
        }
    }
}

/// Decodes headers and dispatches content parsing through a [`Registry`].
pub struct BoxParser {
    registry: Registry,
}

impl BoxParser {
    pub fn new(registry: Registry) -> Self {
        BoxParser { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parse the next box of a region ending at `end`.
    ///
    /// `parent` is the type of the enclosing container (`None` at top level)
    /// and takes part in registry lookup.
    pub fn parse_one(
        &self,
        r: &mut dyn ReadSeek,
        end: u64,
        parent: Option<FourCC>,
        ctx: &mut ParseContext,
    ) -> Result<Parsed> {
        let Some(hdr) = read_box_header(r, end)? else {
            return Ok(Parsed::EndOfStream);
        };

        let content_start = hdr.content_start();
        let box_end = if hdr.extends_to_end() {
            end
        } else {
            hdr.start.checked_add(hdr.size).ok_or(ParseError::InvalidSize {
                offset: hdr.start,
                size: hdr.size,
            })?
        };
        if box_end > end {
            return Err(ParseError::Truncated {
                key: hdr.key(),
                offset: hdr.start,
                declared: box_end - content_start,
                available: end - content_start,
            });
        }
        let content_len = box_end - content_start;

        let mut b = self.registry.create(parent, &hdr);
        ctx.depth += 1;
        let res = b.parse_content(r, content_len, self, ctx);
        ctx.depth -= 1;
        res?;

        let consumed = r.stream_position()?.saturating_sub(content_start);
        if consumed != content_len {
            return Err(ParseError::ContentLengthMismatch {
                key: hdr.key(),
                offset: hdr.start,
                declared: content_len,
                consumed,
            });
        }

        if ctx.depth == 0 {
            debug!(typ = %hdr.key(), offset = hdr.start, size = box_end - hdr.start, "parsed box");
        } else {
            trace!(typ = %hdr.key(), offset = hdr.start, depth = ctx.depth, "parsed child box");
        }
        Ok(Parsed::Box(b))
    }
}

impl Default for BoxParser {
    fn default() -> Self {
        BoxParser::new(default_registry())
    }
}
