use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;
use std::io::{self, Write};

/// Type code marking a box whose effective type is the 16-byte extended type.
pub const EXTENDED_TYPE: FourCC = FourCC(*b"uuid");

/// Smallest possible header: 32-bit size + type code.
pub const MIN_HEADER_SIZE: u64 = 8;

/// Total box sizes at or above this value need the 64-bit size field.
pub const LARGE_SIZE_THRESHOLD: u64 = 1 << 32;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Build a type code from text. Shorter input is zero-padded, longer input
    /// is truncated; each character contributes its low byte.
    pub fn encode(s: &str) -> Self {
        let mut b = [0u8; 4];
        for (slot, c) in b.iter_mut().zip(s.chars()) {
            *slot = c as u32 as u8;
        }
        FourCC(b)
    }

    /// Build a type code from up to four raw bytes, zero-padding short input.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut b = [0u8; 4];
        let n = bytes.len().min(4);
        b[..n].copy_from_slice(&bytes[..n]);
        FourCC(b)
    }

    /// Exact single-byte (Latin-1) rendering. Every byte maps to one char, so
    /// this never fails, NUL bytes included.
    pub fn decode(&self) -> String {
        self.0.iter().map(|&c| c as char).collect()
    }

    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(b: &[u8; 4]) -> Self {
        FourCC(*b)
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}
impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

/// Effective type of a box: a plain 4CC, or the extended type of a `uuid` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKey {
    FourCC(FourCC),
    Uuid([u8; 16]),
}

impl BoxKey {
    /// The type code written in the header (`uuid` for extended types).
    pub fn fourcc(&self) -> FourCC {
        match self {
            BoxKey::FourCC(cc) => *cc,
            BoxKey::Uuid(_) => EXTENDED_TYPE,
        }
    }

    pub fn uuid(&self) -> Option<[u8; 16]> {
        match self {
            BoxKey::FourCC(_) => None,
            BoxKey::Uuid(u) => Some(*u),
        }
    }
}

impl From<FourCC> for BoxKey {
    fn from(cc: FourCC) -> Self {
        BoxKey::FourCC(cc)
    }
}

impl fmt::Display for BoxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxKey::FourCC(cc) => write!(f, "{cc}"),
            BoxKey::Uuid(u) => write!(f, "uuid:{}", hex::encode(u)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub size: u64,          // total size including header, or 0=to parent end
    pub typ: FourCC,        // 4CC or b"uuid"
    pub uuid: Option<[u8; 16]>,
    pub header_size: u64,   // 8, 16, 24 or 32
    pub start: u64,         // file offset of header start
}

impl BoxHeader {
    /// Narrowest header able to describe `content_len` bytes of content.
    pub fn for_content(key: BoxKey, content_len: u64, start: u64) -> Self {
        let header_size = header_size_for(&key, content_len);
        BoxHeader {
            size: header_size + content_len,
            typ: key.fourcc(),
            uuid: key.uuid(),
            header_size,
            start,
        }
    }

    pub fn key(&self) -> BoxKey {
        match self.uuid {
            Some(u) if self.typ == EXTENDED_TYPE => BoxKey::Uuid(u),
            _ => BoxKey::FourCC(self.typ),
        }
    }

    /// Declared size 0: the box runs to the end of its enclosing region.
    pub fn extends_to_end(&self) -> bool {
        self.size == 0
    }

    pub fn is_large(&self) -> bool {
        self.header_size == 16 || self.header_size == 32
    }

    pub fn content_start(&self) -> u64 {
        self.start + self.header_size
    }

    /// Encode this header. The 64-bit size form is used iff `header_size`
    /// says so; `size` must already be the final total size.
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        if self.is_large() {
            w.write_u32::<BigEndian>(1)?;
            w.write_all(&self.typ.0)?;
            w.write_u64::<BigEndian>(self.size)?;
        } else {
            let size32 = u32::try_from(self.size).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("box size {} does not fit a compact header", self.size),
                )
            })?;
            w.write_u32::<BigEndian>(size32)?;
            w.write_all(&self.typ.0)?;
        }
        if let Some(u) = self.uuid {
            w.write_all(&u)?;
        }
        Ok(())
    }
}

/// Header width for a box of the given type carrying `content_len` bytes.
pub fn header_size_for(key: &BoxKey, content_len: u64) -> u64 {
    let ext = if key.uuid().is_some() { 16 } else { 0 };
    let compact = MIN_HEADER_SIZE + ext;
    if compact.saturating_add(content_len) >= LARGE_SIZE_THRESHOLD {
        compact + 8
    } else {
        compact
    }
}
