use std::io::{self, Read, Seek, SeekFrom, Write};

/// Block size used when streaming byte ranges out of the backing source.
pub const COPY_BLOCK: usize = 1024;

/// Object-safe `Read + Seek`, so boxes can take the backing source as `&mut dyn ReadSeek`.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// A byte range of the backing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub offset: u64,
    pub length: u64,
}

impl Region {
    pub fn new(offset: u64, length: u64) -> Self {
        Region { offset, length }
    }

    /// One past the last byte, clamped to `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    /// Whether the two ranges share at least one byte.
    pub fn overlaps(&self, other: Region) -> bool {
        other.offset < self.end() && self.offset < other.end()
    }
}

pub fn read_slice<R: Read + Seek + ?Sized>(r: &mut R, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    r.seek(SeekFrom::Start(offset))?;
    let mut v = vec![0u8; len as usize];
    r.read_exact(&mut v)?;
    Ok(v)
}

/// Stream `region` from `src` into `out` in `COPY_BLOCK` sized pieces, so the
/// whole range never has to sit in memory at once.
pub fn copy_region<R, W>(src: &mut R, region: Region, out: &mut W) -> io::Result<()>
where
    R: Read + Seek + ?Sized,
    W: Write + ?Sized,
{
    if region.length == 0 {
        return Ok(());
    }
    src.seek(SeekFrom::Start(region.offset))?;
    let mut buf = [0u8; COPY_BLOCK];
    let mut remaining = region.length;
    while remaining > 0 {
        let n = remaining.min(COPY_BLOCK as u64) as usize;
        src.read_exact(&mut buf[..n])?;
        out.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<48}  |{}|\n", offs, hexs, ascii));
    }
    out
}
