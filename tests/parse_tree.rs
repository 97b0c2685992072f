mod common;

use common::*;
use isobmff_tree::boxes::{BoxHeader, BoxKey, FourCC};
use isobmff_tree::known_boxes::{MDAT, MOOV};
use isobmff_tree::parser::{BoxParser, ParseContext, ParseError, Parsed, read_box_header};
use isobmff_tree::registry::{Registry, default_registry};
use isobmff_tree::tree::{ContainerBox, IsoBox, RawBox};
use isobmff_tree::util::ReadSeek;
use isobmff_tree::{IsoFile, MediaDataBox};
use std::any::Any;
use std::io::{self, Cursor, Read, Write};

#[test]
fn read_single_ftyp_header() {
    let mut cur = Cursor::new(ftyp());
    let hdr = read_box_header(&mut cur, 24).unwrap().unwrap();

    assert_eq!(hdr.start, 0);
    assert_eq!(hdr.size, 24);
    assert_eq!(hdr.typ, FourCC(*b"ftyp"));
    assert_eq!(hdr.header_size, 8);
    assert!(!hdr.is_large());
}

#[test]
fn short_tail_is_end_of_stream() {
    let mut cur = Cursor::new(vec![0u8; 7]);
    assert!(read_box_header(&mut cur, 7).unwrap().is_none());
    assert_eq!(cur.position(), 0);

    let parser = BoxParser::default();
    let mut ctx = ParseContext::new();
    let parsed = parser.parse_one(&mut cur, 7, None, &mut ctx).unwrap();
    assert!(matches!(parsed, Parsed::EndOfStream));
}

#[test]
fn empty_moov_then_mdat() {
    let data = [bx(b"moov", &[]), bx(b"mdat", &payload(100))].concat();
    let file = IsoFile::parse(Cursor::new(data)).unwrap();

    assert_eq!(file.boxes().len(), 2);
    assert_eq!(file.boxes()[0].fourcc(), MOOV);
    assert_eq!(file.boxes()[1].fourcc(), MDAT);
    assert_eq!(file.boxes()[0].fourcc().decode(), "moov");
    assert_eq!(file.size(), 116);

    let mdat = file.media_data(1).unwrap();
    assert!(!mdat.is_materialized());
    assert_eq!(mdat.content_size(), 100);
    assert_eq!(mdat.start_offset(), 16);
}

#[test]
fn nested_containers_are_walked() {
    let data = movie_file(&two_tracks(), &payload(50));
    let file = IsoFile::parse(Cursor::new(data)).unwrap();

    let moov = file.movie_box().unwrap();
    let traks = moov.find_all(FourCC(*b"trak"));
    assert_eq!(traks.len(), 2);

    let trak = traks[0].as_container().unwrap();
    let stbl = trak
        .find_path(&[FourCC(*b"mdia"), FourCC(*b"minf"), FourCC(*b"stbl")])
        .unwrap();
    let stsz = stbl.find_first(FourCC(*b"stsz")).unwrap();
    assert!(stsz.as_any().is::<RawBox>());
    // version/flags + size + count + three entries
    assert_eq!(stsz.size(), 8 + 4 + 8 + 12);
}

#[test]
fn size_zero_extends_to_end() {
    let mut data = ftyp();
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(b"mdat");
    data.extend_from_slice(&payload(20));
    let file = IsoFile::parse(Cursor::new(data.clone())).unwrap();

    let mdat = file.media_data(1).unwrap();
    assert!(mdat.header().extends_to_end());
    assert_eq!(mdat.content_size(), 20);
    assert_eq!(file.size(), data.len() as u64);

    // Written back with an explicit size.
    let mut file = file;
    let mut out = Vec::new();
    file.write_to(&mut out).unwrap();
    assert_eq!(out.len(), data.len());
    assert_eq!(&out[24..28], &28u32.to_be_bytes());
    assert_eq!(&out[28..], &data[28..]);
}

#[test]
fn large_size_header_is_parsed_and_narrowed() {
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(b"free");
    data.extend_from_slice(&20u64.to_be_bytes());
    data.extend_from_slice(b"abcd");

    let mut file = IsoFile::parse(Cursor::new(data)).unwrap();
    let free = &file.boxes()[0];
    assert!(free.header().is_large());
    assert_eq!(free.header().header_size, 16);
    assert_eq!(free.size(), 12);

    let mut out = Vec::new();
    file.write_to(&mut out).unwrap();
    assert_eq!(out, bx(b"free", b"abcd"));
}

#[test]
fn uuid_box_keys_on_extended_type() {
    let uuid = [0x11u8; 16];
    let mut content = uuid.to_vec();
    content.extend_from_slice(b"xyz");
    let data = bx(b"uuid", &content);

    let mut file = IsoFile::parse(Cursor::new(data.clone())).unwrap();
    let b = &file.boxes()[0];
    assert_eq!(b.key(), BoxKey::Uuid(uuid));
    assert_eq!(b.header_size(), 24);
    assert_eq!(b.key().to_string(), format!("uuid:{}", "11".repeat(16)));
    assert_eq!(b.as_any().downcast_ref::<RawBox>().unwrap().content(), b"xyz");

    let mut out = Vec::new();
    file.write_to(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn header_shorter_than_its_extensions_is_malformed() {
    let mut data = 1u32.to_be_bytes().to_vec();
    data.extend_from_slice(b"free");
    data.extend_from_slice(&[0, 0, 0, 0]);

    let err = IsoFile::parse(Cursor::new(data)).err().unwrap();
    assert!(matches!(
        err,
        ParseError::MalformedHeader {
            offset: 0,
            needed: 16,
            available: 12,
            ..
        }
    ));
}

#[test]
fn size_below_header_is_invalid() {
    let mut data = 4u32.to_be_bytes().to_vec();
    data.extend_from_slice(b"free");
    data.extend_from_slice(&[0; 8]);

    let err = IsoFile::parse(Cursor::new(data)).err().unwrap();
    assert!(matches!(err, ParseError::InvalidSize { offset: 0, size: 4 }));
}

#[test]
fn box_running_past_its_parent_is_truncated() {
    let mut data = 100u32.to_be_bytes().to_vec();
    data.extend_from_slice(b"free");
    data.extend_from_slice(&[0; 8]);

    let err = IsoFile::parse(Cursor::new(data)).err().unwrap();
    match err {
        ParseError::Truncated {
            key,
            declared,
            available,
            ..
        } => {
            assert_eq!(key, BoxKey::FourCC(FourCC(*b"free")));
            assert_eq!(declared, 92);
            assert_eq!(available, 8);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn large_size_past_the_address_space_is_invalid() {
    let mut data = ftyp();
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(b"free");
    data.extend_from_slice(&u64::MAX.to_be_bytes());
    data.extend_from_slice(&[0; 8]);

    let err = IsoFile::parse(Cursor::new(data)).err().unwrap();
    assert!(matches!(
        err,
        ParseError::InvalidSize {
            offset: 24,
            size: u64::MAX
        }
    ));
}

#[test]
fn trailing_bytes_are_kept() {
    let mut data = ftyp();
    data.extend_from_slice(&[1, 2, 3, 4, 5]);

    let mut file = IsoFile::parse(Cursor::new(data.clone())).unwrap();
    assert_eq!(file.boxes().len(), 1);
    assert_eq!(file.root().dead_bytes(), &[1, 2, 3, 4, 5]);
    assert_eq!(file.size(), 29);

    let mut out = Vec::new();
    file.write_to(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn fourcc_text_conversions() {
    assert_eq!(FourCC::encode("moov"), MOOV);
    assert_eq!(FourCC::encode("moov").decode(), "moov");
    assert_eq!(FourCC::encode("ab"), FourCC(*b"ab\0\0"));
    assert_eq!(FourCC::encode("abcdef"), FourCC(*b"abcd"));
    assert_eq!(MDAT.to_string(), "mdat");
}

// ---------- Registry ----------

/// A leaf holding one big-endian u32, optionally reading less than declared.
#[derive(Debug)]
struct ValueBox {
    header: BoxHeader,
    value: u32,
    read: usize,
}

impl IsoBox for ValueBox {
    fn header(&self) -> &BoxHeader {
        &self.header
    }

    fn payload_size(&self) -> u64 {
        4
    }

    fn parse_content(
        &mut self,
        r: &mut dyn ReadSeek,
        _content_len: u64,
        _parser: &BoxParser,
        _ctx: &mut ParseContext,
    ) -> Result<(), ParseError> {
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf[..self.read])?;
        self.value = u32::from_be_bytes(buf);
        Ok(())
    }

    fn write(&self, out: &mut dyn Write, _src: &mut dyn ReadSeek) -> io::Result<()> {
        BoxHeader::for_content(self.key(), 4, self.header.start).write(out)?;
        out.write_all(&self.value.to_be_bytes())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn value_box(h: &BoxHeader) -> Box<dyn IsoBox> {
    Box::new(ValueBox {
        header: h.clone(),
        value: 0,
        read: 4,
    })
}

fn short_value_box(h: &BoxHeader) -> Box<dyn IsoBox> {
    Box::new(ValueBox {
        header: h.clone(),
        value: 0,
        read: 2,
    })
}

const VALU: FourCC = FourCC(*b"valu");

#[test]
fn scoped_registration_only_applies_inside_parent() {
    let registry = default_registry().with_scoped_box(MOOV, BoxKey::FourCC(VALU), "Value", Box::new(value_box));
    assert!(registry.contains(Some(MOOV), BoxKey::FourCC(VALU)));
    assert!(!registry.contains(None, BoxKey::FourCC(VALU)));
    assert_eq!(registry.name_of(Some(MOOV), BoxKey::FourCC(VALU)), Some("Value"));

    let value = bx(b"valu", &7u32.to_be_bytes());
    let data = [value.clone(), bx(b"moov", &value)].concat();
    let mut file = IsoFile::parse_with(Cursor::new(data.clone()), registry).unwrap();

    assert!(file.boxes()[0].as_any().is::<RawBox>());
    let moov = file.movie_box().unwrap();
    let inner = moov.find_first(VALU).unwrap();
    assert_eq!(inner.as_any().downcast_ref::<ValueBox>().unwrap().value, 7);

    let mut out = Vec::new();
    file.write_to(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn unscoped_registration_applies_everywhere() {
    let registry = Registry::new().with_box(BoxKey::FourCC(VALU), "Value", Box::new(value_box));
    let data = bx(b"valu", &9u32.to_be_bytes());
    let file = IsoFile::parse_with(Cursor::new(data), registry).unwrap();
    assert_eq!(file.boxes()[0].as_any().downcast_ref::<ValueBox>().unwrap().value, 9);
}

#[test]
fn empty_registry_treats_containers_as_opaque() {
    let data = movie_file(&two_tracks(), &payload(50));
    let file = IsoFile::parse_with(Cursor::new(data), Registry::new()).unwrap();
    assert!(file.boxes()[1].as_any().is::<RawBox>());
    assert!(file.boxes()[2].as_any().downcast_ref::<MediaDataBox>().is_none());
    assert!(file.movie_box().is_none());
}

#[test]
fn under_consuming_box_is_rejected() {
    let registry = Registry::new().with_box(BoxKey::FourCC(VALU), "Short", Box::new(short_value_box));
    let data = bx(b"valu", &[0, 0, 0, 1]);
    let err = IsoFile::parse_with(Cursor::new(data), registry).err().unwrap();
    assert!(matches!(
        err,
        ParseError::ContentLengthMismatch {
            offset: 0,
            declared: 4,
            consumed: 2,
            ..
        }
    ));
}

#[test]
fn root_container_has_no_header() {
    let root = ContainerBox::root();
    assert!(root.is_root());
    assert_eq!(root.header_size(), 0);
    assert_eq!(root.size(), 0);
}
