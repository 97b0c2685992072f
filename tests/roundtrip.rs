mod common;

use common::*;
use isobmff_tree::IsoFile;
use isobmff_tree::boxes::{BoxHeader, BoxKey, LARGE_SIZE_THRESHOLD, header_size_for};
use isobmff_tree::known_boxes::MDAT;
use isobmff_tree::parser::read_box_header;
use std::cell::Cell;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;

fn write_all<R: Read + Seek>(file: &mut IsoFile<R>) -> Vec<u8> {
    let mut out = Vec::new();
    file.write_to(&mut out).unwrap();
    out
}

#[test]
fn unparsed_file_round_trips() {
    let data = movie_file(&two_tracks(), &payload(50));
    let mut file = IsoFile::parse(Cursor::new(data.clone())).unwrap();
    assert_eq!(file.size(), data.len() as u64);
    assert_eq!(write_all(&mut file), data);
}

#[test]
fn materialized_file_round_trips() {
    let data = movie_file(&two_tracks(), &payload(50));
    let mut file = IsoFile::parse(Cursor::new(data.clone())).unwrap();
    file.materialize_all().unwrap();

    assert!(file.media_data(2).unwrap().is_materialized());
    assert_eq!(file.size(), data.len() as u64);
    assert_eq!(write_all(&mut file), data);
}

/// Counts `read` calls made on the wrapped source.
struct CountingReader {
    inner: Cursor<Vec<u8>>,
    reads: Rc<Cell<usize>>,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.set(self.reads.get() + 1);
        self.inner.read(buf)
    }
}

impl Seek for CountingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
fn materialize_is_idempotent() {
    let mut tracks = two_tracks();
    for t in &mut tracks {
        for o in &mut t.chunk_offsets {
            *o += 2;
        }
    }
    // the 2-byte lead-in is read from the source on the first call
    let data = movie_file(&tracks, &payload(52));
    let reads = Rc::new(Cell::new(0));
    let source = CountingReader {
        inner: Cursor::new(data.clone()),
        reads: Rc::clone(&reads),
    };
    let mut file = IsoFile::parse(source).unwrap();

    let parsed = reads.get();
    file.materialize(2).unwrap();
    let materialized = reads.get();
    assert!(materialized > parsed);
    let count = file.media_data(2).unwrap().sample_count();

    file.materialize(2).unwrap();
    assert_eq!(reads.get(), materialized);
    assert_eq!(file.media_data(2).unwrap().sample_count(), count);

    let first = write_all(&mut file);
    assert_eq!(write_all(&mut file), first);
    assert_eq!(first, data);
}

#[test]
fn dead_bytes_survive_materialization() {
    let mut tracks = two_tracks();
    for t in &mut tracks {
        for o in &mut t.chunk_offsets {
            *o += 6;
        }
    }
    // 6 bytes of lead-in, 50 bytes of samples, 9 bytes after the last sample
    let data = movie_file(&tracks, &payload(65));
    let mut file = IsoFile::parse(Cursor::new(data.clone())).unwrap();
    file.materialize(2).unwrap();

    let mdat = file.media_data(2).unwrap();
    assert_eq!(mdat.dead_bytes_before(), &payload(6)[..]);
    assert_eq!(mdat.dead_bytes_after(), 9);
    assert_eq!(mdat.content_size(), 50);
    assert_eq!(file.size(), data.len() as u64);
    assert_eq!(write_all(&mut file), data);
}

#[test]
fn media_data_without_samples_round_trips() {
    let data = [bx(b"moov", &[]), bx(b"mdat", &payload(100))].concat();
    let mut file = IsoFile::parse(Cursor::new(data.clone())).unwrap();
    file.materialize(1).unwrap();

    let mdat = file.media_data(1).unwrap();
    assert!(mdat.is_materialized());
    assert_eq!(mdat.sample_count(), 0);
    assert_eq!(mdat.dead_bytes_after(), 100);
    assert_eq!(file.size(), 116);
    assert_eq!(write_all(&mut file), data);
}

#[test]
fn payload_larger_than_one_copy_block_round_trips() {
    let tracks = vec![TrackDef {
        id: 1,
        sizes: vec![1500, 700, 3000],
        stsc: vec![(1, 3)],
        chunk_offsets: vec![0],
    }];
    let data = movie_file(&tracks, &payload(5200));
    let mut file = IsoFile::parse(Cursor::new(data.clone())).unwrap();
    assert_eq!(write_all(&mut file), data);

    file.materialize_all().unwrap();
    assert_eq!(file.media_data(2).unwrap().track_size(1), Some(5200));
    assert_eq!(write_all(&mut file), data);
}

#[test]
fn header_widens_at_the_32_bit_boundary() {
    let key = BoxKey::FourCC(MDAT);
    assert_eq!(header_size_for(&key, LARGE_SIZE_THRESHOLD - 9), 8);
    assert_eq!(header_size_for(&key, LARGE_SIZE_THRESHOLD - 8), 16);

    let uuid = BoxKey::Uuid([7; 16]);
    assert_eq!(header_size_for(&uuid, LARGE_SIZE_THRESHOLD - 25), 24);
    assert_eq!(header_size_for(&uuid, LARGE_SIZE_THRESHOLD - 24), 32);

    let mut narrow = Vec::new();
    BoxHeader::for_content(key, LARGE_SIZE_THRESHOLD - 9, 0)
        .write(&mut narrow)
        .unwrap();
    assert_eq!(narrow.len(), 8);
    assert_eq!(&narrow[..4], &u32::MAX.to_be_bytes());

    let mut wide = Vec::new();
    BoxHeader::for_content(key, LARGE_SIZE_THRESHOLD - 8, 0)
        .write(&mut wide)
        .unwrap();
    assert_eq!(wide.len(), 16);
    assert_eq!(&wide[..4], &1u32.to_be_bytes());
    assert_eq!(&wide[4..8], b"mdat");
    assert_eq!(&wide[8..], &(LARGE_SIZE_THRESHOLD + 8).to_be_bytes());

    // Parse the wide form back; only the header bytes are needed for that.
    let hdr = read_box_header(&mut Cursor::new(wide), u64::MAX).unwrap().unwrap();
    assert_eq!(hdr.size, LARGE_SIZE_THRESHOLD + 8);
    assert_eq!(hdr.header_size, 16);
    assert_eq!(hdr.typ, MDAT);
}

#[test]
fn file_backed_round_trip() {
    let data = movie_file(&two_tracks(), &payload(50));
    let path = std::env::temp_dir().join(format!("isobmff-tree-roundtrip-{}.mp4", std::process::id()));
    std::fs::write(&path, &data).unwrap();

    let f = BufReader::new(File::open(&path).unwrap());
    let mut file = IsoFile::parse(f).unwrap();
    file.materialize_all().unwrap();
    let out = write_all(&mut file);

    drop(file);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(out, data);
}
