#![allow(dead_code)]

pub fn bx(typ: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(8 + content.len());
    v.extend_from_slice(&(8 + content.len() as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(content);
    v
}

pub fn full(typ: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut content = vec![version];
    content.extend_from_slice(&flags.to_be_bytes()[1..]);
    content.extend_from_slice(body);
    bx(typ, &content)
}

fn be32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn ftyp() -> Vec<u8> {
    // [ftyp box]
    // size: 24, major brand isom, minor 512, one compatible brand
    let mut body = b"isom".to_vec();
    body.extend_from_slice(&512u32.to_be_bytes());
    body.extend_from_slice(b"isom");
    bx(b"ftyp", &body)
}

pub fn tkhd(track_id: u32) -> Vec<u8> {
    // creation, modification, track id, reserved, duration
    full(b"tkhd", 0, 3, &be32s(&[0, 0, track_id, 0, 0]))
}

pub fn stsz(sizes: &[u32]) -> Vec<u8> {
    let mut body = be32s(&[0, sizes.len() as u32]);
    body.extend(be32s(sizes));
    full(b"stsz", 0, 0, &body)
}

pub fn stsc(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut body = be32s(&[entries.len() as u32]);
    for &(first_chunk, per_chunk) in entries {
        body.extend(be32s(&[first_chunk, per_chunk, 1]));
    }
    full(b"stsc", 0, 0, &body)
}

pub fn stco(offsets: &[u32]) -> Vec<u8> {
    let mut body = be32s(&[offsets.len() as u32]);
    body.extend(be32s(offsets));
    full(b"stco", 0, 0, &body)
}

pub fn co64(offsets: &[u64]) -> Vec<u8> {
    let mut body = be32s(&[offsets.len() as u32]);
    body.extend(offsets.iter().flat_map(|o| o.to_be_bytes()));
    full(b"co64", 0, 0, &body)
}

/// One `trak` of a synthetic movie. Chunk offsets are relative to the start
/// of the media data content.
#[derive(Clone)]
pub struct TrackDef {
    pub id: u32,
    pub sizes: Vec<u32>,
    pub stsc: Vec<(u32, u32)>,
    pub chunk_offsets: Vec<i64>,
}

fn trak(t: &TrackDef, base: i64) -> Vec<u8> {
    let offsets: Vec<u32> = t.chunk_offsets.iter().map(|o| (base + o) as u32).collect();
    let stbl = bx(b"stbl", &[stsz(&t.sizes), stsc(&t.stsc), stco(&offsets)].concat());
    let mdia = bx(b"mdia", &bx(b"minf", &stbl));
    bx(b"trak", &[tkhd(t.id), mdia].concat())
}

fn moov(tracks: &[TrackDef], base: i64) -> Vec<u8> {
    let traks: Vec<u8> = tracks.iter().flat_map(|t| trak(t, base)).collect();
    bx(b"moov", &traks)
}

/// `ftyp` + `moov` + `mdat(payload)`, with chunk offsets resolved against
/// the final position of the media data.
pub fn movie_file(tracks: &[TrackDef], payload: &[u8]) -> Vec<u8> {
    let ftyp = ftyp();
    let moov_len = moov(tracks, 0).len();
    let base = (ftyp.len() + moov_len + 8) as i64;
    [ftyp, moov(tracks, base), bx(b"mdat", payload)].concat()
}

/// Payload whose bytes identify their own position.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Two interleaved tracks over a 50-byte payload:
/// track 1 chunk 1 (10 + 20), track 2 chunk 1 (7 + 8), track 1 chunk 2 (5).
pub fn two_tracks() -> Vec<TrackDef> {
    vec![
        TrackDef {
            id: 1,
            sizes: vec![10, 20, 5],
            stsc: vec![(1, 2), (2, 1)],
            chunk_offsets: vec![0, 45],
        },
        TrackDef {
            id: 2,
            sizes: vec![7, 8],
            stsc: vec![(1, 2)],
            chunk_offsets: vec![30],
        },
    ]
}

pub const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x020000;
pub const TRUN_DATA_OFFSET: u32 = 0x000001;
pub const TRUN_SAMPLE_SIZE: u32 = 0x000200;

pub fn traf(track_id: u32, data_offset: i32, sizes: Option<&[u32]>, count: u32) -> Vec<u8> {
    let tfhd = full(b"tfhd", 0, TFHD_DEFAULT_BASE_IS_MOOF, &track_id.to_be_bytes());
    let mut flags = TRUN_DATA_OFFSET;
    let mut body = count.to_be_bytes().to_vec();
    body.extend_from_slice(&data_offset.to_be_bytes());
    if let Some(sizes) = sizes {
        flags |= TRUN_SAMPLE_SIZE;
        body.extend(be32s(sizes));
    }
    let trun = full(b"trun", 0, flags, &body);
    bx(b"traf", &[tfhd, trun].concat())
}

pub fn mfhd(sequence: u32) -> Vec<u8> {
    full(b"mfhd", 0, 0, &sequence.to_be_bytes())
}

pub fn trex(track_id: u32, default_size: u32) -> Vec<u8> {
    full(b"trex", 0, 0, &be32s(&[track_id, 1, 0, default_size, 0]))
}
