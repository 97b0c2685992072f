use crate::boxes::FourCC;

pub const FTYP: FourCC = FourCC(*b"ftyp");
pub const MOOV: FourCC = FourCC(*b"moov");
pub const MDAT: FourCC = FourCC(*b"mdat");
pub const MOOF: FourCC = FourCC(*b"moof");
pub const TRAK: FourCC = FourCC(*b"trak");
pub const TKHD: FourCC = FourCC(*b"tkhd");
pub const MDIA: FourCC = FourCC(*b"mdia");
pub const MINF: FourCC = FourCC(*b"minf");
pub const STBL: FourCC = FourCC(*b"stbl");
pub const STSZ: FourCC = FourCC(*b"stsz");
pub const STSC: FourCC = FourCC(*b"stsc");
pub const STCO: FourCC = FourCC(*b"stco");
pub const CO64: FourCC = FourCC(*b"co64");
pub const MVEX: FourCC = FourCC(*b"mvex");
pub const TREX: FourCC = FourCC(*b"trex");
pub const TRAF: FourCC = FourCC(*b"traf");
pub const TFHD: FourCC = FourCC(*b"tfhd");
pub const TRUN: FourCC = FourCC(*b"trun");

/// Typed view over the box types this crate names or treats structurally.
///
/// Anything not in this list becomes `KnownBox::Unknown(fourcc)` and is kept
/// as an opaque byte region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBox {
    Ftyp,
    Styp,
    Moov,
    Mdat,
    Free,
    Skip,
    Wide,
    Meta,
    Sidx,
    Mfra,
    Mfro,

    Mvhd,
    Trak,
    Mvex,
    Udta,
    Tkhd,
    Tref,
    Edts,
    Elst,
    Mdia,
    Mdhd,
    Hdlr,
    Minf,
    Dinf,
    Dref,
    Stbl,
    Stsd,
    Stts,
    Ctts,
    Stsc,
    Stsz,
    Stco,
    Co64,
    Stss,

    Mehd,
    Trex,
    Moof,
    Mfhd,
    Traf,
    Tfhd,
    Tfdt,
    Trun,
    Tfra,

    Sinf,
    Schi,

    Uuid,
    Unknown(FourCC),
}

impl From<FourCC> for KnownBox {
    fn from(cc: FourCC) -> Self {
        match &cc.0 {
            b"ftyp" => KnownBox::Ftyp,
            b"styp" => KnownBox::Styp,
            b"moov" => KnownBox::Moov,
            b"mdat" => KnownBox::Mdat,
            b"free" => KnownBox::Free,
            b"skip" => KnownBox::Skip,
            b"wide" => KnownBox::Wide,
            b"meta" => KnownBox::Meta,
            b"sidx" => KnownBox::Sidx,
            b"mfra" => KnownBox::Mfra,
            b"mfro" => KnownBox::Mfro,

            b"mvhd" => KnownBox::Mvhd,
            b"trak" => KnownBox::Trak,
            b"mvex" => KnownBox::Mvex,
            b"udta" => KnownBox::Udta,
            b"tkhd" => KnownBox::Tkhd,
            b"tref" => KnownBox::Tref,
            b"edts" => KnownBox::Edts,
            b"elst" => KnownBox::Elst,
            b"mdia" => KnownBox::Mdia,
            b"mdhd" => KnownBox::Mdhd,
            b"hdlr" => KnownBox::Hdlr,
            b"minf" => KnownBox::Minf,
            b"dinf" => KnownBox::Dinf,
            b"dref" => KnownBox::Dref,
            b"stbl" => KnownBox::Stbl,
            b"stsd" => KnownBox::Stsd,
            b"stts" => KnownBox::Stts,
            b"ctts" => KnownBox::Ctts,
            b"stsc" => KnownBox::Stsc,
            b"stsz" => KnownBox::Stsz,
            b"stco" => KnownBox::Stco,
            b"co64" => KnownBox::Co64,
            b"stss" => KnownBox::Stss,

            b"mehd" => KnownBox::Mehd,
            b"trex" => KnownBox::Trex,
            b"moof" => KnownBox::Moof,
            b"mfhd" => KnownBox::Mfhd,
            b"traf" => KnownBox::Traf,
            b"tfhd" => KnownBox::Tfhd,
            b"tfdt" => KnownBox::Tfdt,
            b"trun" => KnownBox::Trun,
            b"tfra" => KnownBox::Tfra,

            b"sinf" => KnownBox::Sinf,
            b"schi" => KnownBox::Schi,

            b"uuid" => KnownBox::Uuid,

            _ => KnownBox::Unknown(cc),
        }
    }
}

impl KnownBox {
    pub fn full_name(&self) -> &'static str {
        match self {
            KnownBox::Ftyp => "File Type Box",
            KnownBox::Styp => "Segment Type Box",
            KnownBox::Moov => "Movie Box",
            KnownBox::Mdat => "Media Data Box",
            KnownBox::Free => "Free Space Box",
            KnownBox::Skip => "Skip Box",
            KnownBox::Wide => "Wide Box",
            KnownBox::Meta => "Meta Box",
            KnownBox::Sidx => "Segment Index Box",
            KnownBox::Mfra => "Movie Fragment Random Access Box",
            KnownBox::Mfro => "Movie Fragment Random Access Offset Box",
            KnownBox::Mvhd => "Movie Header Box",
            KnownBox::Trak => "Track Box",
            KnownBox::Mvex => "Movie Extends Box",
            KnownBox::Udta => "User Data Box",
            KnownBox::Tkhd => "Track Header Box",
            KnownBox::Tref => "Track Reference Box",
            KnownBox::Edts => "Edit Box",
            KnownBox::Elst => "Edit List Box",
            KnownBox::Mdia => "Media Box",
            KnownBox::Mdhd => "Media Header Box",
            KnownBox::Hdlr => "Handler Reference Box",
            KnownBox::Minf => "Media Information Box",
            KnownBox::Dinf => "Data Information Box",
            KnownBox::Dref => "Data Reference Box",
            KnownBox::Stbl => "Sample Table Box",
            KnownBox::Stsd => "Sample Description Box",
            KnownBox::Stts => "Decoding Time to Sample Box",
            KnownBox::Ctts => "Composition Time to Sample Box",
            KnownBox::Stsc => "Sample To Chunk Box",
            KnownBox::Stsz => "Sample Size Box",
            KnownBox::Stco => "Chunk Offset Box",
            KnownBox::Co64 => "Chunk Offset Box (64-bit)",
            KnownBox::Stss => "Sync Sample Box",
            KnownBox::Mehd => "Movie Extends Header Box",
            KnownBox::Trex => "Track Extends Box",
            KnownBox::Moof => "Movie Fragment Box",
            KnownBox::Mfhd => "Movie Fragment Header Box",
            KnownBox::Traf => "Track Fragment Box",
            KnownBox::Tfhd => "Track Fragment Header Box",
            KnownBox::Tfdt => "Track Fragment Decode Time Box",
            KnownBox::Trun => "Track Run Box",
            KnownBox::Tfra => "Track Fragment Random Access Box",
            KnownBox::Sinf => "Protection Scheme Information Box",
            KnownBox::Schi => "Scheme Information Box",
            KnownBox::Uuid => "User Extension Box",
            KnownBox::Unknown(_) => "Unknown Box",
        }
    }

    /// Every known type whose content is purely child boxes, used to seed
    /// the default registry.
    ///
    /// `meta`, `stsd` and `dref` carry children after a FullBox prefix and
    /// stay opaque.
    pub fn containers() -> impl Iterator<Item = FourCC> {
        [
            b"moov", b"trak", b"mvex", b"udta", b"tref", b"edts", b"mdia", b"minf", b"dinf",
            b"stbl", b"moof", b"traf", b"mfra", b"sinf", b"schi",
        ]
        .into_iter()
        .map(FourCC::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_classification() {
        let containers: Vec<FourCC> = KnownBox::containers().collect();
        assert!(containers.contains(&MOOV));
        assert!(containers.contains(&TRAF));
        assert!(!containers.contains(&MDAT));
        assert!(!containers.contains(&FourCC(*b"stsd")));
        assert_eq!(KnownBox::from(FourCC(*b"zzzz")).full_name(), "Unknown Box");
    }
}
