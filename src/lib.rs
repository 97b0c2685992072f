pub mod boxes;
pub mod file;
pub mod known_boxes;
pub mod mdat;
pub mod parser;
pub mod registry;
pub mod sample_table;
pub mod summary;
pub mod track;
pub mod tree;
pub mod util;

pub use boxes::{BoxHeader, BoxKey, FourCC};
pub use file::IsoFile;
pub use mdat::{LayoutError, MaterializeError, MediaDataBox, validate_layout};
pub use parser::{BoxParser, ParseContext, ParseError, Parsed, read_box_header};
pub use registry::{BoxFactory, Registry, default_registry};
pub use sample_table::{FragmentSource, MovieSource, TrackMetadataSource};
pub use summary::{BoxSummary, MediaDataSummary};
pub use track::{Chunk, LayoutBuilder, Sample, Track};
pub use tree::{ContainerBox, IsoBox, RawBox};
pub use util::Region;
