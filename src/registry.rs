use crate::boxes::{BoxHeader, BoxKey, FourCC};
use crate::known_boxes::{KnownBox, MDAT};
use crate::mdat::MediaDataBox;
use crate::tree::{ContainerBox, IsoBox, RawBox};
use std::collections::HashMap;

/// Constructor for a box implementation.
///
/// A factory builds an empty box from its header; the parser then calls
/// [`IsoBox::parse_content`] on the result.
pub trait BoxFactory: Send + Sync {
    fn create(&self, hdr: &BoxHeader) -> Box<dyn IsoBox>;
}

impl<F> BoxFactory for F
where
    F: Fn(&BoxHeader) -> Box<dyn IsoBox> + Send + Sync,
{
    fn create(&self, hdr: &BoxHeader) -> Box<dyn IsoBox> {
        self(hdr)
    }
}

/// Registry of box constructors keyed by `BoxKey` (4CC or UUID), optionally
/// scoped to the type of the enclosing container.
///
/// The registry is immutable once constructed; use [`Registry::with_box`]
/// to build it fluently.
pub struct Registry {
    map: HashMap<(Option<FourCC>, BoxKey), BoxFactoryEntry>,
}

struct BoxFactoryEntry {
    inner: Box<dyn BoxFactory>,
    name: String,
}

impl Registry {
    /// Create an empty registry. Every type resolves to [`RawBox`].
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Return a new registry with the given constructor added for `key`
    /// wherever it appears.
    ///
    /// `name` is human-readable and used only for debugging / display.
    pub fn with_box(mut self, key: BoxKey, name: &str, factory: Box<dyn BoxFactory>) -> Self {
        self.map.insert(
            (None, key),
            BoxFactoryEntry {
                inner: factory,
                name: name.to_string(),
            },
        );
        self
    }

    /// Like [`Registry::with_box`], but only for boxes directly inside a
    /// container of type `parent`. Scoped entries win over unscoped ones.
    pub fn with_scoped_box(
        mut self,
        parent: FourCC,
        key: BoxKey,
        name: &str,
        factory: Box<dyn BoxFactory>,
    ) -> Self {
        self.map.insert(
            (Some(parent), key),
            BoxFactoryEntry {
                inner: factory,
                name: name.to_string(),
            },
        );
        self
    }

    fn lookup(&self, parent: Option<FourCC>, key: BoxKey) -> Option<&BoxFactoryEntry> {
        parent
            .and_then(|p| self.map.get(&(Some(p), key)))
            .or_else(|| self.map.get(&(None, key)))
    }

    /// Registered display name for `key` inside `parent`, if any.
    pub fn name_of(&self, parent: Option<FourCC>, key: BoxKey) -> Option<&str> {
        self.lookup(parent, key).map(|e| e.name.as_str())
    }

    pub fn contains(&self, parent: Option<FourCC>, key: BoxKey) -> bool {
        self.lookup(parent, key).is_some()
    }

    /// Build the box for `hdr`, falling back to an opaque [`RawBox`] for
    /// unregistered types.
    pub fn create(&self, parent: Option<FourCC>, hdr: &BoxHeader) -> Box<dyn IsoBox> {
        match self.lookup(parent, hdr.key()) {
            Some(entry) => entry.inner.create(hdr),
            None => Box::new(RawBox::new(hdr.clone())),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn container(hdr: &BoxHeader) -> Box<dyn IsoBox> {
    Box::new(ContainerBox::new(hdr.clone()))
}

fn media_data(hdr: &BoxHeader) -> Box<dyn IsoBox> {
    Box::new(MediaDataBox::new(hdr.clone()))
}

/// Registry with every known container type plus `mdat`.
pub fn default_registry() -> Registry {
    let reg = KnownBox::containers().fold(Registry::new(), |reg, cc| {
        reg.with_box(
            BoxKey::FourCC(cc),
            KnownBox::from(cc).full_name(),
            Box::new(container),
        )
    });
    reg.with_box(
        BoxKey::FourCC(MDAT),
        KnownBox::Mdat.full_name(),
        Box::new(media_data),
    )
}
