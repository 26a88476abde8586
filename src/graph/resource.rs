//! Resource and subresource naming.
//!
//! Resources are referenced by name while a graph is being declared. The builder
//! interns each name into a dense [`ResourceId`], and every individually trackable
//! slice of a resource (a mip level, an array slice) is addressed by a
//! [`SubresourceName`] that packs both into one comparable 64-bit key.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// Dense identifier of a resource within a single graph build.
///
/// Ids are handed out in first-reference order and are only meaningful for the
/// builder (and the compiled graph) that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    /// Create a resource id from a raw index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A (resource, subresource index) pair encoded into one 64-bit key.
///
/// The high 32 bits hold the resource identity and the low 32 bits the
/// subresource index. The ordering exists only so names can be used as map and
/// set keys; it carries no meaning beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubresourceName(u64);

impl SubresourceName {
    const INDEX_BITS: u32 = 32;
    const INDEX_MASK: u64 = (1 << Self::INDEX_BITS) - 1;

    /// Encode a resource and one of its subresource indices.
    pub fn new(resource: ResourceId, subresource: u32) -> Self {
        Self((u64::from(resource.0) << Self::INDEX_BITS) | u64::from(subresource))
    }

    /// The resource this subresource belongs to.
    pub fn resource(self) -> ResourceId {
        ResourceId((self.0 >> Self::INDEX_BITS) as u32)
    }

    /// The subresource index within its resource.
    pub fn subresource(self) -> u32 {
        (self.0 & Self::INDEX_MASK) as u32
    }

    /// The raw packed key.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubresourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.resource(), self.subresource())
    }
}

/// Which subresources of a resource a dependency refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subresources {
    /// A single subresource index.
    Index(u32),
    /// A contiguous, half-open range of indices.
    Range(Range<u32>),
    /// An explicit list of indices.
    List(Vec<u32>),
}

impl Subresources {
    /// The whole resource when it has exactly one subresource (buffers, single-mip textures).
    pub fn whole() -> Self {
        Self::Index(0)
    }

    /// Iterate over the referenced subresource indices.
    pub fn indices(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            Self::Index(index) => Box::new(std::iter::once(*index)),
            Self::Range(range) => Box::new(range.clone()),
            Self::List(list) => Box::new(list.iter().copied()),
        }
    }

    /// Check whether no subresource is referenced.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Index(_) => false,
            Self::Range(range) => range.is_empty(),
            Self::List(list) => list.is_empty(),
        }
    }
}

impl Default for Subresources {
    fn default() -> Self {
        Self::whole()
    }
}

impl From<u32> for Subresources {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl From<Range<u32>> for Subresources {
    fn from(range: Range<u32>) -> Self {
        Self::Range(range)
    }
}

impl From<Vec<u32>> for Subresources {
    fn from(list: Vec<u32>) -> Self {
        Self::List(list)
    }
}

impl From<&[u32]> for Subresources {
    fn from(list: &[u32]) -> Self {
        Self::List(list.to_vec())
    }
}

/// Name interning table for the resources referenced in one build.
#[derive(Debug, Default, Clone)]
pub(crate) struct ResourceRegistry {
    names: Vec<String>,
    ids: HashMap<String, ResourceId>,
}

impl ResourceRegistry {
    /// Get the id for `name`, registering it on first reference.
    pub(crate) fn intern(&mut self, name: &str) -> ResourceId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = ResourceId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<ResourceId> {
        self.ids.get(name).copied()
    }

    pub(crate) fn name(&self, id: ResourceId) -> &str {
        self.names.get(id.index()).map(String::as_str).unwrap_or("<unknown>")
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn clear(&mut self) {
        self.names.clear();
        self.ids.clear();
    }
}
