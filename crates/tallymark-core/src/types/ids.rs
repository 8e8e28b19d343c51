//! Identifier and key types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense integer id assigned to an external entity id string.
///
/// Ids start at 1 and are never reused. They are 32-bit so they can be stored
/// directly in a roaring bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntId(pub u32);

impl IntId {
    /// Raw integer value
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for IntId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named bitmap inside a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitmapKey {
    /// Namespace (tenant) name
    pub namespace: String,
    /// Bitmap name within the namespace
    pub bitmap: String,
}

impl BitmapKey {
    /// Create a new bitmap key
    pub fn new(namespace: impl Into<String>, bitmap: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), bitmap: bitmap.into() }
    }

    /// Key of the bucket holding ids at `count`
    pub fn bucket(&self, count: u64) -> BucketKey {
        BucketKey { bitmap: self.clone(), count }
    }

    /// Key of the event counter for `id`
    pub fn counter(&self, id: IntId) -> CounterKey {
        CounterKey { bitmap: self.clone(), id }
    }
}

impl fmt::Display for BitmapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.bitmap)
    }
}

/// One count bucket of a bitmap
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    /// Owning bitmap
    pub bitmap: BitmapKey,
    /// Event count shared by every member
    pub count: u64,
}

/// Event counter of one entity within one bitmap
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    /// Owning bitmap
    pub bitmap: BitmapKey,
    /// Entity
    pub id: IntId,
}
