//! Block model: the unit of structure in a Tessera document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single content block.
///
/// `text` is the block's plain text; `attrs` holds per-block attributes
/// (alignment, level, …) as JSON-encoded strings so that arbitrary
/// structured values survive the wire without a schema per block kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    /// Block kind, e.g. "paragraph", "heading", "list-item".
    pub kind: String,
    pub text: String,
    pub attrs: BTreeMap<String, String>,
}

impl Block {
    /// Create a block of the given kind with fresh identity.
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            text: text.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Shorthand for the most common block kind.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new("paragraph", text)
    }

    /// Set an attribute, returning `self` for chaining.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}
