//! Natural keys.

use std::fmt;

use crate::category::EntityKind;

/// Instance-independent identity of an object: its kind plus its stable key.
///
/// Numeric ids are scoped to one instance and are never used to match objects
/// across instances; this key is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey {
    /// Object kind.
    pub kind: EntityKind,
    /// Stable key within the kind.
    pub key: String,
}

impl NaturalKey {
    /// Create a new natural key.
    pub fn new(kind: EntityKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.key)
    }
}
