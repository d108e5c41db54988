//! Core identifier types for Lodestream
//!
//! This module defines the foundational addressing types:
//! - ObjectIdentifier: entity address (object name + object id)
//! - StreamId: one append-only event stream
//! - VersionToken: sortable address of one event position
//! - ContinuationToken: opaque cursor for paginated discovery

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Separator used in the external string form of a [`VersionToken`]
const TOKEN_SEPARATOR: &str = "__";

/// Width of the zero-padded version component in token strings
const VERSION_DIGITS: usize = 20;

/// Identifier for one append-only event stream.
///
/// An entity may own a chain of streams across migrations; each link in the
/// chain has its own StreamId.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Create a stream id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh stream id for an entity.
    ///
    /// Ids are of the form `{object_name}-{object_id}-{uuid}` so a chain of
    /// streams for one entity remains recognizable in storage listings.
    pub fn generate(object: &ObjectIdentifier) -> Self {
        Self(format!(
            "{}-{}-{}",
            object.object_name,
            object.object_id,
            Uuid::new_v4().simple()
        ))
    }

    /// View the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for an entity: object name (the type) plus object id
/// (the instance).
///
/// Format: "object_name/object_id"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIdentifier {
    /// Object type name (e.g. "order")
    pub object_name: String,
    /// Instance identifier within the type
    pub object_id: String,
}

impl ObjectIdentifier {
    /// Create a new object identifier
    pub fn new(object_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_name, self.object_id)
    }
}

/// Immutable address of one event position: (object name, object id,
/// stream id, version).
///
/// Serializes to a lexicographically sortable string used as a cross-boundary
/// identifier (checkpoints, correlation ids, precondition headers):
///
/// ```text
/// {objectName}__{objectId}__{streamIdentifier}__{20-digit-zero-padded-version}
/// ```
///
/// Zero-padding makes string order match version order within a stream; the
/// derived `Ord` matches the string form. Components must not contain the
/// `__` separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionToken {
    /// Object type name
    pub object_name: String,
    /// Instance identifier
    pub object_id: String,
    /// Stream holding the event
    pub stream_id: StreamId,
    /// Zero-based event version, monotonically increasing
    pub version: u64,
}

impl VersionToken {
    /// Create a token, rejecting components that contain the separator.
    ///
    /// # Errors
    ///
    /// Returns `MalformedToken` if any string component contains `__`,
    /// which would make the external form ambiguous.
    pub fn new(
        object_name: impl Into<String>,
        object_id: impl Into<String>,
        stream_id: StreamId,
        version: u64,
    ) -> Result<Self> {
        let object_name = object_name.into();
        let object_id = object_id.into();
        for component in [object_name.as_str(), object_id.as_str(), stream_id.as_str()] {
            if component.contains(TOKEN_SEPARATOR) {
                return Err(Error::MalformedToken(format!(
                    "component {component:?} contains reserved separator {TOKEN_SEPARATOR:?}"
                )));
            }
        }
        Ok(Self {
            object_name,
            object_id,
            stream_id,
            version,
        })
    }

    /// Token for an event position within an entity's stream
    pub fn for_object(object: &ObjectIdentifier, stream_id: &StreamId, version: u64) -> Result<Self> {
        Self::new(
            object.object_name.clone(),
            object.object_id.clone(),
            stream_id.clone(),
            version,
        )
    }

    /// Parse a token from its external string form.
    ///
    /// # Errors
    ///
    /// Returns `MalformedToken` if the string does not have exactly four
    /// `__`-separated components or the version is not a decimal number.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(TOKEN_SEPARATOR).collect();
        if parts.len() != 4 {
            return Err(Error::MalformedToken(format!(
                "expected 4 components, found {}",
                parts.len()
            )));
        }
        let version: u64 = parts[3]
            .parse()
            .map_err(|_| Error::MalformedToken(format!("bad version component {:?}", parts[3])))?;
        Self::new(parts[0], parts[1], StreamId::new(parts[2]), version)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{:0width$}",
            self.object_name,
            self.object_id,
            self.stream_id,
            self.version,
            sep = TOKEN_SEPARATOR,
            width = VERSION_DIGITS,
        )
    }
}

/// Opaque cursor for resuming a paginated document listing.
///
/// Produced by one page, consumed by the next; callers never inspect the
/// contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Wrap a raw cursor value
    pub fn new(cursor: impl Into<String>) -> Self {
        Self(cursor.into())
    }

    /// View the raw cursor value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
