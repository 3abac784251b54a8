//! Blob identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the braced string form, `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}`.
///
/// Field values that reference a blob may carry trailing data after the
/// identifier; only this many leading characters are considered.
pub const REFERENCE_LEN: usize = 38;

/// Identifier of a blob, shared by the ledger and the object store.
///
/// Displays as the hyphenated lowercase form, which is also the object key.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BlobId(Uuid);

impl BlobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a blob reference as stored in a content field.
    ///
    /// Values longer than [`REFERENCE_LEN`] are truncated before parsing.
    pub fn from_reference(value: &str) -> Option<Self> {
        let end = value
            .char_indices()
            .nth(REFERENCE_LEN)
            .map(|(i, _)| i)
            .unwrap_or(value.len());
        value[..end].parse().ok()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BlobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<BlobId> for Uuid {
    fn from(val: BlobId) -> Self {
        val.0
    }
}

impl FromStr for BlobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
