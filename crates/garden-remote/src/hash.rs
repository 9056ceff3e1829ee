//! Git object ids and the blob hasher.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::RemoteError;
use crate::store::ObjectKind;

/// Git object id (SHA-1, 40 lowercase hex chars).
///
/// The inner field is private so the string is always either computed by
/// [`ObjectHash::for_object`] or validated through `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectHash(String);

impl ObjectHash {
    /// Hash `body` the way git addresses an object of `kind`:
    /// `sha1("<kind> <len>\0" ++ body)`.
    pub fn for_object(kind: ObjectKind, body: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", kind.as_str(), body.len()).as_bytes());
        hasher.update(body);
        ObjectHash(hex::encode(hasher.finalize()))
    }

    /// Hash raw file content as a git blob.
    pub fn for_blob(content: &[u8]) -> Self {
        Self::for_object(ObjectKind::Blob, content)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form (first 7 hex chars), as git prints it.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

/// Compute the blob hash the remote store would report for `content`.
pub fn blob_hash(content: &[u8]) -> ObjectHash {
    ObjectHash::for_blob(content)
}

impl TryFrom<String> for ObjectHash {
    type Error = RemoteError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 40 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RemoteError::InvalidHash { hash: s });
        }
        Ok(ObjectHash(s.to_ascii_lowercase()))
    }
}

impl std::str::FromStr for ObjectHash {
    type Err = RemoteError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ObjectHash::try_from(s.to_string())
    }
}

impl From<ObjectHash> for String {
    fn from(hash: ObjectHash) -> Self {
        hash.0
    }
}

impl std::fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
