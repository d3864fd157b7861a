//! The live session record and its persisted snapshot form.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::cookie::SessionCookie;
use crate::error::SessionError;

/// Reserved snapshot key holding the embedded cookie metadata.
pub(crate) const COOKIE_KEY: &str = "cookie";

/// The persisted snapshot of a session: application content flattened
/// beside the embedded cookie metadata.
///
/// Snapshots round-trip through JSON; a snapshot missing the `cookie`
/// metadata does not deserialize, which surfaces as a decode error on
/// fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Embedded cookie metadata.
    pub cookie: SessionCookie,
    /// Application content.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// A live session record attached to one request.
///
/// Content is an open-ended mapping of application keys to
/// JSON-serializable values. Values that do not serialize are a caller
/// error, as is the reserved `cookie` key. The record's identifier and
/// content feed the coordinator's dirty check; the cookie metadata does
/// not, so expiration refreshes never make a session look modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    /// Cookie metadata owned by this record.
    pub cookie: SessionCookie,
    data: Map<String, Value>,
}

impl Session {
    /// An empty record under `id` with fresh metadata.
    pub(crate) fn new(id: String, cookie: SessionCookie) -> Self {
        Self {
            id,
            cookie,
            data: Map::new(),
        }
    }

    /// Inflate a persisted snapshot back into a live record.
    ///
    /// The snapshot's captured original max-age comes back as stored
    /// rather than being recomputed from the revived expiration.
    pub(crate) fn from_record(id: String, record: Record) -> Self {
        Self {
            id,
            cookie: record.cookie,
            data: record.data,
        }
    }

    /// Snapshot this record for persistence.
    pub fn to_record(&self) -> Record {
        Record {
            cookie: self.cookie.clone(),
            data: self.data.clone(),
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read a typed value from the session content.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Raw JSON view of one content field.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Write a value into the session content.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), SessionError> {
        if key == COOKIE_KEY {
            return Err(SessionError::ReservedKey);
        }
        let value = serde_json::to_value(value)?;
        self.data.insert(key.to_owned(), value);
        Ok(())
    }

    /// Remove one content field, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Drop all content fields. The metadata stays.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Whether the session has no content.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Content keys currently present.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Refresh the cookie expiration back to its original max-age.
    pub fn touch(&mut self) {
        self.cookie.reset_max_age();
    }

    /// Content fingerprint for the dirty check.
    ///
    /// Hashes a stable serialization of the content only. Key order is
    /// canonical because the underlying map is ordered, so equal content
    /// always hashes equally.
    pub(crate) fn content_hash(&self) -> [u8; 32] {
        let bytes = serde_json::to_vec(&self.data).expect("JSON maps serialize to JSON");
        Sha256::digest(&bytes).into()
    }
}
