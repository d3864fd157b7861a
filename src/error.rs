//! Error types for session stores and the lifecycle coordinator.

/// Error type returned by session store back-ends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists under the requested identifier.
    ///
    /// On fetch, the coordinator treats this the same as a successful
    /// lookup that found nothing: a fresh session is generated.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The backing store itself failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// Serializing a record for storage failed.
    #[error("failed to encode session record: {0}")]
    Encode(String),

    /// Deserializing a stored record failed.
    #[error("failed to decode session record: {0}")]
    Decode(String),
}

/// A result whose error type is [`StoreError`].
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error type for coordinator and configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No signing secret was configured and none was supplied on the request.
    #[error("secret required for signed session cookies")]
    MissingSecret,

    /// An explicitly configured secret list was empty.
    #[error("at least one signing secret is required")]
    EmptySecrets,

    /// An operation that needs a live session found none attached.
    #[error("no session is attached to this request")]
    NoSession,

    /// `"cookie"` is reserved for the embedded cookie metadata.
    #[error("\"cookie\" is a reserved session key")]
    ReservedKey,

    /// Session content could not be serialized to JSON.
    #[error("session content is not JSON-serializable: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The session cookie could not be rendered into a header value.
    #[error("failed to serialize session cookie: {0}")]
    Cookie(String),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
