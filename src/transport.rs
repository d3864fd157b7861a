//! Collaborator boundary with the HTTP transport: the request view the
//! coordinator reads, and the response-side gate that defers completion
//! until the session's store write has been acknowledged.
//!
//! The surrounding framework owns header parsing and the response stream.
//! It hands the coordinator a [`SessionRequest`] and wraps its response in
//! a [`ResponseGate`]; everything else stays on the framework's side of
//! the boundary.

use std::collections::HashMap;

use crate::manager::{PersistOutcome, SessionContext};

/// The transport's view of an inbound request.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Raw `Cookie` header, if present.
    pub cookie_header: Option<String>,
    /// Deprecated fallback: cookies pre-parsed by an external signing-aware
    /// stage. Values are still codec-verified before use.
    pub signed_cookies: HashMap<String, String>,
    /// Deprecated fallback: cookies pre-parsed without verification.
    pub unsigned_cookies: HashMap<String, String>,
    /// Request path.
    pub path: String,
    /// Whether the socket itself is TLS.
    pub encrypted: bool,
    /// The transport's own computed secure signal.
    pub secure: bool,
    /// Forwarded protocol header value, when the transport exposes one.
    pub forwarded_proto: Option<String>,
    /// Per-request signing secret supplied by an earlier layer; consulted
    /// only when the coordinator itself has none configured.
    pub secret_override: Option<String>,
    /// Set when an earlier layer already attached a session.
    pub has_session: bool,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self {
            cookie_header: None,
            signed_cookies: HashMap::new(),
            unsigned_cookies: HashMap::new(),
            path: "/".to_owned(),
            encrypted: false,
            secure: false,
            forwarded_proto: None,
            secret_override: None,
            has_session: false,
        }
    }
}

impl SessionRequest {
    /// A plain request for `/` with no cookies.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_cookie_header(mut self, header: impl Into<String>) -> Self {
        self.cookie_header = Some(header.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Response primitives the surrounding transport layer installs.
pub trait ResponseTransport: Send {
    /// Append a header to the not-yet-finalized response.
    fn append_header(&mut self, name: &str, value: &str);
    /// Emit body bytes.
    fn write(&mut self, chunk: &[u8]);
    /// Finish the underlying response stream.
    fn complete(&mut self);
}

/// Result of driving the completion gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// First completion: the persistence decision ran and the response
    /// finished.
    Completed(PersistOutcome),
    /// Completion had already begun; this call did nothing.
    AlreadyFinished,
}

/// Per-request decorator that owns the response stream and gates its
/// completion on session persistence.
///
/// Headers are finalized exactly once, at the first body write or at
/// completion, whichever comes first; the session cookie decision runs at
/// that moment. [`finish`](Self::finish) holds the final bytes back until
/// the store has acknowledged whatever write the session decision
/// required, then re-emits them unchanged and completes the stream. It is
/// idempotent: only the first call touches the store or the transport.
#[derive(Debug)]
pub struct ResponseGate<T: ResponseTransport> {
    transport: T,
    headers_sent: bool,
    finished: bool,
}

impl<T: ResponseTransport> ResponseGate<T> {
    /// Wrap a transport for one request.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            headers_sent: false,
            finished: false,
        }
    }

    /// Stream body bytes, finalizing headers first if still pending.
    pub fn write(&mut self, ctx: &mut SessionContext, chunk: &[u8]) {
        self.finalize_headers(ctx);
        self.transport.write(chunk);
    }

    /// Finalize headers without emitting any body bytes yet.
    pub fn flush_headers(&mut self, ctx: &mut SessionContext) {
        self.finalize_headers(ctx);
    }

    fn finalize_headers(&mut self, ctx: &mut SessionContext) {
        if self.headers_sent {
            return;
        }
        self.headers_sent = true;
        if let Some(value) = ctx.set_cookie_header() {
            self.transport.append_header("Set-Cookie", &value);
        }
    }

    /// Complete the response, running the persistence decision first.
    ///
    /// The first call wins; later calls return
    /// [`FinishOutcome::AlreadyFinished`] without a second store write.
    /// Store failures during the decision land on the context's error sink
    /// and never block completion.
    pub async fn finish(
        &mut self,
        ctx: &mut SessionContext,
        final_chunk: Option<&[u8]>,
    ) -> FinishOutcome {
        if self.finished {
            return FinishOutcome::AlreadyFinished;
        }
        self.finished = true;

        let outcome = ctx.persist().await;
        self.finalize_headers(ctx);
        if let Some(chunk) = final_chunk {
            self.transport.write(chunk);
        }
        self.transport.complete();
        FinishOutcome::Completed(outcome)
    }

    /// Consume the gate, returning the underlying transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}
