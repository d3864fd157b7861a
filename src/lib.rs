//! # cookie-sessions
//!
//! Signed-cookie session middleware with pluggable stores.
//!
//! This crate attaches a server-side session (an open-ended bag of
//! JSON-serializable state) to each request, identified to the client by a
//! tamper-evident cookie and backed by a pluggable [`SessionStore`]. The
//! centerpiece is the lifecycle coordinator: per request it resolves the
//! presented identifier, loads or generates a [`Session`], tracks whether
//! handler code modified it, and, when the response completes, decides
//! whether to save, touch, destroy, or skip the stored record. The
//! [`ResponseGate`] guarantees that decision is acknowledged by the store
//! before the response stream is allowed to finish.
//!
//! ## Features
//!
//! - HMAC-SHA256 signed session cookies with secret rotation
//! - Content-hash dirty checking, so unmodified sessions skip the store
//! - Rolling expiration refresh and refresh-only `touch` writes
//! - A map-backed [`MemoryStore`] reference implementation with lazy
//!   expiration
//! - Transport-agnostic boundaries: any framework that can hand over its
//!   cookie header and wrap its response stream can host the coordinator
//!
//! ## Quick Start
//!
//! ```no_run
//! use cookie_sessions::{
//!     MemoryStore, ResponseGate, ResponseTransport, SessionConfig, SessionManager,
//!     SessionRequest,
//! };
//!
//! struct Sink;
//!
//! impl ResponseTransport for Sink {
//!     fn append_header(&mut self, _name: &str, _value: &str) {}
//!     fn write(&mut self, _chunk: &[u8]) {}
//!     fn complete(&mut self) {}
//! }
//!
//! # async fn example() -> Result<(), cookie_sessions::SessionError> {
//! let config = SessionConfig::new().with_secret("keyboard cat");
//! let manager = SessionManager::new(MemoryStore::new(), config)?;
//!
//! // Per request: resolve the session, let the handler mutate it, then
//! // finish through the gate so persistence completes first.
//! let req = SessionRequest::new();
//! if let Some(mut ctx) = manager.begin(&req).await? {
//!     if let Some(session) = ctx.session_mut() {
//!         let views: u32 = session.get("views").unwrap_or(0);
//!         session.insert("views", views + 1)?;
//!     }
//!
//!     let mut gate = ResponseGate::new(Sink);
//!     gate.finish(&mut ctx, Some(b"hello".as_slice())).await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Stores
//!
//! A back-end implements [`SessionStore`]: `load`/`save`/`delete`, the
//! optional refresh-only `touch`, and enumeration. The bundled
//! [`MemoryStore`] is the reference implementation; persistent back-ends
//! plug in the same way. Store reachability is signalled through
//! [`ConnectivityState`]: while a store is marked unreachable, requests
//! simply proceed without a session.
//!
//! ## Concurrency
//!
//! One store instance is shared by all requests. Concurrent requests that
//! carry the same identifier may each load, mutate, and save the record;
//! the last writer wins. The coordinator provides no cross-request locking
//! and no optimistic-concurrency check, it only sequences the operations
//! it issues for one identifier within one request.

mod config;
mod cookie;
mod error;
mod manager;
mod memory_store;
mod session;
mod signature;
mod store;
mod transport;

pub use config::{default_genid, IdGenerator, SessionConfig, UnsetPolicy};
pub use cookie::{CookieConfig, CookiePriority, SameSitePolicy, SecureSetting, SessionCookie};
pub use error::{SessionError, StoreError, StoreResult};
pub use manager::{PersistOutcome, SessionContext, SessionManager};
pub use memory_store::MemoryStore;
pub use session::{Record, Session};
pub use signature::SigningKeys;
pub use store::{ConnectivityState, SessionStore};
pub use transport::{FinishOutcome, ResponseGate, ResponseTransport, SessionRequest};
