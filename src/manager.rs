//! The lifecycle coordinator: resolves an inbound request to a session,
//! tracks modification during handling, and decides at completion whether
//! to persist, touch, destroy, or ignore the record.
//!
//! [`SessionManager`] is shared by every request; [`SessionContext`] is the
//! per-request state machine it opens. The context carries the identifier
//! the client presented, the content hashes that drive the dirty check,
//! and a touch-once guard shared between cookie emission and completion,
//! so the emitted cookie always reflects the freshest expiration and the
//! store sees at most one write per response.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::config::{SessionConfig, UnsetPolicy};
use crate::cookie::{SecureSetting, SessionCookie};
use crate::error::{SessionError, StoreError};
use crate::session::{Record, Session};
use crate::signature::SigningKeys;
use crate::store::{ConnectivityState, SessionStore};
use crate::transport::SessionRequest;

/// What the completion gate did with the store for one response.
///
/// When the chosen operation failed, the outcome still names it; the store
/// error itself lands on the context's error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The record was written wholesale.
    Saved,
    /// Only the stored expiration metadata was refreshed.
    Touched,
    /// The record was deleted.
    Destroyed,
    /// The store was left untouched.
    Skipped,
}

/// The session coordinator shared by every request.
pub struct SessionManager {
    config: Arc<SessionConfig>,
    store: Arc<dyn SessionStore>,
    connectivity: ConnectivityState,
}

impl SessionManager {
    /// Build a coordinator over `store`.
    ///
    /// An explicitly configured empty secret list is rejected here rather
    /// than at first request.
    pub fn new<S: SessionStore>(store: S, config: SessionConfig) -> Result<Self, SessionError> {
        if matches!(&config.secrets, Some(secrets) if secrets.is_empty()) {
            return Err(SessionError::EmptySecrets);
        }
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            connectivity: ConnectivityState::new(),
        })
    }

    /// Handle to the shared store-reachability flag.
    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity.clone()
    }

    /// The shared store.
    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    /// Resolve `req` to a session and open its per-request lifecycle
    /// context.
    ///
    /// Returns `Ok(None)` when no session should be attached at all: an
    /// earlier layer already attached one, the store is marked
    /// unreachable, or the request path falls outside the cookie path
    /// prefix. A presented identifier that fails verification is treated
    /// as absent and never used as a lookup key; a lookup that finds
    /// nothing falls through to generating a fresh session. Store failures
    /// other than not-found abort the request.
    pub async fn begin(&self, req: &SessionRequest) -> Result<Option<SessionContext>, SessionError> {
        if req.has_session {
            trace!("request already carries a session, skipping");
            return Ok(None);
        }
        if !self.connectivity.is_reachable() {
            debug!("session store unreachable, proceeding without a session");
            return Ok(None);
        }
        if !req.path.starts_with(self.config.cookie.path.as_str()) {
            trace!(path = %req.path, "request outside cookie path, skipping");
            return Ok(None);
        }

        let keys = self.signing_keys(req)?;
        let secure = resolve_secure(req, self.config.trust_proxy);
        let presented_id = self.resolve_identifier(req, &keys);

        let mut ctx = SessionContext {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            keys,
            secure,
            presented_id: presented_id.clone(),
            session_id: None,
            original_id: None,
            original_hash: None,
            saved_hash: None,
            touched: false,
            session: None,
            errors: Vec::new(),
        };

        match presented_id {
            None => ctx.generate(),
            Some(id) => match self.store.load(&id).await {
                Ok(Some(record)) => ctx.inflate(id, record),
                Ok(None) => {
                    debug!(id = %id, "no stored session for presented identifier, generating");
                    ctx.generate();
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(id = %id, "store reported not-found, generating");
                    ctx.generate();
                }
                Err(err) => return Err(err.into()),
            },
        }

        Ok(Some(ctx))
    }

    fn signing_keys(&self, req: &SessionRequest) -> Result<SigningKeys, SessionError> {
        if let Some(secrets) = &self.config.secrets {
            return SigningKeys::new(secrets.clone());
        }
        if let Some(secret) = &req.secret_override {
            return SigningKeys::new(vec![secret.clone()]);
        }
        Err(SessionError::MissingSecret)
    }

    /// Extract and verify the presented identifier, if any.
    ///
    /// The `Cookie` header wins; the pre-parsed maps are consulted only
    /// when it yields nothing. Verification failure collapses to "no
    /// identifier presented" in every source.
    fn resolve_identifier(&self, req: &SessionRequest, keys: &SigningKeys) -> Option<String> {
        let name = self.config.cookie_name.as_str();
        let mut resolved = None;

        if let Some(header) = &req.cookie_header {
            if let Some(raw) = find_cookie(header, name) {
                resolved = keys.unsign(&raw);
                if resolved.is_none() {
                    debug!("presented session cookie failed verification");
                }
            }
        }
        if resolved.is_none() {
            if let Some(raw) = req.signed_cookies.get(name) {
                warn!("resolving the session from a pre-parsed signed cookie map is deprecated");
                resolved = keys.unsign(raw);
            }
        }
        if resolved.is_none() {
            if let Some(raw) = req.unsigned_cookies.get(name) {
                warn!("resolving the session from a pre-parsed unsigned cookie map is deprecated");
                resolved = keys.unsign(raw);
            }
        }
        resolved
    }
}

fn find_cookie(header: &str, name: &str) -> Option<String> {
    cookie::Cookie::split_parse_encoded(header.to_owned())
        .flatten()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_owned())
}

/// Final secure-transport decision.
///
/// Socket TLS always counts. Beyond that, `Some(true)` trusts the
/// forwarded protocol header, `Some(false)` trusts nothing further, and
/// `None` defers to the transport's own computed signal.
fn resolve_secure(req: &SessionRequest, trust_proxy: Option<bool>) -> bool {
    if req.encrypted {
        return true;
    }
    match trust_proxy {
        Some(false) => false,
        Some(true) => req
            .forwarded_proto
            .as_deref()
            .and_then(|header| header.split(',').next())
            .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
            .unwrap_or(false),
        None => req.secure,
    }
}

/// Per-request lifecycle state.
///
/// Holds the record attached to the request plus the bookkeeping the
/// completion decision needs: the identifier the client presented, the
/// content hash captured at load time, the hash captured at the most
/// recent save, and the touch-once guard. Handlers reach the record
/// through [`session_mut`](Self::session_mut) and the explicit operations
/// below; the completion gate drives [`persist`] and cookie emission.
///
/// [`persist`]: crate::ResponseGate::finish
pub struct SessionContext {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
    keys: SigningKeys,
    secure: bool,
    /// Verified identifier the client presented, if any.
    presented_id: Option<String>,
    /// Identifier currently associated with the request; survives
    /// detachment of the record itself.
    session_id: Option<String>,
    original_id: Option<String>,
    original_hash: Option<[u8; 32]>,
    saved_hash: Option<[u8; 32]>,
    touched: bool,
    session: Option<Session>,
    errors: Vec<SessionError>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("secure", &self.secure)
            .field("presented_id", &self.presented_id)
            .field("session_id", &self.session_id)
            .field("original_id", &self.original_id)
            .field("original_hash", &self.original_hash)
            .field("saved_hash", &self.saved_hash)
            .field("touched", &self.touched)
            .field("session", &self.session)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// The attached session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Mutable access to the attached session.
    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Identifier currently associated with the request.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Errors reported asynchronously during emission or completion.
    pub fn take_errors(&mut self) -> Vec<SessionError> {
        std::mem::take(&mut self.errors)
    }

    /// Detach the session from this request.
    ///
    /// What happens to the stored record is decided at completion by the
    /// configured [`UnsetPolicy`]: `Keep` leaves it for the next request,
    /// `Destroy` deletes it.
    pub fn unset(&mut self) {
        self.session = None;
    }

    /// Persist the attached record now, marking it saved.
    pub async fn save(&mut self) -> Result<(), SessionError> {
        let (id, record, hash) = {
            let session = self.session.as_ref().ok_or(SessionError::NoSession)?;
            (
                session.id().to_owned(),
                session.to_record(),
                session.content_hash(),
            )
        };
        // The hash is captured before delegating; the completion decision
        // keys off it.
        self.saved_hash = Some(hash);
        self.store.save(&id, &record).await?;
        Ok(())
    }

    /// Refetch the record from the store and attach the replacement.
    ///
    /// A record that has meanwhile disappeared is an error; the dirty-check
    /// baseline is left as captured at original load time.
    pub async fn reload(&mut self) -> Result<(), SessionError> {
        let id = self.session_id.clone().ok_or(SessionError::NoSession)?;
        match self.store.load(&id).await {
            Ok(Some(record)) => {
                self.session = Some(Session::from_record(id, record));
                Ok(())
            }
            Ok(None) => Err(StoreError::NotFound(id).into()),
            Err(err) => Err(err.into()),
        }
    }

    /// Destroy the attached record: detach it and delete it from the store.
    pub async fn destroy(&mut self) -> Result<(), SessionError> {
        self.session = None;
        if let Some(id) = self.session_id.clone() {
            self.store.delete(&id).await?;
        }
        Ok(())
    }

    /// Replace the attached record with a fresh one under a new
    /// identifier, deleting the old identifier's entry.
    ///
    /// The dirty-check baseline still points at the old identifier, so the
    /// regenerated record counts as modified and persists at completion.
    pub async fn regenerate(&mut self) -> Result<(), SessionError> {
        if let Some(id) = self.session_id.clone() {
            self.store.delete(&id).await?;
        }
        self.attach_fresh();
        Ok(())
    }

    /// Initial attachment of a fresh record; resets the dirty-check
    /// baseline.
    pub(crate) fn generate(&mut self) {
        self.attach_fresh();
        self.original_id = self.session_id.clone();
        self.original_hash = self.session.as_ref().map(Session::content_hash);
        self.saved_hash = None;
    }

    fn attach_fresh(&mut self) {
        let id = (self.config.genid)();
        let mut cookie = SessionCookie::new(&self.config.cookie);
        if self.config.cookie.secure == SecureSetting::Auto {
            cookie.secure = if self.secure {
                SecureSetting::On
            } else {
                SecureSetting::Off
            };
        }
        debug!(id = %id, "generated fresh session");
        self.session_id = Some(id.clone());
        self.session = Some(Session::new(id, cookie));
    }

    /// Attach a fetched record, seeding the dirty-check baseline.
    ///
    /// With resave disabled the saved hash is seeded too, so an unmodified
    /// record is never rewritten.
    pub(crate) fn inflate(&mut self, id: String, record: Record) {
        let session = Session::from_record(id.clone(), record);
        let hash = session.content_hash();
        trace!(id = %id, "inflated stored session");
        self.session_id = Some(id.clone());
        self.original_id = Some(id);
        self.original_hash = Some(hash);
        self.saved_hash = (!self.config.resave).then_some(hash);
        self.session = Some(session);
    }

    /// Modified: the identifier moved, or the content no longer hashes to
    /// what was loaded.
    fn is_modified(&self, session: &Session) -> bool {
        self.original_id.as_deref() != Some(session.id())
            || self.original_hash != Some(session.content_hash())
    }

    /// Already saved: identifier unchanged and content hashes to the last
    /// successful save.
    fn is_saved(&self, session: &Session) -> bool {
        self.original_id.as_deref() == Some(session.id())
            && self.saved_hash == Some(session.content_hash())
    }

    fn should_save(&self, session: &Session) -> bool {
        if !self.config.save_uninitialized && self.presented_id.as_deref() != Some(session.id()) {
            self.is_modified(session)
        } else {
            !self.is_saved(session)
        }
    }

    fn should_touch(&self, session: &Session) -> bool {
        self.presented_id.as_deref() == Some(session.id()) && !self.should_save(session)
    }

    fn touch_once(&mut self) {
        if !self.touched {
            self.touched = true;
            if let Some(session) = self.session.as_mut() {
                session.touch();
            }
        }
    }

    fn report(&mut self, err: SessionError) {
        error!(error = %err, "asynchronous session error");
        self.errors.push(err);
    }

    /// Decide and render the `Set-Cookie` header for this response, if one
    /// is due.
    ///
    /// Refreshes the cookie expiration first (at most once per request,
    /// shared with completion) so the emitted cookie always carries the
    /// freshest expiration. A secure cookie on an insecure transport is
    /// suppressed. Rendering failures land on the error sink and suppress
    /// the header rather than aborting the response.
    pub(crate) fn set_cookie_header(&mut self) -> Option<String> {
        let session = self.session.as_ref()?;
        if session.id().is_empty() {
            return None;
        }

        let due = if self.presented_id.as_deref() != Some(session.id()) {
            self.config.save_uninitialized || self.is_modified(session)
        } else {
            self.config.rolling
                || (session.cookie.expires().is_some() && self.is_modified(session))
        };
        if !due {
            trace!("no session cookie due on this response");
            return None;
        }
        if session.cookie.is_secure() && !self.secure {
            debug!("suppressing secure session cookie on insecure transport");
            return None;
        }

        self.touch_once();

        let session = self.session.as_ref()?;
        let value = self.keys.sign(session.id());
        match session
            .cookie
            .to_set_cookie(&self.config.cookie_name, &value)
        {
            Ok(header) => Some(header),
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    /// Execute the completion decision: destroy, save, touch, or skip.
    ///
    /// Store failures here are reported on the error sink; completion is
    /// never blocked on them.
    pub(crate) async fn persist(&mut self) -> PersistOutcome {
        if self.session.is_none() {
            if let (Some(id), UnsetPolicy::Destroy) = (self.session_id.clone(), self.config.unset)
            {
                debug!(id = %id, "destroying detached session");
                if let Err(err) = self.store.delete(&id).await {
                    self.report(err.into());
                }
                return PersistOutcome::Destroyed;
            }
            // Nothing attached and nothing to destroy: complete unmodified.
            return PersistOutcome::Skipped;
        }

        self.touch_once();

        let Some(session) = self.session.as_ref() else {
            return PersistOutcome::Skipped;
        };
        if session.id().is_empty() {
            // A corrupted identifier gets neither save nor touch.
            debug!("session identifier is not well-formed, leaving the store untouched");
            return PersistOutcome::Skipped;
        }

        if self.should_save(session) {
            debug!(id = %session.id(), "saving session at completion");
            if let Err(err) = self.save().await {
                self.report(err);
            }
            return PersistOutcome::Saved;
        }

        if self.store.implements_touch() && self.should_touch(session) {
            let id = session.id().to_owned();
            let record = session.to_record();
            trace!(id = %id, "touching session at completion");
            if let Err(err) = self.store.touch(&id, &record).await {
                self.report(err.into());
            }
            return PersistOutcome::Touched;
        }

        trace!("session unchanged, skipping store");
        PersistOutcome::Skipped
    }
}
