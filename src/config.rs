//! Configuration surface for the session coordinator.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

use crate::cookie::CookieConfig;

/// What happens at completion when request handling detached the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsetPolicy {
    /// Leave the stored record alone; the session is merely absent from the
    /// current request, and the next request with the same cookie finds it
    /// untouched.
    #[default]
    Keep,
    /// Delete the stored record.
    Destroy,
}

/// Pluggable session identifier generator.
///
/// Generated identifiers must be URL-safe and unique in practice.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Default generator: 24 random bytes, URL-safe base64 without padding.
pub fn default_genid() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Coordinator configuration.
///
/// Built with `with_*` methods from [`SessionConfig::new`]. A signing
/// secret is the one thing without a usable default: requests fail until
/// one is configured here or supplied on the request by an earlier layer.
#[derive(Clone)]
pub struct SessionConfig {
    /// Name of the session identifier cookie.
    pub cookie_name: String,
    /// Signing/verification secrets. New cookies are signed with the first
    /// entry. `None` defers to a per-request secret; an explicitly empty
    /// list is rejected when the manager is built.
    pub secrets: Option<Vec<String>>,
    /// Save back to the store even when the record was never modified.
    /// Defaults to false, which also lets an unmodified fetched record skip
    /// the write entirely.
    pub resave: bool,
    /// Re-emit the cookie with a renewed expiration on every response.
    /// Defaults to false.
    pub rolling: bool,
    /// Persist fresh records the handler never modified. Defaults to true.
    pub save_uninitialized: bool,
    /// Policy for sessions detached during handling.
    pub unset: UnsetPolicy,
    /// Secure-transport trust: `Some(true)` trusts the forwarded protocol
    /// header, `Some(false)` trusts only socket TLS, `None` defers to the
    /// transport's own secure signal.
    pub trust_proxy: Option<bool>,
    /// Identifier generator.
    pub genid: IdGenerator,
    /// Cookie attribute defaults.
    pub cookie: CookieConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_owned(),
            secrets: None,
            resave: false,
            rolling: false,
            save_uninitialized: true,
            unset: UnsetPolicy::default(),
            trust_proxy: None,
            genid: Arc::new(default_genid),
            cookie: CookieConfig::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("secrets", &self.secrets.as_ref().map(Vec::len))
            .field("resave", &self.resave)
            .field("rolling", &self.rolling)
            .field("save_uninitialized", &self.save_uninitialized)
            .field("unset", &self.unset)
            .field("trust_proxy", &self.trust_proxy)
            .field("genid", &"<generator>")
            .field("cookie", &self.cookie)
            .finish()
    }
}

impl SessionConfig {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Configure a single signing secret.
    pub fn with_secret(self, secret: impl Into<String>) -> Self {
        self.with_secrets(vec![secret.into()])
    }

    /// Configure an ordered secret list; the first entry signs new cookies.
    pub fn with_secrets(mut self, secrets: Vec<String>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_resave(mut self, resave: bool) -> Self {
        self.resave = resave;
        self
    }

    pub fn with_rolling(mut self, rolling: bool) -> Self {
        self.rolling = rolling;
        self
    }

    pub fn with_save_uninitialized(mut self, save_uninitialized: bool) -> Self {
        self.save_uninitialized = save_uninitialized;
        self
    }

    pub fn with_unset(mut self, unset: UnsetPolicy) -> Self {
        self.unset = unset;
        self
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = Some(trust_proxy);
        self
    }

    /// Replace the identifier generator.
    pub fn with_genid(mut self, genid: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.genid = Arc::new(genid);
        self
    }

    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_genid_is_url_safe_and_distinct() {
        let a = default_genid();
        let b = default_genid();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = SessionConfig::new()
            .with_cookie_name("app.sid")
            .with_secret("keyboard cat")
            .with_rolling(true)
            .with_unset(UnsetPolicy::Destroy)
            .with_genid(|| "fixed".to_owned());

        assert_eq!(config.cookie_name, "app.sid");
        assert_eq!(config.secrets.as_deref(), Some(&["keyboard cat".to_owned()][..]));
        assert!(config.rolling);
        assert!(!config.resave);
        assert!(config.save_uninitialized);
        assert_eq!(config.unset, UnsetPolicy::Destroy);
        assert_eq!((config.genid)(), "fixed");
    }
}
