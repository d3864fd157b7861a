//! Cookie metadata: how the session identifier cookie is rendered and when
//! it expires.
//!
//! [`SessionCookie`] is the live metadata embedded in a session record.
//! Its absolute expiration instant and the relative max-age are two views
//! of one quantity: setting a max-age recomputes the instant, and the
//! max-age accessor derives the remaining duration from it. A `None`
//! expiration means the cookie carries no expiration attribute at all and
//! lives for the browser session.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::SessionError;

/// `SameSite` policy for the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

/// Retention priority hint (the `Priority` cookie attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookiePriority {
    Low,
    Medium,
    High,
}

/// Controls the `Secure` attribute on the session cookie.
///
/// `Auto` defers to the transport's own secure signal at the moment the
/// session is generated: a session created over TLS gets a secure cookie,
/// one created over plaintext does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecureSetting {
    #[default]
    Off,
    On,
    Auto,
}

/// Attribute defaults for session cookies (the `cookie.*` options).
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Cookie path. Defaults to `/`; requests outside this prefix are not
    /// given a session at all.
    pub path: String,
    /// Whether the cookie is hidden from client-side script. Defaults to true.
    pub http_only: bool,
    /// `Secure` attribute behavior.
    pub secure: SecureSetting,
    /// `SameSite` attribute, if any.
    pub same_site: Option<SameSitePolicy>,
    /// `Domain` attribute, if any.
    pub domain: Option<String>,
    /// `Partitioned` attribute.
    pub partitioned: bool,
    /// `Priority` attribute, if any.
    pub priority: Option<CookiePriority>,
    /// Relative lifetime for new sessions. `None` produces cookies without
    /// an expiration attribute.
    pub max_age: Option<Duration>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            path: "/".to_owned(),
            http_only: true,
            secure: SecureSetting::Off,
            same_site: None,
            domain: None,
            partitioned: false,
            priority: None,
            max_age: None,
        }
    }
}

impl CookieConfig {
    /// Defaults: path `/`, http-only, not secure, no expiration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_secure(mut self, secure: SecureSetting) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSitePolicy) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }

    pub fn with_priority(mut self, priority: CookiePriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

/// Live cookie metadata owned by a session record.
///
/// Serialized into the record's persisted snapshot under the reserved
/// `cookie` key, with the expiration as an RFC 3339 string, and rendered
/// into the outgoing `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    #[serde(default, with = "time::serde::rfc3339::option")]
    expires: Option<OffsetDateTime>,
    /// Max-age captured at construction, in milliseconds. Never updated
    /// afterwards; kept for diagnostics and expiration refreshes.
    original_max_age: Option<i64>,
    pub path: String,
    pub http_only: bool,
    pub secure: SecureSetting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSitePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub partitioned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<CookiePriority>,
}

impl SessionCookie {
    /// Build live metadata from configured defaults, capturing the original
    /// max-age.
    pub fn new(config: &CookieConfig) -> Self {
        let mut cookie = Self {
            expires: None,
            original_max_age: config.max_age.map(whole_milliseconds),
            path: config.path.clone(),
            http_only: config.http_only,
            secure: config.secure,
            same_site: config.same_site,
            domain: config.domain.clone(),
            partitioned: config.partitioned,
            priority: config.priority,
        };
        cookie.set_max_age(config.max_age);
        cookie
    }

    /// Absolute expiration instant. `None` means a browser-session cookie.
    pub fn expires(&self) -> Option<OffsetDateTime> {
        self.expires
    }

    /// Set the absolute expiration directly. The derived max-age follows.
    pub fn set_expires(&mut self, expires: Option<OffsetDateTime>) {
        self.expires = expires;
    }

    /// Remaining lifetime, derived from the expiration instant.
    pub fn max_age(&self) -> Option<Duration> {
        self.expires.map(|e| e - OffsetDateTime::now_utc())
    }

    /// Set a relative lifetime; recomputes the absolute expiration.
    pub fn set_max_age(&mut self, max_age: Option<Duration>) {
        self.expires = max_age.map(|d| OffsetDateTime::now_utc() + d);
    }

    /// Max-age captured when this metadata was constructed.
    pub fn original_max_age(&self) -> Option<Duration> {
        self.original_max_age.map(Duration::milliseconds)
    }

    /// Refresh the expiration back to the original max-age.
    pub fn reset_max_age(&mut self) {
        self.set_max_age(self.original_max_age());
    }

    /// Whether the rendered cookie carries the `Secure` attribute.
    pub(crate) fn is_secure(&self) -> bool {
        self.secure == SecureSetting::On
    }

    /// Render a `Set-Cookie` header value for this metadata.
    ///
    /// Delegates attribute serialization to the `cookie` crate, which does
    /// not know the `Priority` attribute; that one is appended here.
    pub fn to_set_cookie(&self, name: &str, value: &str) -> Result<String, SessionError> {
        if let Some(expires) = self.expires {
            // HTTP dates cannot represent years outside 0..=9999.
            let year = expires.year();
            if !(0..=9999).contains(&year) {
                return Err(SessionError::Cookie(format!(
                    "expiration year {year} is not representable in an HTTP date"
                )));
            }
        }

        let mut cookie = cookie::Cookie::new(name.to_owned(), value.to_owned());
        cookie.set_path(self.path.clone());
        cookie.set_http_only(self.http_only);
        if self.is_secure() {
            cookie.set_secure(true);
        }
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        if let Some(same_site) = self.same_site {
            cookie.set_same_site(match same_site {
                SameSitePolicy::Strict => cookie::SameSite::Strict,
                SameSitePolicy::Lax => cookie::SameSite::Lax,
                SameSitePolicy::None => cookie::SameSite::None,
            });
        }
        if self.partitioned {
            cookie.set_partitioned(true);
        }
        if let Some(expires) = self.expires {
            cookie.set_expires(expires);
        }

        let mut header = cookie.encoded().to_string();
        if let Some(priority) = self.priority {
            header.push_str("; Priority=");
            header.push_str(match priority {
                CookiePriority::Low => "Low",
                CookiePriority::Medium => "Medium",
                CookiePriority::High => "High",
            });
        }
        Ok(header)
    }
}

fn whole_milliseconds(duration: Duration) -> i64 {
    duration.whole_milliseconds() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_age_and_expires_are_two_views() {
        let mut cookie = SessionCookie::new(&CookieConfig::new());
        assert_eq!(cookie.expires(), None);
        assert_eq!(cookie.max_age(), None);

        cookie.set_max_age(Some(Duration::hours(1)));
        let expires = cookie.expires().unwrap();
        let delta = expires - OffsetDateTime::now_utc();
        assert!(delta > Duration::minutes(59) && delta <= Duration::hours(1));

        let instant = OffsetDateTime::now_utc() + Duration::minutes(30);
        cookie.set_expires(Some(instant));
        let max_age = cookie.max_age().unwrap();
        assert!(max_age > Duration::minutes(29) && max_age <= Duration::minutes(30));
    }

    #[test]
    fn reset_max_age_refreshes_from_original() {
        let config = CookieConfig::new().with_max_age(Duration::minutes(10));
        let mut cookie = SessionCookie::new(&config);
        assert_eq!(cookie.original_max_age(), Some(Duration::minutes(10)));

        // Simulate time passing by pulling the expiration closer.
        cookie.set_expires(Some(OffsetDateTime::now_utc() + Duration::minutes(1)));
        cookie.reset_max_age();
        assert!(cookie.max_age().unwrap() > Duration::minutes(9));
        // The captured original never moves.
        assert_eq!(cookie.original_max_age(), Some(Duration::minutes(10)));
    }

    #[test]
    fn serde_round_trip_revives_string_expiration() {
        let config = CookieConfig::new()
            .with_max_age(Duration::hours(2))
            .with_same_site(SameSitePolicy::Lax)
            .with_domain("example.com");
        let cookie = SessionCookie::new(&config);

        let json = serde_json::to_string(&cookie).unwrap();
        assert!(json.contains("\"expires\":\""));

        let revived: SessionCookie = serde_json::from_str(&json).unwrap();
        assert_eq!(revived, cookie);
        assert_eq!(revived.original_max_age(), Some(Duration::hours(2)));
    }

    #[test]
    fn renders_standard_attributes() {
        let config = CookieConfig::new()
            .with_max_age(Duration::hours(1))
            .with_same_site(SameSitePolicy::Strict)
            .with_priority(CookiePriority::High);
        let cookie = SessionCookie::new(&config);

        let header = cookie.to_set_cookie("sid", "s:abc.def").unwrap();
        assert!(header.starts_with("sid=s%3Aabc.def"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Strict"));
        assert!(header.contains("Expires="));
        assert!(header.ends_with("Priority=High"));
        assert!(!header.contains("Secure"));
    }

    #[test]
    fn unrepresentable_expiration_is_an_error() {
        let mut cookie = SessionCookie::new(&CookieConfig::new());
        cookie.set_expires(Some(
            OffsetDateTime::now_utc() + Duration::days(366 * 9000),
        ));
        assert!(matches!(
            cookie.to_set_cookie("sid", "v"),
            Err(SessionError::Cookie(_))
        ));
    }

    #[test]
    fn session_lifetime_cookie_has_no_expiration_attribute() {
        let cookie = SessionCookie::new(&CookieConfig::new());
        let header = cookie.to_set_cookie("sid", "v").unwrap();
        assert!(!header.contains("Expires="));
        assert!(!header.contains("Max-Age="));
    }
}
