//! Tamper-evident encoding of session identifiers into cookie values.
//!
//! A signed value is `s:<identifier>.<tag>` where the tag is a base64
//! HMAC-SHA256 over the identifier. Values without the `s:` prefix are
//! unsigned and are never used as lookup keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SessionError;

type HmacSha256 = Hmac<Sha256>;

/// Prefix marking a signed cookie value.
const SIGNED_PREFIX: &str = "s:";

/// An ordered set of signing secrets.
///
/// New cookies are always signed with the first secret; verification tries
/// every secret in order. That is what makes rotation work: keep a retired
/// secret anywhere in the list while clients still hold cookies signed with
/// it, and drop it once they have cycled out.
#[derive(Clone)]
pub struct SigningKeys {
    secrets: Vec<String>,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl SigningKeys {
    /// Build a key set from an ordered list of secrets.
    ///
    /// An empty list is a configuration error, rejected here rather than at
    /// first use.
    pub fn new(secrets: Vec<String>) -> Result<Self, SessionError> {
        if secrets.is_empty() {
            return Err(SessionError::EmptySecrets);
        }
        Ok(Self { secrets })
    }

    /// Sign `id` into a cookie value: `s:<id>.<tag>`.
    pub fn sign(&self, id: &str) -> String {
        let tag = mac_tag(id, &self.secrets[0]);
        format!("{SIGNED_PREFIX}{id}.{tag}")
    }

    /// Recover the identifier from a signed cookie value.
    ///
    /// Returns `None` for values without the signed prefix, malformed
    /// values, and tags no configured secret validates. Callers treat all
    /// three identically to "no identifier presented".
    pub fn unsign(&self, value: &str) -> Option<String> {
        let signed = value.strip_prefix(SIGNED_PREFIX)?;
        let (id, tag) = signed.rsplit_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        for secret in &self.secrets {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
            mac.update(id.as_bytes());
            if mac.verify_slice(&tag).is_ok() {
                return Some(id.to_owned());
            }
        }
        None
    }
}

fn mac_tag(id: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take a key of any size");
    mac.update(id.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}
