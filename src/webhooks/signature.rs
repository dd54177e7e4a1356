//! Webhook signature verification (HMAC-SHA256).
//!
//! GitHub signs each delivery with the shared webhook secret and sends the
//! result in `X-Hub-Signature-256` as `sha256=<hex>`. The signature covers the
//! raw request body, so it must be checked before the body is parsed.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// The shared webhook secret. Its `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(Vec<u8>);

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(<redacted>)")
    }
}

impl From<&str> for WebhookSecret {
    fn from(s: &str) -> Self {
        WebhookSecret(s.as_bytes().to_vec())
    }
}

impl From<String> for WebhookSecret {
    fn from(s: String) -> Self {
        WebhookSecret(s.into_bytes())
    }
}

impl WebhookSecret {
    fn mac(&self, payload: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.0).ok()?;
        mac.update(payload);
        Some(mac)
    }

    /// Returns `true` iff `header` is a valid signature of `payload`.
    ///
    /// Malformed headers are simply invalid. The comparison is constant-time.
    pub fn verify(&self, payload: &[u8], header: &str) -> bool {
        let Some(expected) = parse_signature_header(header) else {
            return false;
        };
        self.mac(payload)
            .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
    }

    /// The header value GitHub would send for `payload`.
    pub fn sign(&self, payload: &[u8]) -> Option<String> {
        self.mac(payload)
            .map(|mac| format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }
}

/// Decodes `sha256=<hex>` into raw bytes. Anything else is `None`.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix("sha256=")?).ok()
}
