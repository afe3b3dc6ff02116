//! Secret-key request signatures (version 2).
//!
//! ```text
//! signature = "v2." + base64url_nopad(HMAC-SHA256(secret_key, input))
//! input     = METHOD "\n" PUBLISH_KEY "\n" PATH "\n" QUERY "\n" BODY
//! ```
//!
//! `QUERY` is every query parameter except `signature`, sorted by key (then value) and rendered
//! with [`crate::encoding`]. `BODY` is only part of the input for methods that carry one.
//! Because the canonical query includes `timestamp`, a signed request cannot be replayed with a
//! different timestamp or with any other parameter altered.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::constants::query_keys::SIGNATURE;
use crate::encoding::encode_query;

type HmacSha256 = Hmac<Sha256>;

const VERSION_PREFIX: &str = "v2.";

/// Everything the signature covers.
#[derive(Debug, Clone, Copy)]
pub struct SignatureInput<'a> {
    /// Upper-case HTTP method.
    pub method: &'a str,
    /// Publish key of the client (may be empty).
    pub publish_key: &'a str,
    /// Already percent-encoded request path.
    pub path: &'a str,
    /// Final query parameters, in any order.
    pub query: &'a [(String, String)],
    /// Request body; ignored for methods without one.
    pub body: &'a [u8],
}

impl SignatureInput<'_> {
    fn carries_body(&self) -> bool {
        matches!(self.method, "POST" | "PUT" | "PATCH")
    }

    /// The exact string fed to the HMAC.
    pub fn canonical_string(&self) -> String {
        let body = if self.carries_body() {
            String::from_utf8_lossy(self.body)
        } else {
            "".into()
        };
        format!(
            "{}\n{}\n{}\n{}\n{}",
            self.method,
            self.publish_key,
            self.path,
            canonical_query(self.query),
            body
        )
    }
}

/// Sort and render the query the way the service does before verifying a signature.
pub fn canonical_query(query: &[(String, String)]) -> String {
    let mut sorted: Vec<(&str, &str)> = query
        .iter()
        .filter(|(key, _)| key != SIGNATURE)
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    sorted.sort_unstable();
    encode_query(sorted)
}

/// Compute the `v2.` signature of a request.
pub fn sign(secret_key: &str, input: &SignatureInput<'_>) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(input.canonical_string().as_bytes());
    let digest = mac.finalize().into_bytes();

    format!("{VERSION_PREFIX}{}", URL_SAFE_NO_PAD.encode(digest))
}

/// Constant-time check of a received signature against the request it claims to cover.
pub fn verify(secret_key: &str, input: &SignatureInput<'_>, signature: &str) -> bool {
    let Some(encoded) = signature.strip_prefix(VERSION_PREFIX) else {
        return false;
    };
    let Ok(expected) = URL_SAFE_NO_PAD.decode(encoded) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(input.canonical_string().as_bytes());
    mac.verify_slice(&expected).is_ok()
}
