//! Request signing for the control-plane.
//!
//! Every request carries six `x-bili-*` headers. They are joined as
//! `key:value` lines (fixed order, `\n`-separated, no trailing newline)
//! and the result is signed with HMAC-SHA256 keyed by the access-key
//! secret. The hex digest goes into `Authorization`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use ol_domain::{Error, Result};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA256";
pub const SIGNATURE_VERSION: &str = "1.0";

/// Signs request bodies with one access-key pair.
#[derive(Clone)]
pub struct RequestSigner {
    access_key_id: String,
    access_key_secret: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// The signature header set for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub access_key_id: String,
    pub content_md5: String,
    pub nonce: String,
    /// Unix seconds, UTC.
    pub timestamp: i64,
    pub authorization: String,
}

impl SignedHeaders {
    /// The six signed headers in canonical order.
    pub fn pairs(&self) -> [(&'static str, String); 6] {
        [
            ("x-bili-accesskeyid", self.access_key_id.clone()),
            ("x-bili-content-md5", self.content_md5.clone()),
            ("x-bili-signature-method", SIGNATURE_METHOD.to_owned()),
            ("x-bili-signature-nonce", self.nonce.clone()),
            ("x-bili-signature-version", SIGNATURE_VERSION.to_owned()),
            ("x-bili-timestamp", self.timestamp.to_string()),
        ]
    }

    /// The string the `Authorization` digest is computed over.
    pub fn canonical_string(&self) -> String {
        canonical_string(&self.pairs())
    }
}

impl RequestSigner {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    /// Sign `body` with a fresh random nonce and the current time.
    pub fn sign(&self, body: &str) -> Result<SignedHeaders> {
        self.sign_with(body, &Uuid::new_v4().to_string(), Utc::now().timestamp())
    }

    /// Sign `body` with a caller-supplied nonce and timestamp.
    pub fn sign_with(&self, body: &str, nonce: &str, timestamp: i64) -> Result<SignedHeaders> {
        // Every field ends up in an HTTP header.
        if !self.access_key_id.is_ascii() {
            return Err(Error::Encoding(
                "accessKeyId contains non-ASCII characters".into(),
            ));
        }
        if !nonce.is_ascii() {
            return Err(Error::Encoding("nonce contains non-ASCII characters".into()));
        }

        let mut headers = SignedHeaders {
            access_key_id: self.access_key_id.clone(),
            content_md5: content_md5(body),
            nonce: nonce.to_owned(),
            timestamp,
            authorization: String::new(),
        };
        headers.authorization =
            hmac_sha256_hex(&self.access_key_secret, &headers.canonical_string())?;
        Ok(headers)
    }
}

/// Lowercase hex MD5 of the request body.
pub fn content_md5(body: &str) -> String {
    hex::encode(Md5::digest(body.as_bytes()))
}

/// Lowercase hex HMAC-SHA256 of `message` keyed by `key`.
pub fn hmac_sha256_hex(key: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Other(format!("hmac key: {e}")))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn canonical_string(pairs: &[(&'static str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n")
}
