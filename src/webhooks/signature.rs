//! HMAC-SHA256 payload signatures.
//!
//! GitHub (`X-Hub-Signature-256`) and Bitbucket Server (`X-Hub-Signature`)
//! sign the exact raw request body with a shared secret and send the result
//! as `sha256=<hex>`. The header names and error vocabulary differ per
//! provider; the scheme itself is identical and lives here.
//!
//! The body must be fully buffered before verification: the signature
//! covers the raw byte sequence, not any decoded form of it.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Why a signature did not verify.
///
/// Providers map these onto their own error messages ("signature mismatch"
/// vs "payload signature mismatch"), so this type carries structure, not
/// wording.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The header is not `sha256=<hex>`.
    #[error("{0}")]
    Malformed(String),

    /// The header decoded cleanly but does not match the payload.
    #[error("signature does not match payload")]
    Mismatch,
}

/// Decodes a `sha256=<hex>` header value into raw signature bytes.
pub fn decode_signature_header(header: &str) -> Result<Vec<u8>, SignatureError> {
    let hex_sig = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| SignatureError::Malformed(format!("missing {SIGNATURE_PREFIX} prefix")))?;
    hex::decode(hex_sig).map_err(|e| SignatureError::Malformed(e.to_string()))
}

/// Computes the HMAC-SHA256 signature of a payload with the given secret.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats raw signature bytes as a `sha256=<hex>` header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex::encode(signature))
}

/// Verifies a `sha256=<hex>` header against the raw payload and secret.
///
/// Distinguishes a malformed header from a well-formed header that simply
/// does not match. Comparison is constant-time via the HMAC library.
pub fn verify_signature_header(
    payload: &[u8],
    header: &str,
    secret: &[u8],
) -> Result<(), SignatureError> {
    let expected = decode_signature_header(header)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
