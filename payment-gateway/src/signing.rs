//! HMAC-SHA256 signing for provider traffic.
//!
//! Outbound requests are signed so the provider can authenticate us; inbound
//! provider callbacks are verified with the same scheme.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature of an outbound request body.
pub const REQUEST_SIGNATURE_HEADER: &str = "X-Signature";

/// Header carrying the signature of an inbound provider callback.
pub const CALLBACK_SIGNATURE_HEADER: &str = "X-Provider-Signature";

/// Signs a payload, returning the lowercase hex digest.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a signature using constant-time comparison.
///
/// Accepts a bare hex digest or one prefixed with `sha256=`.
pub fn verify(payload: &[u8], signature: &str, secret: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = sign(payload, secret);
    expected
        .as_bytes()
        .ct_eq(signature.to_ascii_lowercase().as_bytes())
        .into()
}
