//! `X-Hub-Signature-256` verification for webhook POSTs.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// True when `header` is `sha256=<hex>` of the HMAC-SHA256 of `body` keyed by `app_secret`.
pub fn verify_signature(app_secret: &str, header: Option<&str>, body: &[u8]) -> bool {
    let signature = header.unwrap_or("").trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature).trim();
    if signature.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Header value for `body` signed with `app_secret`.
pub fn sign(app_secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
