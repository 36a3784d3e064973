use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::Write;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 over `appID || body || dateTime`, keyed by the
/// shared secret. Both peers compute exactly this string.
pub fn compute_signature(app_id: &str, secret: &str, body: &str, date_time: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(app_id.as_bytes());
    mac.update(body.as_bytes());
    mac.update(date_time.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut hex, "{:02x}", byte);
    }
    hex
}

/// Recompute and compare against a provided signature.
pub fn verify_signature(
    app_id: &str,
    secret: &str,
    body: &str,
    date_time: &str,
    provided: &str,
) -> bool {
    compute_signature(app_id, secret, body, date_time) == provided
}
