//! Signed-upload parameters for the Cloudinary upload API.
//!
//! The signature is a hex digest over the signed parameters, sorted by name and serialized as
//! `key=value` pairs joined with `&`, with the API secret appended:
//!
//! ```text
//! folder=cv_uploads&timestamp=1315060510<api_secret>
//! ```
//!
//! `file`, `api_key`, `resource_type` and `cloud_name` are never part of the signed payload.
//!
//! See: <https://cloudinary.com/documentation/authentication_signatures>

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::config::SignatureAlgorithm;

/// Serialize parameters in the order the provider expects, skipping empty values.
pub fn string_to_sign(params: &[(&str, &str)]) -> String {
    let mut params: Vec<_> = params.iter().filter(|(_, value)| !value.is_empty()).collect();
    params.sort_by(|(a, _), (b, _)| a.cmp(b));

    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign the given parameters with the API secret.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str, algorithm: SignatureAlgorithm) -> String {
    let payload = string_to_sign(params);
    digest_hex(algorithm, &payload, api_secret)
}

fn digest_hex(algorithm: SignatureAlgorithm, payload: &str, api_secret: &str) -> String {
    match algorithm {
        SignatureAlgorithm::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(payload.as_bytes());
            hasher.update(api_secret.as_bytes());
            hex::encode(hasher.finalize())
        }
        SignatureAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(payload.as_bytes());
            hasher.update(api_secret.as_bytes());
            hex::encode(hasher.finalize())
        }
    }
}
