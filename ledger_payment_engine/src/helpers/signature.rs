//! # Request signature format
//!
//! Every request a merchant sends to the gateway, and every callback the gateway sends back, carries a `sign`
//! parameter. It is computed over the remaining parameters as follows:
//!
//! 1. Drop every parameter with an empty value, as well as `sign` and `sign_type` themselves.
//! 2. Sort the remaining keys in ascending byte order.
//! 3. Join them as `k1=v1&k2=v2&...`.
//! 4. Append the merchant's secret key directly (no separator).
//! 5. Hash with MD5 and render as lowercase hex.
//!
//! ```text
//!   {"b": "2", "a": "1"} + "key123"  =>  md5("a=1&b=2key123")
//! ```
use std::{collections::HashMap, fmt::Write};

use md5::{Digest, Md5};

pub const SIGN_TYPE: &str = "MD5";

/// Builds the canonical `k=v&k=v` string that is hashed, without the key.
pub fn canonical_query(params: &HashMap<String, String>) -> String {
    let mut keys = params
        .iter()
        .filter(|(k, v)| !v.is_empty() && k.as_str() != "sign" && k.as_str() != "sign_type")
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>();
    keys.sort_unstable();
    keys.iter().map(|k| format!("{k}={}", params[*k])).collect::<Vec<_>>().join("&")
}

pub fn generate_sign(params: &HashMap<String, String>, key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(canonical_query(params).as_bytes());
    hasher.update(key.as_bytes());
    hasher.finalize().iter().fold(String::with_capacity(32), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Checks the `sign` parameter against the expected signature. The comparison ignores case. A missing or empty
/// `sign` always fails.
pub fn validate_signature(params: &HashMap<String, String>, key: &str) -> bool {
    match params.get("sign") {
        Some(sign) if !sign.is_empty() => generate_sign(params, key).eq_ignore_ascii_case(sign),
        _ => false,
    }
}
