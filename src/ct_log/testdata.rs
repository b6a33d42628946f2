// src/ct_log/testdata.rs
//! Known-good Log responses shared by unit tests.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::signature::DigitallySigned;
use super::types::{LogId, SignedCertificateTimestamp, SignedTreeHead, V1};

/// Google Pilot's public key
pub const PILOT_KEY_B64: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEfahLEimAoz2t01p3uMziiLOl/fHTDM0YDOhBRuiBARsV4UvxG2LdNgoIGLrtCzWE0J5APC2em4JlvR8EEEFMoA==";
pub const PILOT_LOG_ID_B64: &str = "pLkJkLQYWBSHuxOizGdwCjw1mAT5G9+443fNDsgN3BA=";

pub const PILOT_STH_TREE_SIZE: u64 = 580682455;
/// 2019-04-10 12:04:46.201 UTC
pub const PILOT_STH_TIMESTAMP: u64 = 1554897886201;
pub const PILOT_STH_ROOT_HASH_B64: &str = "VicMkhzrGNv+lNCwXRVHH0WniZuDg3IXhgPai5kyHdA=";
pub const PILOT_STH_SIGNATURE_B64: &str = "BAMARzBFAiEAs0GiYnPT5ZQJ2LGLhLmIXZXSLg+N+CxTkJL75tECEqgCIBZzJGyzH9h+IL63XCvRlfTKhLvzSxVicrT30+rwTSU0";

/// Key of the Log that signed [`valid_sct`] over `tests/testdata/leaf.pem`
pub const SCT_LOG_KEY_B64: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEvXxzuIsum0ztpiAistqL4TGTpbVu3Cbn33hC4kzQtesGBa2nvag6xqK4DX4xQED6R/8WuDushc7bAURRu3znGg==";
pub const SCT_LOG_ID_B64: &str = "uOqzahPbbKGGl3klr3XH6YOh2DA1zLPy22wI7dJcaoY=";
/// 2019-06-01 13:00:00 UTC
pub const SCT_TIMESTAMP: u64 = 1559394000000;
pub const SCT_SIGNATURE_B64: &str = "BAMARzBFAiByLku+hXZTl3ldvIlvwtTuh0j+SEapkSjSgRlYWOppXgIhAL17SyHihDGLkqI3bp+3H9kkaEfB55FAXZG06tgLNdzV";

fn decode(b64: &str) -> Vec<u8> {
    BASE64.decode(b64).unwrap()
}

pub fn pilot_key() -> Vec<u8> {
    decode(PILOT_KEY_B64)
}

pub fn pilot_sth() -> SignedTreeHead {
    SignedTreeHead {
        version: V1,
        tree_size: PILOT_STH_TREE_SIZE,
        timestamp: PILOT_STH_TIMESTAMP,
        sha256_root_hash: decode(PILOT_STH_ROOT_HASH_B64).try_into().unwrap(),
        tree_head_signature: DigitallySigned::parse(&decode(PILOT_STH_SIGNATURE_B64)).unwrap(),
    }
}

pub fn sct_log_key() -> Vec<u8> {
    decode(SCT_LOG_KEY_B64)
}

pub fn valid_sct() -> SignedCertificateTimestamp {
    SignedCertificateTimestamp {
        sct_version: V1,
        log_id: LogId(decode(SCT_LOG_ID_B64).try_into().unwrap()),
        timestamp: SCT_TIMESTAMP,
        extensions: Vec::new(),
        signature: DigitallySigned::parse(&decode(SCT_SIGNATURE_B64)).unwrap(),
    }
}
