// src/ct_log/log.rs
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Duration;
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

use super::types::LogId;
use crate::interval::Interval;

/// Metadata about a monitored CT Log
#[derive(Debug, Clone)]
pub struct Log {
    pub name: String,
    pub url: String,
    /// DER-encoded SubjectPublicKeyInfo
    pub public_key: Vec<u8>,
    pub log_id: LogId,
    /// Maximum Merge Delay
    pub mmd: Duration,
    /// Window in which a certificate's NotAfter must fall for the Log to
    /// accept it. Only set for temporal shards; whole seconds.
    pub temporal_interval: Option<Interval>,
}

impl Log {
    /// Create new Log from a base64 DER public key
    pub fn new(
        url: &str,
        name: &str,
        b64_public_key: &str,
        mmd: Duration,
        temporal_interval: Option<Interval>,
    ) -> Result<Self> {
        let public_key = BASE64
            .decode(b64_public_key.trim())
            .context("Failed to decode base64 public key")?;

        let (rest, _) = SubjectPublicKeyInfo::from_der(&public_key)
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;
        if !rest.is_empty() {
            anyhow::bail!("Public key has {} bytes of trailing data", rest.len());
        }

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            log_id: LogId::from_spki(&public_key),
            public_key,
            mmd,
            temporal_interval: temporal_interval.map(|i| i.truncated_to_seconds()),
        })
    }
}

/// Convert a Maximum Merge Delay in seconds, rejecting values `Duration`
/// cannot hold
pub fn mmd_from_secs(secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .with_context(|| format!("MMD of {} seconds is out of range", secs))
}
