// src/storage/print.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use super::{ApiCallWriter, RootsWriter, SthWriter};
use crate::apicall::ApiCall;
use crate::certificate::Certificate;
use crate::ct_log::{Log, SignedTreeHead};
use crate::roots::generate_set_id;
use crate::verification::VerificationError;

/// Storage that only logs what it is given
#[derive(Debug, Default, Clone)]
pub struct PrintStorage;

#[async_trait]
impl ApiCallWriter for PrintStorage {
    async fn write_api_call(&self, log: &Log, api_call: &ApiCall) -> Result<()> {
        info!("{}: API call:\n{}", log.url, api_call);
        Ok(())
    }
}

#[async_trait]
impl SthWriter for PrintStorage {
    async fn write_sth(
        &self,
        log: &Log,
        sth: &SignedTreeHead,
        received_at: DateTime<Utc>,
        errs: &[VerificationError],
    ) -> Result<()> {
        info!(
            "{}: STH tree_size={} timestamp={} root_hash={} received_at={} errors={}",
            log.url,
            sth.tree_size,
            sth.timestamp,
            hex::encode(sth.sha256_root_hash),
            received_at,
            errs.len()
        );
        for e in errs {
            info!("{}: STH error: {}", log.url, e);
        }
        Ok(())
    }
}

#[async_trait]
impl RootsWriter for PrintStorage {
    async fn write_roots(
        &self,
        log: &Log,
        roots: &[Certificate],
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = generate_set_id(roots)?;
        info!(
            "{}: {} root certificates (set {}) received at {}",
            log.url,
            roots.len(),
            id,
            received_at
        );
        Ok(())
    }
}
