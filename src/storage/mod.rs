// src/storage/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::apicall::ApiCall;
use crate::certificate::Certificate;
use crate::ct_log::{Log, SignedTreeHead};
use crate::roots::RootSetId;
use crate::verification::VerificationError;

pub mod memory;
pub mod postgres;
pub mod print;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use print::PrintStorage;

/// Records every call made to a Log
#[async_trait]
pub trait ApiCallWriter: Send + Sync {
    async fn write_api_call(&self, log: &Log, api_call: &ApiCall) -> Result<()>;
}

/// Stores STHs along with the problems found with them
#[async_trait]
pub trait SthWriter: Send + Sync {
    async fn write_sth(
        &self,
        log: &Log,
        sth: &SignedTreeHead,
        received_at: DateTime<Utc>,
        errs: &[VerificationError],
    ) -> Result<()>;
}

/// Stores the root certificates a Log returned at a point in time.
///
/// Duplicate certificates are removed before storing.
#[async_trait]
pub trait RootsWriter: Send + Sync {
    async fn write_roots(
        &self,
        log: &Log,
        roots: &[Certificate],
        received_at: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
pub trait RootsReader: Send + Sync {
    /// Stream the ID of each root set observed for `log`, starting with the
    /// latest one already stored, until `shutdown_rx` fires.
    async fn watch_roots(
        &self,
        log: &Log,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<mpsc::UnboundedReceiver<RootSetId>>;

    /// The certificates in a root set
    async fn read_roots(&self, id: &RootSetId) -> Result<Vec<Certificate>>;
}

/// Remove duplicate certificates, keeping first occurrences in order
pub fn dedup_certs(roots: &[Certificate]) -> Vec<Certificate> {
    let mut seen = std::collections::HashSet::new();
    roots
        .iter()
        .filter(|c| seen.insert(c.raw()))
        .cloned()
        .collect()
}
