// src/storage/memory.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

use super::{ApiCallWriter, RootsReader, RootsWriter, SthWriter, dedup_certs};
use crate::apicall::ApiCall;
use crate::certificate::Certificate;
use crate::ct_log::{Log, SignedTreeHead};
use crate::roots::{RootSetId, generate_set_id};
use crate::verification::VerificationError;

/// Root set observations kept for inspection; older ones are dropped
pub const MAX_OBSERVATIONS: usize = 1000;

/// A stored STH and what was wrong with it
#[derive(Debug, Clone)]
pub struct SthRecord {
    pub log_name: String,
    pub sth: SignedTreeHead,
    pub received_at: DateTime<Utc>,
    pub errors: Vec<VerificationError>,
}

/// A root set seen from a Log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSetObservation {
    pub log_name: String,
    pub root_set_id: RootSetId,
    pub received_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    api_calls: Vec<(String, ApiCall)>,
    sths: Vec<SthRecord>,
    root_sets: HashMap<RootSetId, Vec<Certificate>>,
    observations: VecDeque<RootSetObservation>,
    /// Most recent root set per Log name
    latest: HashMap<String, RootSetId>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<RootSetId>>>,
}

/// In-process storage, for single-run monitoring and tests
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn api_calls(&self) -> Vec<(String, ApiCall)> {
        self.lock().api_calls.clone()
    }

    pub fn sths(&self) -> Vec<SthRecord> {
        self.lock().sths.clone()
    }

    /// The most recent root set observations, oldest first
    pub fn observations(&self) -> Vec<RootSetObservation> {
        self.lock().observations.iter().cloned().collect()
    }
}

#[async_trait]
impl ApiCallWriter for MemoryStorage {
    async fn write_api_call(&self, log: &Log, api_call: &ApiCall) -> Result<()> {
        self.lock()
            .api_calls
            .push((log.name.clone(), api_call.clone()));
        Ok(())
    }
}

#[async_trait]
impl SthWriter for MemoryStorage {
    async fn write_sth(
        &self,
        log: &Log,
        sth: &SignedTreeHead,
        received_at: DateTime<Utc>,
        errs: &[VerificationError],
    ) -> Result<()> {
        self.lock().sths.push(SthRecord {
            log_name: log.name.clone(),
            sth: sth.clone(),
            received_at,
            errors: errs.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl RootsWriter for MemoryStorage {
    async fn write_roots(
        &self,
        log: &Log,
        roots: &[Certificate],
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        let roots = dedup_certs(roots);
        let id = generate_set_id(&roots).context("Failed to generate root set ID")?;

        let mut inner = self.lock();
        inner.root_sets.entry(id).or_insert(roots);
        if inner.observations.len() >= MAX_OBSERVATIONS {
            inner.observations.pop_front();
        }
        inner.observations.push_back(RootSetObservation {
            log_name: log.name.clone(),
            root_set_id: id,
            received_at,
        });
        inner.latest.insert(log.name.clone(), id);
        if let Some(watchers) = inner.watchers.get_mut(&log.name) {
            watchers.retain(|tx| tx.send(id).is_ok());
        }
        Ok(())
    }
}

#[async_trait]
impl RootsReader for MemoryStorage {
    async fn watch_roots(
        &self,
        log: &Log,
        _shutdown_rx: watch::Receiver<bool>,
    ) -> Result<mpsc::UnboundedReceiver<RootSetId>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.lock();
        if let Some(&id) = inner.latest.get(&log.name) {
            // Receiver is held locally, so this cannot fail.
            let _ = tx.send(id);
        }
        inner.watchers.entry(log.name.clone()).or_default().push(tx);

        Ok(rx)
    }

    async fn read_roots(&self, id: &RootSetId) -> Result<Vec<Certificate>> {
        self.lock()
            .root_sets
            .get(id)
            .cloned()
            .with_context(|| format!("Root set {} not found", id))
    }
}
