// src/collector.rs
//! Runs every monitoring activity for one Log until shutdown.

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cert_submitter::{CertSubmitter, ChainIssuer};
use crate::ct_log::{Log, LogClient, SignatureVerifier};
use crate::incident::Reporter;
use crate::roots::analyzer;
use crate::roots_getter::RootsGetter;
use crate::sth_getter::SthGetter;
use crate::storage::{ApiCallWriter, RootsReader, RootsWriter, SthWriter};

/// How often each activity runs; zero disables it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Periods {
    pub get_sth: Duration,
    pub get_roots: Duration,
    pub add_chain: Duration,
}

/// Where the activities send what they collect and find
#[derive(Clone)]
pub struct Sinks {
    pub api_calls: Arc<dyn ApiCallWriter>,
    pub sths: Arc<dyn SthWriter>,
    pub roots: Arc<dyn RootsWriter>,
    /// Without a reader the Roots Analyzer does not run
    pub roots_reader: Option<Arc<dyn RootsReader>>,
    pub reporter: Arc<dyn Reporter>,
}

impl Sinks {
    /// Use one backend for all storage
    pub fn from_storage<S>(storage: Arc<S>, reporter: Arc<dyn Reporter>) -> Self
    where
        S: ApiCallWriter + SthWriter + RootsWriter + RootsReader + 'static,
    {
        Self {
            api_calls: storage.clone(),
            sths: storage.clone(),
            roots: storage.clone(),
            roots_reader: Some(storage),
            reporter,
        }
    }
}

pub struct Collector {
    pub log: Arc<Log>,
    pub periods: Periods,
    pub request_timeout: Duration,
    pub issuer: Option<Arc<dyn ChainIssuer>>,
    pub sinks: Sinks,
}

impl Collector {
    /// Start an activity for every non-zero period and wait for all of them
    /// to stop. They stop once `shutdown_rx` fires.
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let log = self.log;
        let sinks = self.sinks;

        if !self.periods.add_chain.is_zero() && self.issuer.is_none() {
            bail!("{}: add-chain period set but no certificate chain to submit", log.url);
        }

        let client = Arc::new(LogClient::with_timeout(&log.url, self.request_timeout)?);
        let verifier = Arc::new(
            SignatureVerifier::new(&log.public_key)
                .with_context(|| format!("{}: unusable public key", log.url))?,
        );

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        if !self.periods.get_sth.is_zero() {
            let getter = SthGetter {
                client: client.clone(),
                verifier: verifier.clone(),
                api_calls: sinks.api_calls.clone(),
                sths: sinks.sths.clone(),
                reporter: sinks.reporter.clone(),
                log: log.clone(),
            };
            let period = self.periods.get_sth;
            let rx = shutdown_rx.clone();
            handles.push(("STH Getter", tokio::spawn(getter.run(period, rx))));
        }

        if !self.periods.get_roots.is_zero() {
            let getter = RootsGetter {
                client: client.clone(),
                api_calls: sinks.api_calls.clone(),
                roots: sinks.roots.clone(),
                log: log.clone(),
            };
            let period = self.periods.get_roots;
            let rx = shutdown_rx.clone();
            handles.push(("Roots Getter", tokio::spawn(getter.run(period, rx))));

            if let Some(reader) = &sinks.roots_reader {
                let task = analyzer::run(
                    reader.clone(),
                    sinks.reporter.clone(),
                    log.clone(),
                    shutdown_rx.clone(),
                );
                handles.push(("Roots Analyzer", tokio::spawn(task)));
            }
        }

        if let (false, Some(issuer)) = (self.periods.add_chain.is_zero(), self.issuer) {
            let submitter = CertSubmitter {
                client: client.clone(),
                verifier: verifier.clone(),
                issuer,
                api_calls: sinks.api_calls.clone(),
                reporter: sinks.reporter.clone(),
                log: log.clone(),
            };
            let period = self.periods.add_chain;
            let rx = shutdown_rx.clone();
            handles.push(("Certificate Submitter", tokio::spawn(submitter.run(period, rx))));
        }

        if handles.is_empty() {
            warn!("{}: no activities enabled, nothing to do", log.url);
            return Ok(());
        }
        info!("{}: started {} activities", log.url, handles.len());

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!("{}: {} task failed: {}", log.url, name, e);
            }
        }

        info!("{}: all activities stopped", log.url);
        Ok(())
    }
}
