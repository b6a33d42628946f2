// src/cert_submitter.rs
//! Periodically submits a certificate chain to a Log and checks the SCT it
//! returns.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::apicall::ApiCall;
use crate::certificate::Certificate;
use crate::ct_log::{Endpoint, Log, LogClient, SignatureVerifier, SignedCertificateTimestamp};
use crate::incident::{Reporter, report_verification_errors};
use crate::interval::Interval;
use crate::schedule;
use crate::storage::ApiCallWriter;
use crate::verification::{VerificationError, check_sct};

const LOG_STR: &str = "Certificate Submitter";

/// Supplies the chains submitted to a Log, leaf first
#[async_trait]
pub trait ChainIssuer: Send + Sync {
    async fn issue_chain(&self) -> Result<Vec<Certificate>>;
}

/// Serves a fixed chain read from a PEM file.
///
/// If the Log shards by expiry, the leaf's NotAfter has to fall inside the
/// shard's interval or the Log would reject it.
pub struct PemChainIssuer {
    path: PathBuf,
    not_after_interval: Option<Interval>,
}

impl PemChainIssuer {
    pub fn new(path: impl Into<PathBuf>, not_after_interval: Option<Interval>) -> Self {
        Self {
            path: path.into(),
            not_after_interval,
        }
    }
}

#[async_trait]
impl ChainIssuer for PemChainIssuer {
    async fn issue_chain(&self) -> Result<Vec<Certificate>> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read chain file: {}", self.path.display()))?;
        let chain = Certificate::from_pem_chain(&data)
            .with_context(|| format!("Failed to parse chain file: {}", self.path.display()))?;

        if let Some(interval) = &self.not_after_interval {
            let leaf = chain.first().context("Chain file has no leaf certificate")?;
            let not_after = leaf.not_after().context("Failed to read leaf NotAfter")?;
            if !interval.contains(not_after) {
                bail!(
                    "leaf NotAfter {} is outside the Log's temporal interval [{}, {})",
                    not_after,
                    interval.start,
                    interval.end
                );
            }
        }

        Ok(chain)
    }
}

pub struct CertSubmitter {
    pub client: Arc<LogClient>,
    pub verifier: Arc<SignatureVerifier>,
    pub issuer: Arc<dyn ChainIssuer>,
    pub api_calls: Arc<dyn ApiCallWriter>,
    pub reporter: Arc<dyn Reporter>,
    pub log: Arc<Log>,
}

impl CertSubmitter {
    /// Submit a chain and check the SCT every `period` until shutdown
    pub async fn run(self, period: Duration, shutdown_rx: watch::Receiver<bool>) {
        info!("{}: {}: started with period {:?}", self.log.url, LOG_STR, period);

        let this = &self;
        schedule::every(period, shutdown_rx, move || async move {
            this.submit_and_check().await;
        })
        .await;

        info!("{}: {}: stopped", self.log.url, LOG_STR);
    }

    /// One issue, submit, record, check cycle. Returns the SCT and its
    /// findings if one was received.
    pub async fn submit_and_check(&self) -> Option<(SignedCertificateTimestamp, Vec<VerificationError>)> {
        let url = &self.log.url;

        let chain = match self.issuer.issue_chain().await {
            Ok(chain) => chain,
            Err(e) => {
                error!("{}: {}: error issuing certificate chain: {:#}", url, LOG_STR, e);
                return None;
            }
        };

        let Some(leaf) = chain.first() else {
            error!("{}: {}: issuer returned an empty certificate chain", url, LOG_STR);
            return None;
        };

        info!("{}: {}: submitting chain for {}...", url, LOG_STR, leaf.subject());
        let resp = self.client.add_chain(&chain).await;
        let received_at = resp.http_data.timing.end;

        let api_call = ApiCall::new(Endpoint::AddChain, &resp.http_data, resp.result.as_ref().err());
        if let Err(e) = self.api_calls.write_api_call(&self.log, &api_call).await {
            error!("{}: {}: error writing API call {}: {:#}", url, LOG_STR, api_call, e);
        }

        let sct = match resp.result {
            Ok(sct) => sct,
            Err(e) => {
                warn!("{}: {}: add-chain failed: {}", url, LOG_STR, e);
                return None;
            }
        };
        info!("{}: {}: got SCT {}", url, LOG_STR, sct);

        let errs = check_sct(&sct, &chain, received_at, &self.verifier, &self.log);
        if !errs.is_empty() {
            let mut msg = format!("SCT verification errors for SCT {}:", sct);
            for e in &errs {
                msg.push_str(&format!("\n\t{}: {},", e.kind(), e));
            }
            info!("{}: {}: {}", url, LOG_STR, msg);
        }

        let subject = format!("SCT for {}", leaf.subject());
        if let Err(e) =
            report_verification_errors(self.reporter.as_ref(), &self.log, Endpoint::AddChain, &subject, &errs).await
        {
            error!("{}: {}: error reporting SCT problems: {:#}", url, LOG_STR, e);
        }

        Some((sct, errs))
    }
}
