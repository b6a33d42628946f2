// src/sth_getter.rs
//! Periodically fetches a Log's STH, checks it and stores it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::apicall::ApiCall;
use crate::ct_log::{Endpoint, Log, LogClient, SignatureVerifier, SignedTreeHead};
use crate::incident::{Reporter, report_verification_errors};
use crate::schedule;
use crate::storage::{ApiCallWriter, SthWriter};
use crate::verification::{VerificationError, check_sth};

const LOG_STR: &str = "STH Getter";

pub struct SthGetter {
    pub client: Arc<LogClient>,
    pub verifier: Arc<SignatureVerifier>,
    pub api_calls: Arc<dyn ApiCallWriter>,
    pub sths: Arc<dyn SthWriter>,
    pub reporter: Arc<dyn Reporter>,
    pub log: Arc<Log>,
}

impl SthGetter {
    /// Fetch and check an STH every `period` until shutdown
    pub async fn run(self, period: Duration, shutdown_rx: watch::Receiver<bool>) {
        info!("{}: {}: started with period {:?}", self.log.url, LOG_STR, period);

        let this = &self;
        schedule::every(period, shutdown_rx, move || async move {
            this.get_and_check().await;
        })
        .await;

        info!("{}: {}: stopped", self.log.url, LOG_STR);
    }

    /// One fetch, record, check, store cycle. Returns the STH and its
    /// findings if one was fetched.
    pub async fn get_and_check(&self) -> Option<(SignedTreeHead, Vec<VerificationError>)> {
        let url = &self.log.url;

        info!("{}: {}: getting STH...", url, LOG_STR);
        let resp = self.client.get_sth().await;
        let received_at = resp.http_data.timing.end;
        if !resp.http_data.body.is_empty() {
            info!(
                "{}: {}: response: {}",
                url,
                LOG_STR,
                String::from_utf8_lossy(&resp.http_data.body)
            );
        }

        let api_call = ApiCall::new(Endpoint::GetSth, &resp.http_data, resp.result.as_ref().err());
        if let Err(e) = self.api_calls.write_api_call(&self.log, &api_call).await {
            error!("{}: {}: error writing API call {}: {:#}", url, LOG_STR, api_call, e);
        }

        let sth = match resp.result {
            Ok(sth) => sth,
            Err(e) => {
                warn!("{}: {}: get-sth failed: {}", url, LOG_STR, e);
                return None;
            }
        };

        let errs = check_sth(&sth, received_at, &self.verifier, &self.log);
        if !errs.is_empty() {
            let mut msg = format!("STH verification errors for STH {:?}:", sth);
            for e in &errs {
                msg.push_str(&format!("\n\t{}: {},", e.kind(), e));
            }
            info!("{}: {}: {}", url, LOG_STR, msg);
        }

        if let Err(e) = self.sths.write_sth(&self.log, &sth, received_at, &errs).await {
            error!("{}: {}: error writing STH: {:#}", url, LOG_STR, e);
        }

        let subject = format!("STH tree_size={} timestamp={}", sth.tree_size, sth.timestamp);
        if let Err(e) =
            report_verification_errors(self.reporter.as_ref(), &self.log, Endpoint::GetSth, &subject, &errs).await
        {
            error!("{}: {}: error reporting STH problems: {:#}", url, LOG_STR, e);
        }

        Some((sth, errs))
    }
}
