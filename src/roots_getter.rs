// src/roots_getter.rs
//! Periodically fetches the root certificates a Log accepts and stores them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::apicall::ApiCall;
use crate::certificate::Certificate;
use crate::ct_log::{Endpoint, Log, LogClient};
use crate::schedule;
use crate::storage::{ApiCallWriter, RootsWriter};

const LOG_STR: &str = "Roots Getter";

pub struct RootsGetter {
    pub client: Arc<LogClient>,
    pub api_calls: Arc<dyn ApiCallWriter>,
    pub roots: Arc<dyn RootsWriter>,
    pub log: Arc<Log>,
}

impl RootsGetter {
    /// Fetch and store the Log's roots every `period` until shutdown
    pub async fn run(self, period: Duration, shutdown_rx: watch::Receiver<bool>) {
        info!("{}: {}: started with period {:?}", self.log.url, LOG_STR, period);

        let this = &self;
        schedule::every(period, shutdown_rx, move || async move {
            this.get_and_store().await;
        })
        .await;

        info!("{}: {}: stopped", self.log.url, LOG_STR);
    }

    /// One fetch, record, store cycle. Returns the roots if they were
    /// fetched.
    pub async fn get_and_store(&self) -> Option<Vec<Certificate>> {
        let url = &self.log.url;

        info!("{}: {}: getting roots...", url, LOG_STR);
        let resp = self.client.get_roots().await;
        let received_at = resp.http_data.timing.end;

        let api_call = ApiCall::new(Endpoint::GetRoots, &resp.http_data, resp.result.as_ref().err());
        if let Err(e) = self.api_calls.write_api_call(&self.log, &api_call).await {
            error!("{}: {}: error writing API call {}: {:#}", url, LOG_STR, api_call, e);
        }

        let roots = match resp.result {
            Ok(roots) => roots,
            Err(e) => {
                warn!("{}: {}: get-roots failed: {}", url, LOG_STR, e);
                return None;
            }
        };
        info!("{}: {}: got {} root certificates", url, LOG_STR, roots.len());

        if let Err(e) = self.roots.write_roots(&self.log, &roots, received_at).await {
            error!("{}: {}: error writing roots: {:#}", url, LOG_STR, e);
        }

        Some(roots)
    }
}
