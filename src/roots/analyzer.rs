// src/roots/analyzer.rs
//! Watches a Log's accepted root certificates and reports when they change.

use anyhow::{Context, Result};
use std::fmt::Write;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use super::{RootSetId, diff_root_sets};
use crate::certificate::Certificate;
use crate::ct_log::Log;
use crate::ct_log::client::GET_ROOTS_PATH;
use crate::incident::Reporter;
use crate::metrics;
use crate::storage::RootsReader;

const LOG_STR: &str = "Roots Analyzer";

/// Run the Roots Analyzer until shutdown, or until reading a root set or
/// reporting a change fails.
///
/// Flapping between two root sets is reported on every flap.
pub async fn run(
    st: Arc<dyn RootsReader>,
    rep: Arc<dyn Reporter>,
    log: Arc<Log>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("{}: {}: started", log.url, LOG_STR);

    let mut root_set_rx = match st.watch_roots(&log, shutdown_rx.clone()).await {
        Ok(rx) => rx,
        Err(e) => {
            error!("{}: {}: watch_roots() failed: {:#}", log.url, LOG_STR, e);
            return;
        }
    };

    let mut last: Option<RootSetId> = None;
    loop {
        let root_set_id = tokio::select! {
            _ = shutdown_rx.changed() => break,
            id = root_set_rx.recv() => match id {
                Some(id) => id,
                None => break,
            },
        };

        if let Some(last_id) = last {
            if last_id != root_set_id {
                if let Err(e) =
                    handle_change(st.as_ref(), rep.as_ref(), &log, &last_id, &root_set_id).await
                {
                    error!("{}: {}: {:#}", log.url, LOG_STR, e);
                    return;
                }
            }
        }
        last = Some(root_set_id);
    }

    info!("{}: {}: stopped", log.url, LOG_STR);
}

async fn handle_change(
    st: &dyn RootsReader,
    rep: &dyn Reporter,
    log: &Log,
    old_id: &RootSetId,
    new_id: &RootSetId,
) -> Result<()> {
    let old_roots = st.read_roots(old_id).await?;
    let new_roots = st.read_roots(new_id).await?;
    let (added, removed) = diff_root_sets(&old_roots, &new_roots);
    if added.is_empty() && removed.is_empty() {
        return Ok(());
    }

    info!(
        "{}: {}: root set changed from {} to {} ({} added, {} removed)",
        log.url,
        LOG_STR,
        old_id,
        new_id,
        added.len(),
        removed.len()
    );
    metrics::record_root_set_change(&log.name);
    report_change(rep, log, added, removed).await
}

/// Full URL of the Log's get-roots endpoint, or the base URL if it does not
/// parse
pub fn get_roots_url(log: &Log) -> String {
    match url::Url::parse(&log.url) {
        Ok(mut u) => {
            let joined = format!(
                "{}/{}",
                u.path().trim_end_matches('/'),
                GET_ROOTS_PATH.trim_start_matches('/')
            );
            u.set_path(&joined);
            u.to_string()
        }
        Err(e) => {
            error!("{}: {}: failed to parse CT Log URL: {}", log.url, LOG_STR, e);
            log.url.clone()
        }
    }
}

/// Sort by subject, then by DER
fn sort_certs(certs: &mut [Certificate]) {
    certs.sort_by_cached_key(|c| (c.subject(), c.raw().to_vec()));
}

/// Human-readable description of a root set change
pub fn change_report(log: &Log, mut added: Vec<Certificate>, mut removed: Vec<Certificate>) -> String {
    sort_certs(&mut added);
    sort_certs(&mut removed);

    let mut out = format!(
        "The root certificates accepted by {} ({}) have changed.\n",
        log.name, log.url
    );
    for (heading, certs) in [("added", &added), ("removed", &removed)] {
        if certs.is_empty() {
            continue;
        }
        let _ = write!(out, "\nCertificates {} ({}):\n", heading, certs.len());
        for c in certs.iter() {
            let _ = writeln!(
                out,
                "{} (SHA256: {})",
                c.subject(),
                hex::encode_upper(c.sha256())
            );
        }
    }
    out
}

async fn report_change(
    rep: &dyn Reporter,
    log: &Log,
    added: Vec<Certificate>,
    removed: Vec<Certificate>,
) -> Result<()> {
    let details = change_report(log, added, removed);
    rep.log_update(
        &log.url,
        "Root certificates changed",
        "roots",
        &get_roots_url(log),
        &details,
    )
    .await
    .context("Failed to report root set change")
}
