// src/ct_log/log_list.rs
use anyhow::{Context, Result};
use std::time::Duration as StdDuration;
use tracing::{debug, info};

use super::log::{Log, mmd_from_secs};
use super::types::{LogInfo, LogListV3};
use crate::interval::Interval;

/// Looks up Log metadata in a v3 CT log list
pub struct LogListFetcher {
    http_client: reqwest::Client,
}

impl LogListFetcher {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http_client })
    }

    /// Fetch and decode the log list at `list_url`
    pub async fn fetch(&self, list_url: &str) -> Result<LogListV3> {
        info!("Fetching CT log list from {}", list_url);

        let response = self
            .http_client
            .get(list_url)
            .send()
            .await
            .context("Failed to fetch CT log list")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch log list: HTTP {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse log list JSON")
    }

    /// Fetch the log list and build a [`Log`] for the entry served at `log_url`
    pub async fn fetch_log(&self, list_url: &str, log_url: &str) -> Result<Log> {
        let list = self.fetch(list_url).await?;
        find_log(&list, log_url)
    }
}

fn normalize(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Build a [`Log`] from the list entry whose URL matches `log_url`, ignoring
/// trailing slashes
pub fn find_log(list: &LogListV3, log_url: &str) -> Result<Log> {
    let info = list
        .operators
        .iter()
        .flat_map(|op| op.logs.iter())
        .find(|l| normalize(&l.url) == normalize(log_url))
        .with_context(|| format!("Log {} not found in log list", log_url))?;

    debug!("Found log list entry: {} ({})", info.description, info.url);
    log_from_info(info, log_url)
}

fn log_from_info(info: &LogInfo, log_url: &str) -> Result<Log> {
    let key = info
        .key
        .as_deref()
        .with_context(|| format!("Log list entry for {} has no key", log_url))?;
    let mmd_secs = info
        .mmd
        .with_context(|| format!("Log list entry for {} has no mmd", log_url))?;
    let mmd = mmd_from_secs(mmd_secs)
        .with_context(|| format!("Invalid mmd for {}", log_url))?;

    let temporal_interval = match &info.temporal_interval {
        Some(ti) => Some(
            Interval::parse_rfc3339(&ti.start_inclusive, &ti.end_exclusive)
                .with_context(|| format!("Invalid temporal interval for {}", log_url))?,
        ),
        None => None,
    };

    Log::new(
        log_url,
        &info.description,
        key,
        mmd,
        temporal_interval,
    )
}
