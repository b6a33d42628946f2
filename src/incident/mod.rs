// src/incident/mod.rs
//! Incident reporting: Log misbehaviour ("violations") and noteworthy but
//! allowed changes ("updates").

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use crate::ct_log::client::build_url;
use crate::ct_log::{Endpoint, Log};
use crate::metrics;
use crate::verification::{Classification, VerificationError};

pub mod postgres;
pub mod webhook;

pub use postgres::PostgresReporter;
pub use webhook::WebhookReporter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub base_url: String,
    pub summary: String,
    pub category: String,
    pub is_violation: bool,
    pub full_url: String,
    pub details: String,
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, incident: &Incident) -> Result<()>;

    /// Report something noteworthy that is not Log misbehaviour
    async fn log_update(
        &self,
        base_url: &str,
        summary: &str,
        category: &str,
        full_url: &str,
        details: &str,
    ) -> Result<()> {
        self.report(&Incident {
            base_url: base_url.to_string(),
            summary: summary.to_string(),
            category: category.to_string(),
            is_violation: false,
            full_url: full_url.to_string(),
            details: details.to_string(),
        })
        .await
    }

    /// Report Log misbehaviour
    async fn log_violation(
        &self,
        base_url: &str,
        summary: &str,
        category: &str,
        full_url: &str,
        details: &str,
    ) -> Result<()> {
        self.report(&Incident {
            base_url: base_url.to_string(),
            summary: summary.to_string(),
            category: category.to_string(),
            is_violation: true,
            full_url: full_url.to_string(),
            details: details.to_string(),
        })
        .await
    }
}

/// Writes incidents to the log output
#[derive(Debug, Default, Clone)]
pub struct LogReporter;

#[async_trait]
impl Reporter for LogReporter {
    async fn report(&self, incident: &Incident) -> Result<()> {
        if incident.is_violation {
            error!(
                "{}: VIOLATION: {} (category={} url={})\n  {}",
                incident.base_url,
                incident.summary,
                incident.category,
                incident.full_url,
                incident.details
            );
        } else {
            warn!(
                "{}: UPDATE: {} (category={} url={})\n  {}",
                incident.base_url,
                incident.summary,
                incident.category,
                incident.full_url,
                incident.details
            );
        }
        Ok(())
    }
}

/// Keeps incidents in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    incidents: Arc<Mutex<Vec<Incident>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, incident: &Incident) -> Result<()> {
        self.incidents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(incident.clone());
        Ok(())
    }
}

/// Sends each incident to every wrapped reporter
pub struct FanOutReporter {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl FanOutReporter {
    pub fn new(reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

#[async_trait]
impl Reporter for FanOutReporter {
    /// Every reporter is tried; the first failure is returned
    async fn report(&self, incident: &Incident) -> Result<()> {
        let mut first_err = None;
        for r in &self.reporters {
            if let Err(e) = r.report(incident).await {
                warn!("{}: failed to report incident: {:#}", incident.base_url, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Report the problems found in one Log response.
///
/// Misbehaviour is reported as a single violation and unexpected behaviour as
/// a single update, each listing its findings in order.
pub async fn report_verification_errors(
    rep: &dyn Reporter,
    log: &Log,
    endpoint: Endpoint,
    subject: &str,
    errs: &[VerificationError],
) -> Result<()> {
    for e in errs {
        let class = match e.classification() {
            Classification::Misbehaviour => "misbehaviour",
            Classification::Unexpected => "unexpected",
        };
        metrics::record_verification_error(&log.name, e.kind(), class);
    }

    let full_url = build_url(&log.url, endpoint.path(), &Default::default());
    for (class, is_violation) in [
        (Classification::Misbehaviour, true),
        (Classification::Unexpected, false),
    ] {
        let found: Vec<&VerificationError> =
            errs.iter().filter(|e| e.classification() == class).collect();
        if found.is_empty() {
            continue;
        }

        let noun = if found.len() == 1 { "problem" } else { "problems" };
        let summary = format!("{} {} in {} response", found.len(), noun, endpoint);
        let mut details = format!("{}:", subject);
        for e in &found {
            details.push_str(&format!("\n\t{}: {}", e.kind(), e));
        }

        let incident = Incident {
            base_url: log.url.clone(),
            summary,
            category: endpoint.as_str().to_string(),
            is_violation,
            full_url: full_url.clone(),
            details,
        };
        rep.report(&incident).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ct_log::SignatureError;

    struct FailingReporter;

    #[async_trait]
    impl Reporter for FailingReporter {
        async fn report(&self, _incident: &Incident) -> Result<()> {
            anyhow::bail!("unavailable")
        }
    }

    #[tokio::test]
    async fn test_log_update_and_violation() {
        let rec = RecordingReporter::new();
        rec.log_update("https://ct.example.com", "Roots changed", "roots", "https://ct.example.com/ct/v1/get-roots", "details")
            .await
            .unwrap();
        rec.log_violation("https://ct.example.com", "Bad STH", "sth", "https://ct.example.com/ct/v1/get-sth", "")
            .await
            .unwrap();

        let got = rec.incidents();
        assert_eq!(got.len(), 2);
        assert!(!got[0].is_violation);
        assert_eq!(got[0].summary, "Roots changed");
        assert_eq!(got[0].category, "roots");
        assert!(got[1].is_violation);
        assert_eq!(got[1].full_url, "https://ct.example.com/ct/v1/get-sth");
    }

    #[tokio::test]
    async fn test_fan_out_reaches_all_reporters() {
        let a = RecordingReporter::new();
        let b = RecordingReporter::new();
        let fan = FanOutReporter::new(vec![
            Arc::new(a.clone()),
            Arc::new(FailingReporter),
            Arc::new(b.clone()),
        ]);

        let err = fan
            .log_update("https://ct.example.com", "s", "c", "u", "d")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unavailable"));
        assert_eq!(a.incidents().len(), 1);
        assert_eq!(b.incidents().len(), 1);
    }

    #[tokio::test]
    async fn test_report_verification_errors() {
        let log = Log::new(
            "https://ct.example.com/",
            "example",
            crate::ct_log::testdata::PILOT_KEY_B64,
            chrono::Duration::hours(24),
            None,
        )
        .unwrap();
        let errs = vec![
            VerificationError::SctVersion { got: 1, want: 0 },
            VerificationError::SignatureVerification(SignatureError::Mismatch),
            VerificationError::SctExtensions(vec![1]),
        ];
        let rec = RecordingReporter::new();
        report_verification_errors(&rec, &log, Endpoint::AddChain, "SCT", &errs)
            .await
            .unwrap();

        let got = rec.incidents();
        assert_eq!(got.len(), 2);
        assert!(got[0].is_violation);
        assert_eq!(got[0].summary, "1 problem in add-chain response");
        assert_eq!(got[0].category, "add-chain");
        assert_eq!(got[0].full_url, "https://ct.example.com/ct/v1/add-chain");
        assert_eq!(
            got[0].details,
            "SCT:\n\tsignature_verification: signature verification failed: signature does not match signed data"
        );
        assert!(!got[1].is_violation);
        assert!(got[1].details.contains("\tsct_version: version is 1, want 0"));
        assert!(got[1].details.contains("\tsct_extensions: unexpected extensions data: 01"));
    }

    #[tokio::test]
    async fn test_report_verification_errors_none() {
        let log = Log::new(
            "https://ct.example.com/",
            "example",
            crate::ct_log::testdata::PILOT_KEY_B64,
            chrono::Duration::hours(24),
            None,
        )
        .unwrap();
        let rec = RecordingReporter::new();
        report_verification_errors(&rec, &log, Endpoint::GetSth, "STH", &[])
            .await
            .unwrap();
        assert!(rec.incidents().is_empty());
    }

    #[tokio::test]
    async fn test_log_reporter() {
        assert!(LogReporter.log_violation("u", "s", "c", "f", "d").await.is_ok());
    }
}
