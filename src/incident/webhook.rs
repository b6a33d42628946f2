// src/incident/webhook.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;

use super::{Incident, Reporter};
use crate::config::WebhookConfig;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-CT-Monitor-Signature";

/// Posts incidents as JSON to a webhook
#[derive(Clone)]
pub struct WebhookReporter {
    client: Client,
    cfg: WebhookConfig,
}

#[derive(Serialize)]
pub struct IncidentPayload<'a> {
    pub kind: &'static str,
    #[serde(flatten)]
    pub incident: &'a Incident,
}

impl WebhookReporter {
    pub fn new(cfg: WebhookConfig) -> Self {
        let client = Client::new();
        Self { client, cfg }
    }
}

/// Hex HMAC-SHA256 of `body`
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("HMAC init error: {:?}", e))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl Reporter for WebhookReporter {
    async fn report(&self, incident: &Incident) -> Result<()> {
        let payload = IncidentPayload {
            kind: if incident.is_violation { "violation" } else { "update" },
            incident,
        };
        let body = serde_json::to_vec(&payload)?;

        let timeout_secs = self.cfg.timeout_secs.unwrap_or(5);
        let mut req = self
            .client
            .post(&self.cfg.url)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .body(body.clone())
            .header("Content-Type", "application/json");

        if let Some(secret) = &self.cfg.secret {
            req = req.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }

        let resp = req.send().await.context("Failed to send incident webhook")?;
        resp.error_for_status()
            .context("Incident webhook returned an error status")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn incident() -> Incident {
        Incident {
            base_url: "https://ct.example.com".to_string(),
            summary: "Root certificates changed".to_string(),
            category: "roots".to_string(),
            is_violation: false,
            full_url: "https://ct.example.com/ct/v1/get-roots".to_string(),
            details: "The root certificates accepted by example have changed.\n".to_string(),
        }
    }

    fn config(url: String, secret: Option<&str>, timeout_secs: u64) -> WebhookConfig {
        WebhookConfig {
            url,
            secret: secret.map(|s| s.to_string()),
            timeout_secs: Some(timeout_secs),
        }
    }

    #[tokio::test]
    async fn test_report_payload() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(serde_json::json!({
                "kind": "update",
                "base_url": "https://ct.example.com",
                "summary": "Root certificates changed",
                "category": "roots",
                "is_violation": false,
                "full_url": "https://ct.example.com/ct/v1/get-roots",
                "details": "The root certificates accepted by example have changed.\n"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let reporter = WebhookReporter::new(config(mock_server.uri(), None, 5));
        reporter.report(&incident()).await.unwrap();
    }

    #[tokio::test]
    async fn test_report_signed() {
        let mock_server = MockServer::start().await;
        let secret = "test_secret_key";

        let body = serde_json::to_vec(&IncidentPayload {
            kind: "update",
            incident: &incident(),
        })
        .unwrap();
        let expected_sig = sign(secret, &body).unwrap();
        assert_eq!(expected_sig.len(), 64);

        Mock::given(method("POST"))
            .and(header_exists(SIGNATURE_HEADER))
            .and(header(SIGNATURE_HEADER, expected_sig.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let reporter = WebhookReporter::new(config(mock_server.uri(), Some(secret), 5));
        reporter.report(&incident()).await.unwrap();
    }

    #[tokio::test]
    async fn test_report_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let reporter = WebhookReporter::new(config(mock_server.uri(), None, 5));
        assert!(reporter.report(&incident()).await.is_err());
    }

    #[tokio::test]
    async fn test_report_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(10)))
            .mount(&mock_server)
            .await;

        let reporter = WebhookReporter::new(config(mock_server.uri(), None, 1));
        assert!(reporter.report(&incident()).await.is_err());
    }
}
