// src/ct_log/client.rs
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::types::{
    AddChainRequest, AddChainResponse, GetProofByHashResponse, GetRootsResponse, GetSthResponse,
    InclusionProof, SignedCertificateTimestamp, SignedTreeHead,
};
use crate::certificate::Certificate;
use crate::metrics;

const CONTENT_TYPE: &str = "application/json";

pub const GET_STH_PATH: &str = "/ct/v1/get-sth";
pub const GET_ROOTS_PATH: &str = "/ct/v1/get-roots";
pub const ADD_CHAIN_PATH: &str = "/ct/v1/add-chain";
pub const GET_PROOF_BY_HASH_PATH: &str = "/ct/v1/get-proof-by-hash";

/// The CT API endpoints the monitor calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetSth,
    GetRoots,
    AddChain,
    GetProofByHash,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::GetSth => "get-sth",
            Endpoint::GetRoots => "get-roots",
            Endpoint::AddChain => "add-chain",
            Endpoint::GetProofByHash => "get-proof-by-hash",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::GetSth => GET_STH_PATH,
            Endpoint::GetRoots => GET_ROOTS_PATH,
            Endpoint::AddChain => ADD_CHAIN_PATH,
            Endpoint::GetProofByHash => GET_PROOF_BY_HASH_PATH,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures talking to a Log
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{method} {url} failed: {source}")]
    Request {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// No response object despite no transport error. The reqwest client
    /// never produces this; it exists so stored error kinds stay stable.
    #[error("nil response from {url}")]
    NilResponse { url: String },

    #[error("failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("failed to parse JSON {data:?}: {source}")]
    JsonParse {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to convert {from} to {to}: {reason}")]
    ResponseToStruct {
        from: &'static str,
        to: &'static str,
        reason: String,
    },

    #[error("failed to encode request body: {0}")]
    RequestEncode(#[source] serde_json::Error),
}

impl ClientError {
    /// Stable label for metrics and storage
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Request { .. } => "request",
            ClientError::NilResponse { .. } => "nil_response",
            ClientError::BodyRead { .. } => "body_read",
            ClientError::HttpStatus { .. } => "http_status",
            ClientError::JsonParse { .. } => "json_parse",
            ClientError::ResponseToStruct { .. } => "response_to_struct",
            ClientError::RequestEncode(_) => "request_encode",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Raw details of one HTTP exchange
#[derive(Debug, Clone, Default)]
pub struct HttpData {
    pub timing: Timing,
    /// HTTP status code, if a response was received
    pub status: Option<u16>,
    pub body: Vec<u8>,
}

/// Outcome of a typed Log call, plus the HTTP exchange behind it
#[derive(Debug)]
pub struct LogResponse<T> {
    pub result: Result<T, ClientError>,
    pub http_data: HttpData,
}

/// HTTP client for a single CT Log's RFC 6962 API
#[derive(Debug, Clone)]
pub struct LogClient {
    url: String,
    http_client: reqwest::Client,
}

impl LogClient {
    /// Create new client using the given reqwest client
    pub fn new(url: &str, http_client: reqwest::Client) -> Self {
        Self {
            url: url.to_string(),
            http_client,
        }
    }

    /// Create new client with a default reqwest client
    pub fn with_timeout(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(url, http_client))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get(
        &self,
        path: &str,
        params: &BTreeMap<&str, String>,
    ) -> (HttpData, Result<(), ClientError>) {
        let full_url = build_url(&self.url, path, params);
        debug!("GET {}", full_url);
        let start = Utc::now();
        let response = self.http_client.get(&full_url).send().await;
        self.finish("GET", full_url, start, response).await
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> (HttpData, Result<(), ClientError>) {
        let full_url = build_url(&self.url, path, &BTreeMap::new());
        debug!("POST {}", full_url);
        let start = Utc::now();
        let response = self
            .http_client
            .post(&full_url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await;
        self.finish("POST", full_url, start, response).await
    }

    async fn finish(
        &self,
        method: &'static str,
        url: String,
        start: DateTime<Utc>,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> (HttpData, Result<(), ClientError>) {
        let mut http_data = HttpData {
            timing: Timing {
                start,
                end: Utc::now(),
            },
            ..Default::default()
        };

        let response = match response {
            Ok(r) => r,
            Err(source) => {
                return (http_data, Err(ClientError::Request { method, url, source }));
            }
        };

        let status = response.status().as_u16();
        http_data.status = Some(status);

        match response.bytes().await {
            Ok(body) => http_data.body = body.to_vec(),
            Err(source) => return (http_data, Err(ClientError::BodyRead { url, source })),
        }

        if status != 200 {
            return (http_data, Err(ClientError::HttpStatus { status }));
        }
        (http_data, Ok(()))
    }

    async fn get_and_parse<R: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        params: &BTreeMap<&str, String>,
    ) -> (HttpData, Result<R, ClientError>) {
        let (http_data, result) = self.get(endpoint.path(), params).await;
        let parsed = result.and_then(|_| parse_body(&http_data.body));
        (http_data, parsed)
    }

    async fn post_and_parse<R: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        body: Vec<u8>,
    ) -> (HttpData, Result<R, ClientError>) {
        let (http_data, result) = self.post(endpoint.path(), body).await;
        let parsed = result.and_then(|_| parse_body(&http_data.body));
        (http_data, parsed)
    }

    /// Get the Log's latest Signed Tree Head
    /// Endpoint: GET {url}/ct/v1/get-sth
    pub async fn get_sth(&self) -> LogResponse<SignedTreeHead> {
        let (http_data, resp) = self
            .get_and_parse::<GetSthResponse>(Endpoint::GetSth, &BTreeMap::new())
            .await;
        let result = resp.and_then(|r| {
            r.to_signed_tree_head()
                .map_err(|reason| ClientError::ResponseToStruct {
                    from: "GetSthResponse",
                    to: "SignedTreeHead",
                    reason,
                })
        });
        observe(Endpoint::GetSth, &http_data, &result);
        LogResponse { result, http_data }
    }

    /// Get the root certificates the Log accepts
    /// Endpoint: GET {url}/ct/v1/get-roots
    pub async fn get_roots(&self) -> LogResponse<Vec<Certificate>> {
        let (http_data, resp) = self
            .get_and_parse::<serde_json::Value>(Endpoint::GetRoots, &BTreeMap::new())
            .await;
        let result = resp.and_then(parse_roots);
        observe(Endpoint::GetRoots, &http_data, &result);
        LogResponse { result, http_data }
    }

    /// Submit a certificate chain, leaf first
    /// Endpoint: POST {url}/ct/v1/add-chain
    pub async fn add_chain(&self, chain: &[Certificate]) -> LogResponse<SignedCertificateTimestamp> {
        let req = AddChainRequest {
            chain: chain.iter().map(|c| BASE64.encode(c.raw())).collect(),
        };
        let body = match serde_json::to_vec(&req) {
            Ok(b) => b,
            Err(e) => {
                return LogResponse {
                    result: Err(ClientError::RequestEncode(e)),
                    http_data: HttpData::default(),
                };
            }
        };

        let (http_data, resp) = self
            .post_and_parse::<AddChainResponse>(Endpoint::AddChain, body)
            .await;
        let result = resp.and_then(|r| {
            r.to_signed_certificate_timestamp()
                .map_err(|reason| ClientError::ResponseToStruct {
                    from: "AddChainResponse",
                    to: "SignedCertificateTimestamp",
                    reason,
                })
        });
        observe(Endpoint::AddChain, &http_data, &result);
        LogResponse { result, http_data }
    }

    /// Get an inclusion proof for a leaf hash at the given tree size
    /// Endpoint: GET {url}/ct/v1/get-proof-by-hash?hash={hash}&tree_size={size}
    pub async fn get_proof_by_hash(
        &self,
        leaf_hash: &[u8],
        tree_size: u64,
    ) -> LogResponse<InclusionProof> {
        let mut params = BTreeMap::new();
        params.insert("hash", BASE64.encode(leaf_hash));
        params.insert("tree_size", tree_size.to_string());

        let (http_data, resp) = self
            .get_and_parse::<GetProofByHashResponse>(Endpoint::GetProofByHash, &params)
            .await;
        let result = resp.and_then(|r| {
            r.to_inclusion_proof()
                .map_err(|reason| ClientError::ResponseToStruct {
                    from: "GetProofByHashResponse",
                    to: "InclusionProof",
                    reason,
                })
        });
        observe(Endpoint::GetProofByHash, &http_data, &result);
        LogResponse { result, http_data }
    }
}

/// Join a base URL and path with exactly one "/" between them, then append
/// URL-encoded query parameters in key order.
///
/// If either side is empty the other is used unaltered. Trailing slashes are
/// removed before any parameters are added.
pub fn build_url(base_url: &str, path: &str, params: &BTreeMap<&str, String>) -> String {
    let without_params = if !base_url.is_empty() && !path.is_empty() {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    } else {
        format!("{}{}", base_url, path)
    };

    if params.is_empty() {
        return without_params;
    }

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    format!("{}?{}", without_params.trim_end_matches('/'), query)
}

/// Two-stage decode so malformed JSON and well-formed JSON of the wrong shape
/// are reported differently.
fn parse_body<R: DeserializeOwned>(body: &[u8]) -> Result<R, ClientError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|source| ClientError::JsonParse {
            data: String::from_utf8_lossy(body).into_owned(),
            source,
        })?;
    serde_json::from_value(value).map_err(|e| ClientError::ResponseToStruct {
        from: "JSON",
        to: std::any::type_name::<R>(),
        reason: e.to_string(),
    })
}

fn parse_roots(value: serde_json::Value) -> Result<Vec<Certificate>, ClientError> {
    let shape_err = |reason: String| ClientError::ResponseToStruct {
        from: "GetRootsResponse",
        to: "Vec<Certificate>",
        reason,
    };

    if value.get("certificates").is_none_or(|c| c.is_null()) {
        return Err(shape_err(
            "no \"certificates\" field in \"get-roots\" response".to_string(),
        ));
    }
    let resp: GetRootsResponse =
        serde_json::from_value(value).map_err(|e| shape_err(e.to_string()))?;

    resp.certificates
        .iter()
        .enumerate()
        .map(|(i, b64)| {
            let der = BASE64
                .decode(b64)
                .map_err(|e| shape_err(format!("certificates[{}] is invalid: {}", i, e)))?;
            Certificate::parse(der)
                .map_err(|e| shape_err(format!("certificates[{}] is invalid: {}", i, e)))
        })
        .collect()
}

fn observe<T>(endpoint: Endpoint, http_data: &HttpData, result: &Result<T, ClientError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    let elapsed = (http_data.timing.end - http_data.timing.start)
        .to_std()
        .unwrap_or_default();
    metrics::record_api_call(endpoint.as_str(), outcome, elapsed);
}
