// src/ct_log/types.rs
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::signature::DigitallySigned;

/// The only SCT and STH version defined by RFC 6962
pub const V1: u8 = 0;

/// Identifier of a Log: SHA-256 of its DER-encoded public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogId(pub [u8; 32]);

impl LogId {
    pub fn from_spki(spki_der: &[u8]) -> Self {
        Self(Sha256::digest(spki_der).into())
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64.encode(self.0))
    }
}

/// A decoded Signed Tree Head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTreeHead {
    pub version: u8,
    pub tree_size: u64,
    /// Milliseconds since the epoch
    pub timestamp: u64,
    pub sha256_root_hash: [u8; 32],
    pub tree_head_signature: DigitallySigned,
}

/// A decoded Signed Certificate Timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificateTimestamp {
    pub sct_version: u8,
    pub log_id: LogId,
    /// Milliseconds since the epoch
    pub timestamp: u64,
    pub extensions: Vec<u8>,
    pub signature: DigitallySigned,
}

impl fmt::Display for SignedCertificateTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{version={} log_id={} timestamp={} extensions={} signature={}}}",
            self.sct_version,
            self.log_id,
            self.timestamp,
            hex::encode(&self.extensions),
            BASE64.encode(self.signature.to_bytes())
        )
    }
}

/// Decoded get-proof-by-hash response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub leaf_index: u64,
    pub audit_path: Vec<Vec<u8>>,
}

/// Response from a Log's get-sth endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSthResponse {
    pub tree_size: u64,
    pub timestamp: u64,
    pub sha256_root_hash: String,
    pub tree_head_signature: String,
}

impl GetSthResponse {
    pub fn to_signed_tree_head(&self) -> Result<SignedTreeHead, String> {
        let root_hash = BASE64
            .decode(&self.sha256_root_hash)
            .map_err(|e| format!("invalid base64 in sha256_root_hash: {}", e))?;
        let sha256_root_hash: [u8; 32] = root_hash
            .as_slice()
            .try_into()
            .map_err(|_| format!("sha256_root_hash is {} bytes, want 32", root_hash.len()))?;

        let sig = BASE64
            .decode(&self.tree_head_signature)
            .map_err(|e| format!("invalid base64 in tree_head_signature: {}", e))?;
        let tree_head_signature = DigitallySigned::parse(&sig).map_err(|e| e.to_string())?;

        Ok(SignedTreeHead {
            version: V1,
            tree_size: self.tree_size,
            timestamp: self.timestamp,
            sha256_root_hash,
            tree_head_signature,
        })
    }
}

/// Response from a Log's get-roots endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRootsResponse {
    pub certificates: Vec<String>,
}

/// Request body for add-chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddChainRequest {
    pub chain: Vec<String>,
}

/// Response from a Log's add-chain endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddChainResponse {
    pub sct_version: u8,
    pub id: String,
    pub timestamp: u64,
    #[serde(default)]
    pub extensions: String,
    pub signature: String,
}

impl AddChainResponse {
    pub fn to_signed_certificate_timestamp(&self) -> Result<SignedCertificateTimestamp, String> {
        let id = BASE64
            .decode(&self.id)
            .map_err(|e| format!("invalid base64 in id: {}", e))?;
        let id: [u8; 32] = id
            .as_slice()
            .try_into()
            .map_err(|_| format!("id is {} bytes, want 32", id.len()))?;

        let extensions = BASE64
            .decode(&self.extensions)
            .map_err(|e| format!("invalid base64 in extensions: {}", e))?;

        let sig = BASE64
            .decode(&self.signature)
            .map_err(|e| format!("invalid base64 in signature: {}", e))?;
        let signature = DigitallySigned::parse(&sig).map_err(|e| e.to_string())?;

        Ok(SignedCertificateTimestamp {
            sct_version: self.sct_version,
            log_id: LogId(id),
            timestamp: self.timestamp,
            extensions,
            signature,
        })
    }
}

/// Response from a Log's get-proof-by-hash endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProofByHashResponse {
    pub leaf_index: u64,
    pub audit_path: Vec<String>,
}

impl GetProofByHashResponse {
    pub fn to_inclusion_proof(&self) -> Result<InclusionProof, String> {
        let audit_path = self
            .audit_path
            .iter()
            .enumerate()
            .map(|(i, node)| {
                BASE64
                    .decode(node)
                    .map_err(|e| format!("audit_path[{}] is invalid base64: {}", i, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InclusionProof {
            leaf_index: self.leaf_index,
            audit_path,
        })
    }
}

/// Google's CT log list V3 format
#[derive(Debug, Serialize, Deserialize)]
pub struct LogListV3 {
    pub operators: Vec<Operator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    #[serde(default)]
    pub logs: Vec<LogInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogInfo {
    #[serde(default)]
    pub description: String,
    pub log_id: Option<String>,
    pub key: Option<String>,
    #[serde(default)]
    pub url: String,
    /// Maximum Merge Delay in seconds
    pub mmd: Option<u64>,
    pub temporal_interval: Option<TemporalInterval>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalInterval {
    pub start_inclusive: String,
    pub end_exclusive: String,
}
