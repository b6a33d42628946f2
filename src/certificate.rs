// src/certificate.rs
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

/// Errors produced while decoding certificates
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to parse X.509 certificate: {0}")]
    Parse(String),

    #[error("failed to decode PEM data: {0}")]
    Pem(String),

    #[error("no certificates found in PEM data")]
    EmptyPem,
}

/// A DER-encoded X.509 certificate.
///
/// Equality, ordering and hashing are all defined over the raw DER bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Certificate {
    raw: Vec<u8>,
}

impl Certificate {
    /// Wrap DER bytes without checking that they parse
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    /// Wrap DER bytes, failing if they are not a valid X.509 certificate
    pub fn parse(raw: Vec<u8>) -> Result<Self, CertificateError> {
        X509Certificate::from_der(&raw).map_err(|e| CertificateError::Parse(e.to_string()))?;
        Ok(Self { raw })
    }

    /// Decode every CERTIFICATE block in a PEM bundle, in order
    pub fn from_pem_chain(data: &[u8]) -> Result<Vec<Self>, CertificateError> {
        let mut certs = Vec::new();
        for pem in Pem::iter_from_buffer(data) {
            let pem = pem.map_err(|e| CertificateError::Pem(e.to_string()))?;
            if pem.label != "CERTIFICATE" {
                continue;
            }
            certs.push(Self::parse(pem.contents)?);
        }

        if certs.is_empty() {
            return Err(CertificateError::EmptyPem);
        }
        Ok(certs)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// SHA-256 of the DER encoding
    pub fn sha256(&self) -> [u8; 32] {
        Sha256::digest(&self.raw).into()
    }

    /// Subject distinguished name, or a placeholder if the DER does not parse
    pub fn subject(&self) -> String {
        match X509Certificate::from_der(&self.raw) {
            Ok((_, cert)) => cert.subject().to_string(),
            Err(_) => "<unparseable certificate>".to_string(),
        }
    }

    /// The certificate's NotAfter time
    pub fn not_after(&self) -> Result<DateTime<Utc>, CertificateError> {
        let (_, cert) =
            X509Certificate::from_der(&self.raw).map_err(|e| CertificateError::Parse(e.to_string()))?;
        DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| CertificateError::Parse("NotAfter out of range".to_string()))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({})", hex::encode(self.sha256()))
    }
}
