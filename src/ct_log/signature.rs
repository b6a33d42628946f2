// src/ct_log/signature.rs
//! RFC 6962 signature handling: `DigitallySigned` structs and verification of
//! STH and SCT signatures against a Log's public key.

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use thiserror::Error;

use super::types::{SignedCertificateTimestamp, SignedTreeHead};
use crate::certificate::Certificate;

/// TLS HashAlgorithm value for SHA-256
pub const HASH_SHA256: u8 = 4;
/// TLS SignatureAlgorithm value for ECDSA
pub const SIGNATURE_ECDSA: u8 = 3;

const SIGNATURE_TYPE_CERTIFICATE_TIMESTAMP: u8 = 0;
const SIGNATURE_TYPE_TREE_HASH: u8 = 1;
const ENTRY_TYPE_X509: u16 = 0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed DigitallySigned struct: {0}")]
    Malformed(String),

    #[error("unsupported signature algorithm (hash={hash}, signature={signature})")]
    UnsupportedAlgorithm { hash: u8, signature: u8 },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("signature is not a valid DER-encoded ECDSA signature: {0}")]
    InvalidEncoding(String),

    #[error("signature does not match signed data")]
    Mismatch,

    #[error("no certificates in chain")]
    EmptyChain,

    #[error("leaf certificate too large to sign over ({0} bytes)")]
    LeafTooLarge(usize),

    #[error("extensions too large to sign over ({0} bytes)")]
    ExtensionsTooLarge(usize),
}

/// The TLS `DigitallySigned` structure used for STH and SCT signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    pub hash_algorithm: u8,
    pub signature_algorithm: u8,
    pub signature: Vec<u8>,
}

impl DigitallySigned {
    /// Decode from the TLS wire form: hash alg, signature alg, u16 length, bytes
    pub fn parse(data: &[u8]) -> Result<Self, SignatureError> {
        if data.len() < 4 {
            return Err(SignatureError::Malformed(format!(
                "need at least 4 bytes, got {}",
                data.len()
            )));
        }
        let len = u16::from_be_bytes([data[2], data[3]]) as usize;
        let signature = &data[4..];
        if signature.len() != len {
            return Err(SignatureError::Malformed(format!(
                "length prefix says {} bytes but {} follow",
                len,
                signature.len()
            )));
        }

        Ok(Self {
            hash_algorithm: data[0],
            signature_algorithm: data[1],
            signature: signature.to_vec(),
        })
    }

    /// Encode to the TLS wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.signature.len());
        out.push(self.hash_algorithm);
        out.push(self.signature_algorithm);
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }
}

/// Verifies signatures made by a single Log.
///
/// Only ECDSA over P-256 with SHA-256 is supported.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    /// Create new verifier from a DER-encoded SubjectPublicKeyInfo
    pub fn new(spki_der: &[u8]) -> Result<Self, SignatureError> {
        let key = VerifyingKey::from_public_key_der(spki_der)
            .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Check `ds` is a valid signature over `data`
    pub fn verify(&self, data: &[u8], ds: &DigitallySigned) -> Result<(), SignatureError> {
        if ds.hash_algorithm != HASH_SHA256 || ds.signature_algorithm != SIGNATURE_ECDSA {
            return Err(SignatureError::UnsupportedAlgorithm {
                hash: ds.hash_algorithm,
                signature: ds.signature_algorithm,
            });
        }
        let sig = Signature::from_der(&ds.signature)
            .map_err(|e| SignatureError::InvalidEncoding(e.to_string()))?;
        self.key
            .verify(data, &sig)
            .map_err(|_| SignatureError::Mismatch)
    }

    pub fn verify_sth(&self, sth: &SignedTreeHead) -> Result<(), SignatureError> {
        self.verify(&sth_signed_data(sth), &sth.tree_head_signature)
    }

    /// Verify an SCT issued for an X.509 chain; the leaf is `chain[0]`
    pub fn verify_sct(
        &self,
        chain: &[Certificate],
        sct: &SignedCertificateTimestamp,
    ) -> Result<(), SignatureError> {
        let leaf = chain.first().ok_or(SignatureError::EmptyChain)?;
        let data = sct_signed_data(leaf.raw(), sct)?;
        self.verify(&data, &sct.signature)
    }
}

/// Bytes covered by an STH signature
pub fn sth_signed_data(sth: &SignedTreeHead) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + 8 + 8 + 32);
    data.push(sth.version);
    data.push(SIGNATURE_TYPE_TREE_HASH);
    data.extend_from_slice(&sth.timestamp.to_be_bytes());
    data.extend_from_slice(&sth.tree_size.to_be_bytes());
    data.extend_from_slice(&sth.sha256_root_hash);
    data
}

/// Bytes covered by the signature of an SCT for an X.509 leaf certificate
pub fn sct_signed_data(
    leaf_der: &[u8],
    sct: &SignedCertificateTimestamp,
) -> Result<Vec<u8>, SignatureError> {
    if leaf_der.len() >= 1 << 24 {
        return Err(SignatureError::LeafTooLarge(leaf_der.len()));
    }
    if sct.extensions.len() > u16::MAX as usize {
        return Err(SignatureError::ExtensionsTooLarge(sct.extensions.len()));
    }

    let mut data = Vec::with_capacity(2 + 8 + 2 + 3 + leaf_der.len() + 2 + sct.extensions.len());
    data.push(sct.sct_version);
    data.push(SIGNATURE_TYPE_CERTIFICATE_TIMESTAMP);
    data.extend_from_slice(&sct.timestamp.to_be_bytes());
    data.extend_from_slice(&ENTRY_TYPE_X509.to_be_bytes());
    data.extend_from_slice(&(leaf_der.len() as u32).to_be_bytes()[1..]);
    data.extend_from_slice(leaf_der);
    data.extend_from_slice(&(sct.extensions.len() as u16).to_be_bytes());
    data.extend_from_slice(&sct.extensions);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::testdata::{LEAF_PEM, load};
    use crate::ct_log::testdata;

    #[test]
    fn test_digitally_signed_parse() {
        let ds = DigitallySigned::parse(&[4, 3, 0, 2, 0xaa, 0xbb]).unwrap();
        assert_eq!(ds.hash_algorithm, HASH_SHA256);
        assert_eq!(ds.signature_algorithm, SIGNATURE_ECDSA);
        assert_eq!(ds.signature, vec![0xaa, 0xbb]);
        assert_eq!(ds.to_bytes(), vec![4, 3, 0, 2, 0xaa, 0xbb]);
    }

    #[test]
    fn test_digitally_signed_parse_errors() {
        assert!(DigitallySigned::parse(&[4, 3, 0]).is_err());
        assert!(DigitallySigned::parse(&[4, 3, 0, 3, 0xaa]).is_err());
        assert!(DigitallySigned::parse(&[4, 3, 0, 1, 0xaa, 0xbb]).is_err());
    }

    #[test]
    fn test_verify_sth() {
        let verifier = SignatureVerifier::new(&testdata::pilot_key()).unwrap();
        let sth = testdata::pilot_sth();
        assert_eq!(verifier.verify_sth(&sth), Ok(()));

        let mut tampered = sth.clone();
        tampered.tree_size = 0;
        assert_eq!(verifier.verify_sth(&tampered), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_verify_sct() {
        let verifier = SignatureVerifier::new(&testdata::sct_log_key()).unwrap();
        let chain = vec![load(LEAF_PEM)];
        let sct = testdata::valid_sct();
        assert_eq!(verifier.verify_sct(&chain, &sct), Ok(()));

        let mut tampered = sct.clone();
        tampered.timestamp += 1;
        assert_eq!(
            verifier.verify_sct(&chain, &tampered),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(verifier.verify_sct(&[], &sct), Err(SignatureError::EmptyChain));
    }

    #[test]
    fn test_verify_wrong_key() {
        let verifier = SignatureVerifier::new(&testdata::sct_log_key()).unwrap();
        assert_eq!(
            verifier.verify_sth(&testdata::pilot_sth()),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let verifier = SignatureVerifier::new(&testdata::pilot_key()).unwrap();
        let mut sth = testdata::pilot_sth();
        sth.tree_head_signature.signature_algorithm = 1;
        assert_eq!(
            verifier.verify_sth(&sth),
            Err(SignatureError::UnsupportedAlgorithm { hash: 4, signature: 1 })
        );
    }

    #[test]
    fn test_invalid_public_key() {
        assert!(matches!(
            SignatureVerifier::new(b"not a key"),
            Err(SignatureError::InvalidPublicKey(_))
        ));
    }
}
