// src/roots/mod.rs
//! Identity and comparison of root certificate sets.

pub mod analyzer;

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::certificate::Certificate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RootSetIdError {
    #[error("cannot generate an ID for an absent certificate")]
    AbsentCertificate,

    #[error("invalid root set ID {0:?}")]
    Parse(String),
}

/// Content hash of a single root certificate
pub type RootId = [u8; 32];

/// Fingerprint of a set of root certificates, independent of order and
/// duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootSetId(pub [u8; 32]);

impl fmt::Display for RootSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for RootSetId {
    type Err = RootSetIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| RootSetIdError::Parse(s.to_string()))?;
        let id: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RootSetIdError::Parse(s.to_string()))?;
        Ok(Self(id))
    }
}

/// SHA-256 of the certificate's DER. An empty encoding counts as absent.
pub fn generate_cert_id(cert: &Certificate) -> Result<RootId, RootSetIdError> {
    if cert.is_empty() {
        return Err(RootSetIdError::AbsentCertificate);
    }
    Ok(cert.sha256())
}

/// Hash of the sorted, deduplicated certificate IDs
pub fn generate_set_id(roots: &[Certificate]) -> Result<RootSetId, RootSetIdError> {
    let ids = roots
        .iter()
        .map(generate_cert_id)
        .collect::<Result<BTreeSet<_>, _>>()?;

    let mut hasher = Sha256::new();
    for id in &ids {
        hasher.update(id);
    }
    Ok(RootSetId(hasher.finalize().into()))
}

/// Certificates in `new` but not `old`, and in `old` but not `new`, compared
/// by DER.
///
/// Neither input may contain duplicates.
pub fn diff_root_sets(
    old: &[Certificate],
    new: &[Certificate],
) -> (Vec<Certificate>, Vec<Certificate>) {
    let mut old_set: HashMap<&[u8], &Certificate> =
        old.iter().map(|c| (c.raw(), c)).collect();

    let mut added = Vec::new();
    for cert in new {
        if old_set.remove(cert.raw()).is_none() {
            added.push(cert.clone());
        }
    }

    let mut removed: Vec<Certificate> = old_set.into_values().cloned().collect();
    // Keep output independent of hash iteration order.
    removed.sort();
    (added, removed)
}
