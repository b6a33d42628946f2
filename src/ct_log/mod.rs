// src/ct_log/mod.rs
pub mod client;
pub mod log;
pub mod log_list;
pub mod signature;
pub mod types;

#[cfg(test)]
pub(crate) mod testdata;

pub use client::{ClientError, Endpoint, HttpData, LogClient, LogResponse, Timing};
pub use log::{Log, mmd_from_secs};
pub use log_list::LogListFetcher;
pub use signature::{DigitallySigned, SignatureError, SignatureVerifier};
pub use types::{InclusionProof, LogId, SignedCertificateTimestamp, SignedTreeHead};
