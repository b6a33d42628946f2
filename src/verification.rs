// src/verification.rs
//! Checks applied to what a Log returns.
//!
//! Each check function returns every problem it finds, in a fixed order,
//! rather than stopping at the first.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::certificate::Certificate;
use crate::ct_log::types::V1;
use crate::ct_log::{Log, LogId, SignatureError, SignatureVerifier, SignedCertificateTimestamp, SignedTreeHead};

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The Log broke an RFC 6962 requirement
    Misbehaviour,
    /// Allowed by RFC 6962, but not what current Logs do
    Unexpected,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("signature verification failed: {0}")]
    SignatureVerification(#[source] SignatureError),

    #[error("STH timestamp {sth_time} is more than the MMD ({mmd}) before it was received at {received_at}")]
    OldTimestamp {
        sth_time: DateTime<Utc>,
        received_at: DateTime<Utc>,
        mmd: Duration,
    },

    #[error("version is {got}, want {want}")]
    SctVersion { got: u8, want: u8 },

    #[error("Log ID is {got}, want {want}")]
    SctLogId { got: LogId, want: LogId },

    #[error("unexpected extensions data: {}", hex::encode(.0))]
    SctExtensions(Vec<u8>),

    #[error("SCT timestamp {sct_time} is after it was received at {received_at}")]
    SctFromFuture {
        sct_time: DateTime<Utc>,
        received_at: DateTime<Utc>,
    },
}

impl VerificationError {
    /// Stable label for metrics and storage
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::SignatureVerification(_) => "signature_verification",
            VerificationError::OldTimestamp { .. } => "old_timestamp",
            VerificationError::SctVersion { .. } => "sct_version",
            VerificationError::SctLogId { .. } => "sct_log_id",
            VerificationError::SctExtensions(_) => "sct_extensions",
            VerificationError::SctFromFuture { .. } => "sct_from_future",
        }
    }

    pub fn classification(&self) -> Classification {
        match self {
            // RFC 6962 s4.1 says v1 clients must not expect version v1, and
            // s3.2 leaves room for future extensions. Both are flagged but
            // neither is a policy violation.
            VerificationError::SctVersion { .. } | VerificationError::SctExtensions(_) => {
                Classification::Unexpected
            }
            _ => Classification::Misbehaviour,
        }
    }
}

/// Convert a CT millisecond timestamp to an instant. Timestamps beyond what
/// `DateTime` can hold map to `DateTime::MAX_UTC`.
pub fn ms_to_time(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Check an STH received from `log` at `received_at`.
///
/// Findings are ordered: signature, then freshness. An STH exactly one MMD
/// old is still fresh.
pub fn check_sth(
    sth: &SignedTreeHead,
    received_at: DateTime<Utc>,
    sv: &SignatureVerifier,
    log: &Log,
) -> Vec<VerificationError> {
    let mut errs = Vec::new();

    if let Err(e) = sv.verify_sth(sth) {
        errs.push(VerificationError::SignatureVerification(e));
    }

    let sth_time = ms_to_time(sth.timestamp);
    // No representable cutoff means nothing can be older than it.
    let stale = received_at
        .checked_sub_signed(log.mmd)
        .is_some_and(|cutoff| sth_time < cutoff);
    if stale {
        errs.push(VerificationError::OldTimestamp {
            sth_time,
            received_at,
            mmd: log.mmd,
        });
    }

    // TODO: compare the root hash with earlier STHs of the same tree size,
    // and with the empty-tree hash when tree_size is 0.

    errs
}

/// Check an SCT returned by `log` for `chain` at `received_at`.
///
/// Findings are ordered: version, Log ID, extensions, signature, timestamp.
pub fn check_sct(
    sct: &SignedCertificateTimestamp,
    chain: &[Certificate],
    received_at: DateTime<Utc>,
    sv: &SignatureVerifier,
    log: &Log,
) -> Vec<VerificationError> {
    let mut errs = Vec::new();

    if sct.sct_version != V1 {
        errs.push(VerificationError::SctVersion {
            got: sct.sct_version,
            want: V1,
        });
    }

    // The Log ID is not covered by the signature.
    if sct.log_id != log.log_id {
        errs.push(VerificationError::SctLogId {
            got: sct.log_id,
            want: log.log_id,
        });
    }

    if !sct.extensions.is_empty() {
        errs.push(VerificationError::SctExtensions(sct.extensions.clone()));
    }

    if let Err(e) = sv.verify_sct(chain, sct) {
        errs.push(VerificationError::SignatureVerification(e));
    }

    let sct_time = ms_to_time(sct.timestamp);
    if sct_time > received_at {
        errs.push(VerificationError::SctFromFuture {
            sct_time,
            received_at,
        });
    }

    errs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::testdata::{LEAF_PEM, load};
    use crate::ct_log::testdata;
    use chrono::TimeZone;

    fn pilot() -> (Log, SignatureVerifier) {
        let log = Log::new(
            "https://ct.googleapis.com/pilot",
            "pilot",
            testdata::PILOT_KEY_B64,
            Duration::hours(24),
            None,
        )
        .unwrap();
        let sv = SignatureVerifier::new(&log.public_key).unwrap();
        (log, sv)
    }

    fn sct_log() -> (Log, SignatureVerifier) {
        let log = Log::new(
            "https://ct.example.com/",
            "example",
            testdata::SCT_LOG_KEY_B64,
            Duration::hours(24),
            None,
        )
        .unwrap();
        let sv = SignatureVerifier::new(&log.public_key).unwrap();
        (log, sv)
    }

    fn kinds(errs: &[VerificationError]) -> Vec<&'static str> {
        errs.iter().map(|e| e.kind()).collect()
    }

    #[test]
    fn test_check_sth_valid() {
        let (log, sv) = pilot();
        let received_at = Utc.with_ymd_and_hms(2019, 4, 10, 15, 0, 0).unwrap();
        assert_eq!(check_sth(&testdata::pilot_sth(), received_at, &sv, &log), vec![]);
    }

    #[test]
    fn test_check_sth_mmd_boundary() {
        let (log, sv) = pilot();
        let sth = testdata::pilot_sth();
        let sth_time = ms_to_time(sth.timestamp);

        let at_mmd = sth_time + Duration::hours(24);
        assert_eq!(check_sth(&sth, at_mmd, &sv, &log), vec![]);

        let past_mmd = at_mmd + Duration::nanoseconds(1);
        assert_eq!(
            check_sth(&sth, past_mmd, &sv, &log),
            vec![VerificationError::OldTimestamp {
                sth_time,
                received_at: past_mmd,
                mmd: Duration::hours(24),
            }]
        );
    }

    #[test]
    fn test_check_sth_stale_by_a_day() {
        let (log, sv) = pilot();
        let received_at = ms_to_time(testdata::PILOT_STH_TIMESTAMP) + Duration::hours(25);
        let errs = check_sth(&testdata::pilot_sth(), received_at, &sv, &log);
        assert_eq!(kinds(&errs), vec!["old_timestamp"]);
        assert_eq!(errs[0].classification(), Classification::Misbehaviour);
    }

    #[test]
    fn test_check_sth_tampered() {
        let (log, sv) = pilot();
        let received_at = Utc.with_ymd_and_hms(2019, 4, 10, 15, 0, 0).unwrap();
        let mut sth = testdata::pilot_sth();
        sth.tree_size = 0;
        assert_eq!(
            check_sth(&sth, received_at, &sv, &log),
            vec![VerificationError::SignatureVerification(SignatureError::Mismatch)]
        );
    }

    #[test]
    fn test_check_sth_tampered_and_stale() {
        let (log, sv) = pilot();
        let received_at = Utc.with_ymd_and_hms(2019, 4, 20, 0, 0, 0).unwrap();
        let mut sth = testdata::pilot_sth();
        sth.sha256_root_hash[0] ^= 0xff;
        assert_eq!(
            kinds(&check_sth(&sth, received_at, &sv, &log)),
            vec!["signature_verification", "old_timestamp"]
        );
    }

    #[test]
    fn test_check_sth_huge_mmd() {
        let (mut log, sv) = pilot();
        log.mmd = Duration::seconds(9_000_000_000_000);
        let received_at = Utc.with_ymd_and_hms(2019, 4, 10, 15, 0, 0).unwrap();
        assert_eq!(check_sth(&testdata::pilot_sth(), received_at, &sv, &log), vec![]);
    }

    #[test]
    fn test_ms_to_time_out_of_range() {
        assert_eq!(ms_to_time(u64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(ms_to_time(1 << 63), DateTime::<Utc>::MAX_UTC);
        assert_eq!(ms_to_time(i64::MAX as u64), DateTime::<Utc>::MAX_UTC);
        assert_eq!(ms_to_time(0), DateTime::from_timestamp(0, 0).unwrap());
    }

    fn sct_received_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 6, 1, 13, 0, 5).unwrap()
    }

    #[test]
    fn test_check_sct_valid() {
        let (log, sv) = sct_log();
        let chain = vec![load(LEAF_PEM)];
        assert_eq!(
            check_sct(&testdata::valid_sct(), &chain, sct_received_at(), &sv, &log),
            vec![]
        );
    }

    #[test]
    fn test_check_sct_version() {
        let (log, sv) = sct_log();
        let chain = vec![load(LEAF_PEM)];
        let mut sct = testdata::valid_sct();
        sct.sct_version = 1;

        let errs = check_sct(&sct, &chain, sct_received_at(), &sv, &log);
        assert_eq!(
            errs,
            vec![
                VerificationError::SctVersion { got: 1, want: V1 },
                VerificationError::SignatureVerification(SignatureError::Mismatch),
            ]
        );
        assert_eq!(errs[0].classification(), Classification::Unexpected);
    }

    #[test]
    fn test_check_sct_log_id() {
        let (log, sv) = sct_log();
        let chain = vec![load(LEAF_PEM)];
        let mut sct = testdata::valid_sct();
        sct.log_id = LogId([0; 32]);

        let errs = check_sct(&sct, &chain, sct_received_at(), &sv, &log);
        assert_eq!(
            errs,
            vec![VerificationError::SctLogId {
                got: LogId([0; 32]),
                want: log.log_id,
            }]
        );
        assert_eq!(errs[0].classification(), Classification::Misbehaviour);
    }

    #[test]
    fn test_check_sct_extensions() {
        let (log, sv) = sct_log();
        let chain = vec![load(LEAF_PEM)];
        let mut sct = testdata::valid_sct();
        sct.extensions = vec![0x01, 0x02];

        let errs = check_sct(&sct, &chain, sct_received_at(), &sv, &log);
        assert_eq!(
            errs,
            vec![
                VerificationError::SctExtensions(vec![0x01, 0x02]),
                VerificationError::SignatureVerification(SignatureError::Mismatch),
            ]
        );
        assert_eq!(errs[0].classification(), Classification::Unexpected);
    }

    #[test]
    fn test_check_sct_bad_signature() {
        let (log, sv) = sct_log();
        let chain = vec![load(LEAF_PEM)];
        let mut sct = testdata::valid_sct();
        let last = sct.signature.signature.len() - 1;
        sct.signature.signature[last] ^= 0x01;

        assert_eq!(
            kinds(&check_sct(&sct, &chain, sct_received_at(), &sv, &log)),
            vec!["signature_verification"]
        );
    }

    #[test]
    fn test_check_sct_from_future() {
        let (log, sv) = sct_log();
        let chain = vec![load(LEAF_PEM)];
        let sct = testdata::valid_sct();
        let received_at = ms_to_time(sct.timestamp) - Duration::milliseconds(1);

        assert_eq!(
            check_sct(&sct, &chain, received_at, &sv, &log),
            vec![VerificationError::SctFromFuture {
                sct_time: ms_to_time(sct.timestamp),
                received_at,
            }]
        );

        // Received in the same millisecond it was issued.
        assert_eq!(
            check_sct(&sct, &chain, ms_to_time(sct.timestamp), &sv, &log),
            vec![]
        );
    }

    #[test]
    fn test_check_sct_timestamp_out_of_range() {
        let (log, sv) = sct_log();
        let chain = vec![load(LEAF_PEM)];
        for timestamp in [u64::MAX, 1 << 63] {
            let mut sct = testdata::valid_sct();
            sct.timestamp = timestamp;
            assert_eq!(
                check_sct(&sct, &chain, sct_received_at(), &sv, &log),
                vec![
                    VerificationError::SignatureVerification(SignatureError::Mismatch),
                    VerificationError::SctFromFuture {
                        sct_time: DateTime::<Utc>::MAX_UTC,
                        received_at: sct_received_at(),
                    },
                ]
            );
        }
    }

    #[test]
    fn test_check_sct_wrong_key() {
        let (log, sv) = pilot();
        let chain = vec![load(LEAF_PEM)];
        assert_eq!(
            kinds(&check_sct(&testdata::valid_sct(), &chain, sct_received_at(), &sv, &log)),
            vec!["sct_log_id", "signature_verification"]
        );
    }
}
