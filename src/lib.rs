// src/lib.rs
// Library interface for ct-monitor
pub mod apicall;
pub mod cert_submitter;
pub mod certificate;
pub mod cli;
pub mod collector;
pub mod config;
pub mod ct_log;
pub mod incident;
pub mod interval;
pub mod metrics;
pub mod roots;
pub mod roots_getter;
pub mod schedule;
pub mod sth_getter;
pub mod storage;
pub mod verification;
