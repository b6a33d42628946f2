// src/cli.rs
use clap::Parser;

use crate::config::Config;

/// ct-monitor: Certificate Transparency Log monitor
///
/// Periodically queries a single CT Log, checks its responses for
/// misbehaviour and tracks changes to the roots it accepts.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ===== Input & Configuration =====
    /// Path to TOML config file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    // ===== Log =====
    /// Base URL of the Log to monitor
    #[arg(long = "log-url")]
    pub log_url: Option<String>,

    /// Human-readable name of the Log
    #[arg(long = "log-name")]
    pub log_name: Option<String>,

    /// Base64 DER public key of the Log
    #[arg(long = "public-key")]
    pub public_key: Option<String>,

    /// Maximum Merge Delay of the Log in seconds
    #[arg(long = "mmd-secs")]
    pub mmd_secs: Option<u64>,

    /// v3 log list used to look up anything not given for the Log
    #[arg(long = "log-list-url")]
    pub log_list_url: Option<String>,

    // ===== Activities =====
    /// Seconds between get-sth calls (0 disables)
    #[arg(long = "get-sth-period")]
    pub get_sth_period: Option<u64>,

    /// Seconds between get-roots calls (0 disables)
    #[arg(long = "get-roots-period")]
    pub get_roots_period: Option<u64>,

    /// Seconds between add-chain calls (0 disables)
    #[arg(long = "add-chain-period")]
    pub add_chain_period: Option<u64>,

    /// PEM certificate chain to submit, leaf first
    #[arg(long = "chain-file")]
    pub chain_file: Option<String>,

    // ===== Logging =====
    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        if self.add_chain_period.is_some_and(|p| p > 0)
            && self.chain_file.is_none()
            && self.config.is_none()
        {
            anyhow::bail!("--add-chain-period needs a --chain-file to submit");
        }

        Ok(())
    }

    /// Log level from -v/-q, falling back to `configured`
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            configured
        }
    }

    /// Overwrite config values with any flags given
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(url) = &self.log_url {
            cfg.log.url = Some(url.clone());
        }
        if let Some(name) = &self.log_name {
            cfg.log.name = Some(name.clone());
        }
        if let Some(key) = &self.public_key {
            cfg.log.public_key = Some(key.clone());
        }
        if let Some(mmd) = self.mmd_secs {
            cfg.log.mmd_secs = mmd;
        }
        if let Some(list_url) = &self.log_list_url {
            cfg.log.log_list_url = Some(list_url.clone());
        }
        if let Some(p) = self.get_sth_period {
            cfg.periods.get_sth_secs = p;
        }
        if let Some(p) = self.get_roots_period {
            cfg.periods.get_roots_secs = p;
        }
        if let Some(p) = self.add_chain_period {
            cfg.periods.add_chain_secs = p;
        }
        if let Some(chain) = &self.chain_file {
            cfg.submitter.chain_file = Some(chain.clone());
        }
    }
}
