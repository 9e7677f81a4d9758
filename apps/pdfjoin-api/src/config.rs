//! Server configuration
//!
//! Every option can come from a flag or an environment variable. A `.env`
//! file is loaded before parsing, so it fills in anything the process
//! environment leaves unset.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pdfjoin_core::{CommandOptions, EncryptionSupport, RangePolicy};

#[derive(Parser, Debug, Clone)]
#[command(name = "pdfjoin-api")]
#[command(about = "HTTP API for merging and splitting PDF files")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory where output files wait for download
    #[arg(long, env = "STAGING_DIR", default_value = "uploads")]
    pub staging_dir: PathBuf,

    /// Seconds a staged file survives without being downloaded
    #[arg(long, env = "STAGING_RETENTION_SECS", default_value_t = 3600)]
    pub retention_secs: u64,

    /// Seconds between staging sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 3600)]
    pub sweep_interval_secs: u64,

    /// Seconds a finished job stays queryable
    #[arg(long, env = "JOB_RETENTION_SECS", default_value_t = 86_400)]
    pub job_retention_secs: u64,

    /// How split ranges are validated: strict or permissive
    #[arg(long, env = "RANGE_POLICY", default_value = "strict")]
    pub range_policy: RangePolicy,

    /// Minimum number of files a merge accepts
    #[arg(long, env = "MIN_MERGE_FILES", default_value_t = 2)]
    pub min_merge_files: usize,

    /// Maximum request body size in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 50)]
    pub max_upload_mb: usize,

    /// Ignore output passwords instead of encrypting results
    #[arg(long, env = "DISABLE_ENCRYPTION")]
    pub disable_encryption: bool,

    /// Requests allowed per client IP within one window
    #[arg(long, env = "RATE_LIMIT_BURST", default_value_t = 100)]
    pub rate_limit_burst: u32,

    /// Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 900)]
    pub rate_limit_window_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn command_options(&self) -> CommandOptions {
        CommandOptions {
            range_policy: self.range_policy,
            encryption: if self.disable_encryption {
                EncryptionSupport::Disabled
            } else {
                EncryptionSupport::Enabled
            },
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Milliseconds for the limiter to replenish one request, so that a full
    /// bucket refills over one window
    pub fn rate_limit_replenish_ms(&self) -> u64 {
        let burst = u64::from(self.rate_limit_burst.max(1));
        (self.rate_limit_window_secs.saturating_mul(1000) / burst).max(1)
    }
}
