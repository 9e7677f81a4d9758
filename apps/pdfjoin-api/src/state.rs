//! Application state for the pdfjoin API

use std::sync::Arc;

use anyhow::{Context, Result};
use pdfjoin_core::CommandOptions;

use crate::config::Config;
use crate::jobs::JobTracker;
use crate::staging::FileStaging;

#[derive(Clone)]
pub struct AppState {
    pub staging: Arc<FileStaging>,
    pub jobs: JobTracker,
    pub options: CommandOptions,
    pub min_merge_files: usize,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self> {
        let staging = FileStaging::new(&config.staging_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create staging directory {}",
                    config.staging_dir.display()
                )
            })?;

        tracing::info!("Staging files in {}", staging.dir().display());

        Ok(Self {
            staging: Arc::new(staging),
            jobs: JobTracker::new(),
            options: config.command_options(),
            min_merge_files: config.min_merge_files.max(1),
            max_upload_bytes: config.max_upload_bytes(),
        })
    }
}
