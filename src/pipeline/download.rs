use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::pool::{PoolSubmitter, StageHandler};
use super::types::{ItemRef, MediaFile};
use crate::sources::Fetcher;
use crate::ScribeError;

/// One item to fetch into its playlist folder
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub item: ItemRef,
    pub destination: PathBuf,
}

/// Fetches items and streams every produced file straight into the conversion queue
pub struct DownloadHandler {
    fetcher: Arc<dyn Fetcher>,
    conversion: PoolSubmitter<MediaFile>,
}

impl DownloadHandler {
    pub fn new(fetcher: Arc<dyn Fetcher>, conversion: PoolSubmitter<MediaFile>) -> Self {
        Self { fetcher, conversion }
    }
}

#[async_trait]
impl StageHandler<DownloadJob> for DownloadHandler {
    fn describe(&self, job: &DownloadJob) -> String {
        job.item.to_string()
    }

    async fn handle(&self, job: DownloadJob) -> Result<(), ScribeError> {
        let DownloadJob { item, destination } = job;

        let path = self.fetcher.fetch(&item, &destination).await?;
        tracing::info!(item = %item, path = %path.display(), "Downloaded");

        self.conversion.submit(MediaFile::raw(item, path)).await
    }
}
