use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;

use super::StoreDescriptor;

/// Persistent store for ingest-run metadata, keyed by a logical entry id.
///
/// The configuration fixes the entry id to a single value for the whole
/// pipeline, so one record tracks the last successful run across all data
/// sources.
#[async_trait]
pub trait IngestMetaStore: Send + Sync {
    fn descriptor(&self) -> StoreDescriptor;

    fn entry_id(&self) -> &str;

    async fn load_last_successful_run(&self) -> Result<Option<DateTime<Utc>>, AppError>;

    async fn record_successful_run(&self, finished_at: DateTime<Utc>) -> Result<(), AppError>;
}
