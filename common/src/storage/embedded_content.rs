use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::StoreDescriptor;

/// One embedded chunk of a page, the unit queried for similarity search by
/// the retrieval side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedContent {
    /// URL of the page this chunk was cut from.
    pub url: String,
    pub source_name: String,
    pub text: String,
    pub token_count: u32,
    /// Position of the chunk within its page.
    pub chunk_index: u32,
    pub embedding: Vec<f32>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Persistent store for chunk vectors.
///
/// Only the write-side surface the ingestion runner needs lives here;
/// similarity search belongs to the retrieval pipeline.
#[async_trait]
pub trait EmbeddedContentStore: Send + Sync {
    fn descriptor(&self) -> StoreDescriptor;

    async fn load_for_page(&self, url: &str) -> Result<Vec<EmbeddedContent>, AppError>;

    /// Replaces everything stored for `url` with `items` in one step.
    async fn replace_for_page(
        &self,
        url: &str,
        items: Vec<EmbeddedContent>,
    ) -> Result<(), AppError>;

    /// Returns the number of chunks removed.
    async fn delete_for_page(&self, url: &str) -> Result<u64, AppError>;

    /// Returns the number of chunks removed.
    async fn delete_for_source(&self, source_name: &str) -> Result<u64, AppError>;
}
