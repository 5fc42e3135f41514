pub mod persisted_query;

use async_trait::async_trait;
use common::{error::AppError, storage::page::Page};

/// An external provider of raw pages to ingest.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_pages(&self) -> Result<Vec<Page>, AppError>;
}
