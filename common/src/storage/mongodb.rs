use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::AppError;

use super::{
    embedded_content::{EmbeddedContent, EmbeddedContentStore},
    ingest_meta::IngestMetaStore,
    page::{Page, PageQuery, PageStore},
    BackendFamily, StoreDescriptor,
};

pub const PAGES_COLLECTION: &str = "pages";
pub const EMBEDDED_CONTENT_COLLECTION: &str = "embedded_content";
pub const INGEST_META_COLLECTION: &str = "ingest_meta";

/// Lazily-connected handle to one MongoDB database.
///
/// Construction performs no I/O; the first store call establishes the
/// connection, so a misconfigured URI surfaces at first use.
#[derive(Debug, Clone)]
pub struct MongoDbConnection {
    connection_uri: String,
    database_name: String,
    client: Arc<OnceCell<Client>>,
}

impl MongoDbConnection {
    pub fn new(connection_uri: impl Into<String>, database_name: impl Into<String>) -> Self {
        MongoDbConnection {
            connection_uri: connection_uri.into(),
            database_name: database_name.into(),
            client: Arc::new(OnceCell::new()),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    async fn database(&self) -> Result<Database, AppError> {
        if self.connection_uri.is_empty() {
            return Err(AppError::Validation(
                "MONGODB_CONNECTION_URI is not set".to_string(),
            ));
        }

        let client = self
            .client
            .get_or_try_init(|| async {
                debug!(database = %self.database_name, "connecting to MongoDB");
                Client::with_uri_str(&self.connection_uri).await
            })
            .await?;

        Ok(client.database(&self.database_name))
    }

    fn descriptor(&self) -> StoreDescriptor {
        StoreDescriptor {
            family: BackendFamily::Document,
            database_name: self.database_name.clone(),
            table_name: None,
        }
    }
}

/// [`PageStore`] over the `pages` collection.
pub struct MongoDbPageStore {
    conn: MongoDbConnection,
}

impl MongoDbPageStore {
    pub fn new(connection_uri: impl Into<String>, database_name: impl Into<String>) -> Self {
        MongoDbPageStore {
            conn: MongoDbConnection::new(connection_uri, database_name),
        }
    }

    async fn collection(&self) -> Result<Collection<Page>, AppError> {
        Ok(self.conn.database().await?.collection(PAGES_COLLECTION))
    }
}

#[async_trait]
impl PageStore for MongoDbPageStore {
    fn descriptor(&self) -> StoreDescriptor {
        self.conn.descriptor()
    }

    async fn load_pages(&self, query: PageQuery<'_>) -> Result<Vec<Page>, AppError> {
        let mut filter = doc! {};
        if let Some(source_name) = query.source_name {
            filter.insert("source_name", source_name);
        }
        if let Some(since) = query.updated_since {
            filter.insert(
                "updated_at",
                doc! { "$gte": Bson::DateTime(bson::DateTime::from_chrono(since)) },
            );
        }

        let cursor = self.collection().await?.find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_pages(&self, pages: &[Page]) -> Result<u64, AppError> {
        let collection = self.collection().await?;
        for page in pages {
            collection
                .replace_one(
                    doc! { "url": &page.url, "source_name": &page.source_name },
                    page,
                )
                .upsert(true)
                .await?;
        }

        Ok(pages.len() as u64)
    }
}

/// [`EmbeddedContentStore`] over the `embedded_content` collection.
pub struct MongoDbEmbeddedContentStore {
    conn: MongoDbConnection,
}

impl MongoDbEmbeddedContentStore {
    pub fn new(connection_uri: impl Into<String>, database_name: impl Into<String>) -> Self {
        MongoDbEmbeddedContentStore {
            conn: MongoDbConnection::new(connection_uri, database_name),
        }
    }

    async fn collection(&self) -> Result<Collection<EmbeddedContent>, AppError> {
        Ok(self
            .conn
            .database()
            .await?
            .collection(EMBEDDED_CONTENT_COLLECTION))
    }
}

#[async_trait]
impl EmbeddedContentStore for MongoDbEmbeddedContentStore {
    fn descriptor(&self) -> StoreDescriptor {
        self.conn.descriptor()
    }

    async fn load_for_page(&self, url: &str) -> Result<Vec<EmbeddedContent>, AppError> {
        let cursor = self
            .collection()
            .await?
            .find(doc! { "url": url })
            .sort(doc! { "chunk_index": 1 })
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn replace_for_page(
        &self,
        url: &str,
        items: Vec<EmbeddedContent>,
    ) -> Result<(), AppError> {
        let collection = self.collection().await?;
        collection.delete_many(doc! { "url": url }).await?;
        if !items.is_empty() {
            collection.insert_many(items).await?;
        }

        Ok(())
    }

    async fn delete_for_page(&self, url: &str) -> Result<u64, AppError> {
        let result = self
            .collection()
            .await?
            .delete_many(doc! { "url": url })
            .await?;

        Ok(result.deleted_count)
    }

    async fn delete_for_source(&self, source_name: &str) -> Result<u64, AppError> {
        let result = self
            .collection()
            .await?
            .delete_many(doc! { "source_name": source_name })
            .await?;

        Ok(result.deleted_count)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IngestMetaDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    last_successful_run: DateTime<Utc>,
}

/// [`IngestMetaStore`] over the `ingest_meta` collection, one document per
/// entry id.
pub struct MongoDbIngestMetaStore {
    conn: MongoDbConnection,
    entry_id: String,
}

impl MongoDbIngestMetaStore {
    pub fn new(
        connection_uri: impl Into<String>,
        database_name: impl Into<String>,
        entry_id: impl Into<String>,
    ) -> Self {
        MongoDbIngestMetaStore {
            conn: MongoDbConnection::new(connection_uri, database_name),
            entry_id: entry_id.into(),
        }
    }

    async fn collection(&self) -> Result<Collection<IngestMetaDocument>, AppError> {
        Ok(self
            .conn
            .database()
            .await?
            .collection(INGEST_META_COLLECTION))
    }
}

#[async_trait]
impl IngestMetaStore for MongoDbIngestMetaStore {
    fn descriptor(&self) -> StoreDescriptor {
        self.conn.descriptor()
    }

    fn entry_id(&self) -> &str {
        &self.entry_id
    }

    async fn load_last_successful_run(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let document = self
            .collection()
            .await?
            .find_one(doc! { "_id": &self.entry_id })
            .await?;

        Ok(document.map(|d| d.last_successful_run))
    }

    async fn record_successful_run(&self, finished_at: DateTime<Utc>) -> Result<(), AppError> {
        self.collection()
            .await?
            .replace_one(
                doc! { "_id": &self.entry_id },
                IngestMetaDocument {
                    id: self.entry_id.clone(),
                    last_successful_run: finished_at,
                },
            )
            .upsert(true)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_performs_no_io() {
        let store = MongoDbPageStore::new("mongodb://localhost:27017", "docs");
        assert_eq!(store.descriptor().database_name, "docs");
        assert_eq!(store.descriptor().family, BackendFamily::Document);
        assert_eq!(store.descriptor().table_name, None);
    }

    #[tokio::test]
    async fn empty_uri_fails_at_first_use_with_validation_error() {
        let store = MongoDbEmbeddedContentStore::new("", "docs");
        let err = store
            .load_for_page("https://example.com/page")
            .await
            .expect_err("empty URI must fail");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn meta_store_keeps_configured_entry_id() {
        let store = MongoDbIngestMetaStore::new("mongodb://localhost:27017", "docs", "all");
        assert_eq!(store.entry_id(), "all");
    }
}
