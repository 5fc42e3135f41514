use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
    PgPool, Row,
};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::AppError;

use super::{
    embedded_content::{EmbeddedContent, EmbeddedContentStore},
    ingest_meta::IngestMetaStore,
    page::{Page, PageAction, PageFormat, PageQuery, PageStore},
    BackendFamily, StoreDescriptor,
};

/// Lazily-connected handle to one Postgres database with the pgvector
/// extension.
///
/// Construction performs no I/O. The pool is created on first use and the
/// schema is ensured once per handle; the configured vector table name also
/// names the sibling page and ingest-meta tables.
#[derive(Debug, Clone)]
pub struct PgVectorConnection {
    connection_uri: String,
    database_name: String,
    table_name: String,
    pool: Arc<OnceCell<PgPool>>,
    schema: Arc<OnceCell<()>>,
}

impl PgVectorConnection {
    pub fn new(
        connection_uri: impl Into<String>,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        PgVectorConnection {
            connection_uri: connection_uri.into(),
            database_name: database_name.into(),
            table_name: table_name.into(),
            pool: Arc::new(OnceCell::new()),
            schema: Arc::new(OnceCell::new()),
        }
    }

    pub fn vector_table(&self) -> &str {
        &self.table_name
    }

    pub fn pages_table(&self) -> String {
        format!("{}_pages", self.table_name)
    }

    pub fn meta_table(&self) -> String {
        format!("{}_ingest_meta", self.table_name)
    }

    async fn pool(&self) -> Result<&PgPool, AppError> {
        if self.connection_uri.is_empty() {
            return Err(AppError::Validation(
                "PG_CONNECTION_URI is not set".to_string(),
            ));
        }

        let pool = self
            .pool
            .get_or_try_init(|| async {
                debug!(database = %self.database_name, "preparing Postgres pool");
                let options = PgConnectOptions::from_str(&self.connection_uri)?
                    .database(&self.database_name);
                Ok::<_, sqlx::Error>(
                    PgPoolOptions::new()
                        .max_connections(5)
                        .connect_lazy_with(options),
                )
            })
            .await?;

        Ok(pool)
    }

    /// Pool with the vector extension and all three tables in place.
    async fn ready_pool(&self) -> Result<&PgPool, AppError> {
        let pool = self.pool().await?;
        self.schema
            .get_or_try_init(|| async {
                for statement in self.schema_statements() {
                    sqlx::query(&statement).execute(pool).await?;
                }
                Ok::<_, sqlx::Error>(())
            })
            .await?;

        Ok(pool)
    }

    fn schema_statements(&self) -> Vec<String> {
        let vector_table = quote_ident(self.vector_table());
        let pages_table = quote_ident(&self.pages_table());
        let meta_table = quote_ident(&self.meta_table());

        vec![
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS {vector_table} (
                    id BIGSERIAL PRIMARY KEY,
                    url TEXT NOT NULL,
                    source_name TEXT NOT NULL,
                    chunk_index INTEGER NOT NULL,
                    token_count INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    embedding vector,
                    updated_at TIMESTAMPTZ NOT NULL,
                    UNIQUE (url, chunk_index)
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {pages_table} (
                    url TEXT NOT NULL,
                    source_name TEXT NOT NULL,
                    title TEXT,
                    body TEXT NOT NULL,
                    format TEXT NOT NULL,
                    metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    action TEXT NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (url, source_name)
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {meta_table} (
                    entry_id TEXT PRIMARY KEY,
                    last_successful_run TIMESTAMPTZ NOT NULL
                )"
            ),
        ]
    }

    fn descriptor(&self) -> StoreDescriptor {
        StoreDescriptor {
            family: BackendFamily::Relational,
            database_name: self.database_name.clone(),
            table_name: Some(self.table_name.clone()),
        }
    }
}

/// Double-quotes an identifier for interpolation into SQL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// [`PageStore`] over the `<table>_pages` table.
pub struct PgVectorPageStore {
    conn: PgVectorConnection,
}

impl PgVectorPageStore {
    pub fn new(
        connection_uri: impl Into<String>,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        PgVectorPageStore {
            conn: PgVectorConnection::new(connection_uri, database_name, table_name),
        }
    }
}

fn row_to_page(row: &PgRow) -> Result<Page, AppError> {
    let format: String = row.try_get("format")?;
    let action: String = row.try_get("action")?;

    Ok(Page {
        url: row.try_get("url")?,
        source_name: row.try_get("source_name")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        format: PageFormat::parse(&format)?,
        metadata: row.try_get("metadata")?,
        action: PageAction::parse(&action)?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl PageStore for PgVectorPageStore {
    fn descriptor(&self) -> StoreDescriptor {
        self.conn.descriptor()
    }

    async fn load_pages(&self, query: PageQuery<'_>) -> Result<Vec<Page>, AppError> {
        let pool = self.conn.ready_pool().await?;

        let mut sql = format!(
            "SELECT url, source_name, title, body, format, metadata, action, updated_at
             FROM {}",
            quote_ident(&self.conn.pages_table())
        );
        let mut clauses = Vec::new();
        if query.source_name.is_some() {
            clauses.push(format!("source_name = ${}", clauses.len() + 1));
        }
        if query.updated_since.is_some() {
            clauses.push(format!("updated_at >= ${}", clauses.len() + 1));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut statement = sqlx::query(&sql);
        if let Some(source_name) = query.source_name {
            statement = statement.bind(source_name);
        }
        if let Some(updated_since) = query.updated_since {
            statement = statement.bind(updated_since);
        }

        let rows = statement.fetch_all(pool).await?;
        rows.iter().map(row_to_page).collect()
    }

    async fn update_pages(&self, pages: &[Page]) -> Result<u64, AppError> {
        let pool = self.conn.ready_pool().await?;
        let sql = format!(
            "INSERT INTO {} (url, source_name, title, body, format, metadata, action, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (url, source_name) DO UPDATE SET
                title = EXCLUDED.title,
                body = EXCLUDED.body,
                format = EXCLUDED.format,
                metadata = EXCLUDED.metadata,
                action = EXCLUDED.action,
                updated_at = EXCLUDED.updated_at",
            quote_ident(&self.conn.pages_table())
        );

        let mut tx = pool.begin().await?;
        for page in pages {
            sqlx::query(&sql)
                .bind(&page.url)
                .bind(&page.source_name)
                .bind(&page.title)
                .bind(&page.body)
                .bind(page.format.as_str())
                .bind(&page.metadata)
                .bind(page.action.as_str())
                .bind(page.updated_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(pages.len() as u64)
    }
}

/// [`EmbeddedContentStore`] over the configured vector table.
pub struct PgVectorEmbeddedContentStore {
    conn: PgVectorConnection,
}

impl PgVectorEmbeddedContentStore {
    pub fn new(
        connection_uri: impl Into<String>,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        PgVectorEmbeddedContentStore {
            conn: PgVectorConnection::new(connection_uri, database_name, table_name),
        }
    }
}

fn row_to_embedded_content(row: &PgRow) -> Result<EmbeddedContent, AppError> {
    let embedding: Vector = row.try_get("embedding")?;

    Ok(EmbeddedContent {
        url: row.try_get("url")?,
        source_name: row.try_get("source_name")?,
        text: row.try_get("text")?,
        token_count: row.try_get::<i32, _>("token_count")?.unsigned_abs(),
        chunk_index: row.try_get::<i32, _>("chunk_index")?.unsigned_abs(),
        embedding: embedding.to_vec(),
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl EmbeddedContentStore for PgVectorEmbeddedContentStore {
    fn descriptor(&self) -> StoreDescriptor {
        self.conn.descriptor()
    }

    async fn load_for_page(&self, url: &str) -> Result<Vec<EmbeddedContent>, AppError> {
        let pool = self.conn.ready_pool().await?;
        let sql = format!(
            "SELECT url, source_name, text, token_count, chunk_index, embedding, updated_at
             FROM {} WHERE url = $1 ORDER BY chunk_index",
            quote_ident(self.conn.vector_table())
        );

        let rows = sqlx::query(&sql).bind(url).fetch_all(pool).await?;
        rows.iter().map(row_to_embedded_content).collect()
    }

    async fn replace_for_page(
        &self,
        url: &str,
        items: Vec<EmbeddedContent>,
    ) -> Result<(), AppError> {
        let pool = self.conn.ready_pool().await?;
        let delete_sql = format!(
            "DELETE FROM {} WHERE url = $1",
            quote_ident(self.conn.vector_table())
        );
        let insert_sql = format!(
            "INSERT INTO {} (url, source_name, text, token_count, chunk_index, embedding, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            quote_ident(self.conn.vector_table())
        );

        let mut tx = pool.begin().await?;
        sqlx::query(&delete_sql).bind(url).execute(&mut *tx).await?;
        for item in items {
            sqlx::query(&insert_sql)
                .bind(&item.url)
                .bind(&item.source_name)
                .bind(&item.text)
                .bind(i64::from(item.token_count))
                .bind(i64::from(item.chunk_index))
                .bind(Vector::from(item.embedding))
                .bind(item.updated_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn delete_for_page(&self, url: &str) -> Result<u64, AppError> {
        let pool = self.conn.ready_pool().await?;
        let sql = format!(
            "DELETE FROM {} WHERE url = $1",
            quote_ident(self.conn.vector_table())
        );

        let result = sqlx::query(&sql).bind(url).execute(pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_source(&self, source_name: &str) -> Result<u64, AppError> {
        let pool = self.conn.ready_pool().await?;
        let sql = format!(
            "DELETE FROM {} WHERE source_name = $1",
            quote_ident(self.conn.vector_table())
        );

        let result = sqlx::query(&sql).bind(source_name).execute(pool).await?;
        Ok(result.rows_affected())
    }
}

/// [`IngestMetaStore`] over the `<table>_ingest_meta` table, one row per
/// entry id.
pub struct PgVectorIngestMetaStore {
    conn: PgVectorConnection,
    entry_id: String,
}

impl PgVectorIngestMetaStore {
    pub fn new(
        connection_uri: impl Into<String>,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
        entry_id: impl Into<String>,
    ) -> Self {
        PgVectorIngestMetaStore {
            conn: PgVectorConnection::new(connection_uri, database_name, table_name),
            entry_id: entry_id.into(),
        }
    }
}

#[async_trait]
impl IngestMetaStore for PgVectorIngestMetaStore {
    fn descriptor(&self) -> StoreDescriptor {
        self.conn.descriptor()
    }

    fn entry_id(&self) -> &str {
        &self.entry_id
    }

    async fn load_last_successful_run(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let pool = self.conn.ready_pool().await?;
        let sql = format!(
            "SELECT last_successful_run FROM {} WHERE entry_id = $1",
            quote_ident(&self.conn.meta_table())
        );

        let row = sqlx::query(&sql)
            .bind(&self.entry_id)
            .fetch_optional(pool)
            .await?;

        row.map(|r| r.try_get("last_successful_run"))
            .transpose()
            .map_err(Into::into)
    }

    async fn record_successful_run(&self, finished_at: DateTime<Utc>) -> Result<(), AppError> {
        let pool = self.conn.ready_pool().await?;
        let sql = format!(
            "INSERT INTO {} (entry_id, last_successful_run) VALUES ($1, $2)
             ON CONFLICT (entry_id) DO UPDATE SET
                last_successful_run = EXCLUDED.last_successful_run",
            quote_ident(&self.conn.meta_table())
        );

        sqlx::query(&sql)
            .bind(&self.entry_id)
            .bind(finished_at)
            .execute(pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_sibling_table_names_from_vector_table() {
        let conn = PgVectorConnection::new("postgresql://localhost", "docs", "chunks");
        assert_eq!(conn.vector_table(), "chunks");
        assert_eq!(conn.pages_table(), "chunks_pages");
        assert_eq!(conn.meta_table(), "chunks_ingest_meta");
    }

    #[test]
    fn descriptor_reports_configured_values() {
        let store = PgVectorPageStore::new("postgresql://localhost", "docs", "chunks");
        let descriptor = store.descriptor();
        assert_eq!(descriptor.family, BackendFamily::Relational);
        assert_eq!(descriptor.database_name, "docs");
        assert_eq!(descriptor.table_name.as_deref(), Some("chunks"));
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("chunks"), "\"chunks\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn schema_covers_all_three_tables() {
        let conn = PgVectorConnection::new("postgresql://localhost", "docs", "chunks");
        let statements = conn.schema_statements();
        assert_eq!(statements.len(), 4);
        assert!(statements.iter().any(|s| s.contains("\"chunks\"")));
        assert!(statements.iter().any(|s| s.contains("\"chunks_pages\"")));
        assert!(statements
            .iter()
            .any(|s| s.contains("\"chunks_ingest_meta\"")));
    }

    #[tokio::test]
    async fn empty_uri_fails_at_first_use_with_validation_error() {
        let store = PgVectorIngestMetaStore::new("", "docs", "chunks", "all");
        let err = store
            .load_last_successful_run()
            .await
            .expect_err("empty URI must fail");
        assert!(matches!(err, AppError::Validation(_)));
    }
}
