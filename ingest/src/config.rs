use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        embedded_content::EmbeddedContentStore,
        ingest_meta::IngestMetaStore,
        mongodb::{MongoDbEmbeddedContentStore, MongoDbIngestMetaStore, MongoDbPageStore},
        page::PageStore,
        pgvector::{PgVectorEmbeddedContentStore, PgVectorIngestMetaStore, PgVectorPageStore},
        StoreBackend,
    },
    utils::{
        config::IngestEnv,
        embedding::{Embedder, OpenAiEmbedder},
    },
};
use ::config::ConfigError;
use tracing::debug;

use crate::{
    chunk::ChunkOptions,
    data_sources::{persisted_query::PersistedQueryDataSource, DataSource},
};

/// The single ingest-run metadata record this pipeline tracks. One record
/// covers the whole pipeline rather than one per data source.
pub const INGEST_META_ENTRY_ID: &str = "all";

/// Startup configuration for the ingestion runner.
///
/// Assembly reads the environment once and computes the backend-family
/// decision once; everything else is deferred. Each factory call constructs a
/// fresh collaborator, nothing is cached or pooled here, and no connection is
/// opened until the runner uses what it was handed.
pub struct IngestConfig {
    env: IngestEnv,
    backend: StoreBackend,
}

impl IngestConfig {
    /// Assembles the configuration from the workspace-root `.env` file plus
    /// the process environment. The only failure mode is the loader itself;
    /// assembly performs no I/O and no validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = IngestEnv::load_from(&project_dotenv_path())?;
        Ok(Self::new(env))
    }

    pub fn new(env: IngestEnv) -> Self {
        let backend = StoreBackend::from_env(&env);
        debug!(
            family = backend.family().as_str(),
            "selected storage backend family"
        );

        IngestConfig { env, backend }
    }

    pub fn backend(&self) -> &StoreBackend {
        &self.backend
    }

    /// Embedding provider with the fixed API key and model, retrying failed
    /// requests automatically.
    pub async fn embedder(&self) -> Result<Arc<dyn Embedder>, AppError> {
        Ok(Arc::new(OpenAiEmbedder::new(
            &self.env.openai_api_key,
            &self.env.openai_embedding_model,
        )))
    }

    pub fn embedded_content_store(&self) -> Arc<dyn EmbeddedContentStore> {
        match &self.backend {
            StoreBackend::PgVector {
                connection_uri,
                database_name,
                table_name,
            } => Arc::new(PgVectorEmbeddedContentStore::new(
                connection_uri,
                database_name,
                table_name,
            )),
            StoreBackend::MongoDb {
                connection_uri,
                database_name,
            } => Arc::new(MongoDbEmbeddedContentStore::new(
                connection_uri,
                database_name,
            )),
        }
    }

    pub fn page_store(&self) -> Arc<dyn PageStore> {
        match &self.backend {
            StoreBackend::PgVector {
                connection_uri,
                database_name,
                table_name,
            } => Arc::new(PgVectorPageStore::new(
                connection_uri,
                database_name,
                table_name,
            )),
            StoreBackend::MongoDb {
                connection_uri,
                database_name,
            } => Arc::new(MongoDbPageStore::new(connection_uri, database_name)),
        }
    }

    pub fn ingest_meta_store(&self) -> Arc<dyn IngestMetaStore> {
        match &self.backend {
            StoreBackend::PgVector {
                connection_uri,
                database_name,
                table_name,
            } => Arc::new(PgVectorIngestMetaStore::new(
                connection_uri,
                database_name,
                table_name,
                INGEST_META_ENTRY_ID,
            )),
            StoreBackend::MongoDb {
                connection_uri,
                database_name,
            } => Arc::new(MongoDbIngestMetaStore::new(
                connection_uri,
                database_name,
                INGEST_META_ENTRY_ID,
            )),
        }
    }

    pub fn chunk_options(&self) -> ChunkOptions {
        ChunkOptions::default()
    }

    // Add data sources here
    pub async fn data_sources(&self) -> Result<Vec<Box<dyn DataSource>>, AppError> {
        Ok(vec![Box::new(PersistedQueryDataSource::new()?)])
    }
}

/// `.env` at the workspace root, shared by every member crate.
fn project_dotenv_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(".env")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{standard_chunk_front_matter_updater, ChunkTransform};
    use common::storage::BackendFamily;

    fn pg_env() -> IngestEnv {
        IngestEnv {
            pg_connection_uri: "p".to_string(),
            pg_database_name: "d".to_string(),
            pg_vector_table_name: "t".to_string(),
            openai_api_key: "key".to_string(),
            openai_embedding_model: "text-embedding-3-small".to_string(),
            ..IngestEnv::default()
        }
    }

    fn mongo_env() -> IngestEnv {
        IngestEnv {
            mongodb_connection_uri: "m".to_string(),
            mongodb_database_name: "n".to_string(),
            openai_api_key: "key".to_string(),
            openai_embedding_model: "text-embedding-3-small".to_string(),
            ..IngestEnv::default()
        }
    }

    #[test]
    fn all_store_factories_agree_on_the_relational_family() {
        let config = IngestConfig::new(pg_env());

        for descriptor in [
            config.embedded_content_store().descriptor(),
            config.page_store().descriptor(),
            config.ingest_meta_store().descriptor(),
        ] {
            assert_eq!(descriptor.family, BackendFamily::Relational);
            assert_eq!(descriptor.database_name, "d");
            assert_eq!(descriptor.table_name.as_deref(), Some("t"));
        }
    }

    #[test]
    fn all_store_factories_agree_on_the_document_family() {
        let config = IngestConfig::new(mongo_env());

        for descriptor in [
            config.embedded_content_store().descriptor(),
            config.page_store().descriptor(),
            config.ingest_meta_store().descriptor(),
        ] {
            assert_eq!(descriptor.family, BackendFamily::Document);
            assert_eq!(descriptor.database_name, "n");
            assert_eq!(descriptor.table_name, None);
        }
    }

    #[test]
    fn missing_pg_uri_falls_back_to_the_document_family() {
        let mut env = pg_env();
        env.pg_connection_uri = String::new();
        env.mongodb_connection_uri = "m".to_string();
        env.mongodb_database_name = "n".to_string();

        let config = IngestConfig::new(env);
        assert_eq!(
            config.page_store().descriptor().family,
            BackendFamily::Document
        );
        assert_eq!(config.page_store().descriptor().database_name, "n");
    }

    #[test]
    fn meta_store_entry_id_is_fixed_in_both_families() {
        assert_eq!(
            IngestConfig::new(pg_env()).ingest_meta_store().entry_id(),
            "all"
        );
        assert_eq!(
            IngestConfig::new(mongo_env()).ingest_meta_store().entry_id(),
            "all"
        );
    }

    #[test]
    fn chunk_options_always_return_the_same_transform() {
        let config = IngestConfig::new(mongo_env());
        assert!(std::ptr::fn_addr_eq(
            config.chunk_options().transform,
            standard_chunk_front_matter_updater as ChunkTransform
        ));
        assert!(std::ptr::fn_addr_eq(
            IngestConfig::new(pg_env()).chunk_options().transform,
            config.chunk_options().transform
        ));
    }

    #[tokio::test]
    async fn embedder_uses_the_configured_model() {
        let config = IngestConfig::new(pg_env());
        let embedder = config.embedder().await.expect("embedder");
        assert_eq!(embedder.model(), "text-embedding-3-small");
    }

    #[tokio::test]
    async fn data_sources_currently_contains_one_source() {
        let config = IngestConfig::new(mongo_env());
        let sources = config.data_sources().await.expect("data sources");
        assert_eq!(sources.len(), 1);
        assert_eq!(
            sources.first().map(|source| source.name()),
            Some("persisted-queries")
        );
    }

    #[test]
    fn assembly_does_not_validate_the_environment() {
        // Fully empty environment still assembles; failures belong to the
        // collaborators at first use.
        let config = IngestConfig::new(IngestEnv::default());
        assert_eq!(
            config.backend().family(),
            BackendFamily::Document
        );
    }
}
