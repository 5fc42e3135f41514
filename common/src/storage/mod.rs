pub mod embedded_content;
pub mod ingest_meta;
pub mod mongodb;
pub mod page;
pub mod pgvector;

use serde::{Deserialize, Serialize};

use crate::utils::config::IngestEnv;

/// Which storage technology backs a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// Postgres with the pgvector extension.
    Relational,
    /// MongoDB.
    Document,
}

impl BackendFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendFamily::Relational => "relational",
            BackendFamily::Document => "document",
        }
    }
}

/// Where a store points, observable without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    pub family: BackendFamily,
    pub database_name: String,
    /// Configured vector table name; `None` for the document family, which
    /// uses fixed collection names.
    pub table_name: Option<String>,
}

/// The backend-family decision, made once per configuration and shared by
/// every store factory. Factories match on this value; none re-derives the
/// choice from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    PgVector {
        connection_uri: String,
        database_name: String,
        table_name: String,
    },
    MongoDb {
        connection_uri: String,
        database_name: String,
    },
}

impl StoreBackend {
    /// Selects the relational family only when all three Postgres parameters
    /// are non-empty; anything less falls back to the document family. The
    /// fallback values are carried as-is, an unset Mongo URI errors on first
    /// store use rather than here.
    pub fn from_env(env: &IngestEnv) -> Self {
        if !env.pg_connection_uri.is_empty()
            && !env.pg_database_name.is_empty()
            && !env.pg_vector_table_name.is_empty()
        {
            StoreBackend::PgVector {
                connection_uri: env.pg_connection_uri.clone(),
                database_name: env.pg_database_name.clone(),
                table_name: env.pg_vector_table_name.clone(),
            }
        } else {
            StoreBackend::MongoDb {
                connection_uri: env.mongodb_connection_uri.clone(),
                database_name: env.mongodb_database_name.clone(),
            }
        }
    }

    pub fn family(&self) -> BackendFamily {
        match self {
            StoreBackend::PgVector { .. } => BackendFamily::Relational,
            StoreBackend::MongoDb { .. } => BackendFamily::Document,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg_env() -> IngestEnv {
        IngestEnv {
            pg_connection_uri: "p".to_string(),
            pg_database_name: "d".to_string(),
            pg_vector_table_name: "t".to_string(),
            ..IngestEnv::default()
        }
    }

    #[test]
    fn selects_relational_when_all_three_pg_values_present() {
        let backend = StoreBackend::from_env(&pg_env());
        assert_eq!(backend.family(), BackendFamily::Relational);
        assert_eq!(
            backend,
            StoreBackend::PgVector {
                connection_uri: "p".to_string(),
                database_name: "d".to_string(),
                table_name: "t".to_string(),
            }
        );
    }

    #[test]
    fn selects_document_when_only_mongo_values_present() {
        let env = IngestEnv {
            mongodb_connection_uri: "m".to_string(),
            mongodb_database_name: "n".to_string(),
            ..IngestEnv::default()
        };

        let backend = StoreBackend::from_env(&env);
        assert_eq!(backend.family(), BackendFamily::Document);
        assert_eq!(
            backend,
            StoreBackend::MongoDb {
                connection_uri: "m".to_string(),
                database_name: "n".to_string(),
            }
        );
    }

    #[test]
    fn partial_pg_configuration_falls_back_to_document() {
        // URI missing: all three relational parameters are required.
        let env = IngestEnv {
            pg_database_name: "d".to_string(),
            pg_vector_table_name: "t".to_string(),
            mongodb_connection_uri: "m".to_string(),
            mongodb_database_name: "n".to_string(),
            ..IngestEnv::default()
        };

        let backend = StoreBackend::from_env(&env);
        assert_eq!(backend.family(), BackendFamily::Document);
    }

    #[test]
    fn empty_pg_values_count_as_absent() {
        let mut env = pg_env();
        env.pg_vector_table_name = String::new();

        assert_eq!(
            StoreBackend::from_env(&env).family(),
            BackendFamily::Document
        );
    }

    #[test]
    fn family_labels_are_stable() {
        assert_eq!(BackendFamily::Relational.as_str(), "relational");
        assert_eq!(BackendFamily::Document.as_str(), "document");
    }
}
