use std::path::Path;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Snapshot of the environment parameters the ingest configuration reads.
///
/// Every field defaults to the empty string when the variable is unset, and an
/// empty value is treated as absent by the backend selection. Nothing is
/// validated here; a store or embedder constructed from missing values reports
/// the problem on first use.
#[derive(Clone, Deserialize, Debug, Default)]
pub struct IngestEnv {
    #[serde(default)]
    pub mongodb_connection_uri: String,
    #[serde(default)]
    pub mongodb_database_name: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub openai_embedding_model: String,
    #[serde(default)]
    pub pg_connection_uri: String,
    #[serde(default)]
    pub pg_database_name: String,
    #[serde(default)]
    pub pg_vector_table_name: String,
}

impl IngestEnv {
    /// Loads the snapshot from the process environment only.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Environment::default())
            .build()?;

        config.try_deserialize()
    }

    /// Loads the snapshot after merging a dotenv file into the process
    /// environment. Variables already present in the environment win over the
    /// file, and a missing file is not an error.
    pub fn load_from(dotenv_path: &Path) -> Result<Self, ConfigError> {
        dotenvy::from_path(dotenv_path).ok();

        Self::load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_to_empty_strings() {
        let env = IngestEnv::default();
        assert!(env.mongodb_connection_uri.is_empty());
        assert!(env.pg_vector_table_name.is_empty());
    }

    #[test]
    fn missing_dotenv_file_is_not_an_error() {
        let result = IngestEnv::load_from(Path::new("/nonexistent/.env"));
        assert!(result.is_ok());
    }

    #[test]
    fn reads_values_from_dotenv_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "PG_VECTOR_TABLE_NAME=dotenv_chunks").expect("write");
        file.flush().expect("flush");

        let env = IngestEnv::load_from(file.path()).expect("load");
        assert_eq!(env.pg_vector_table_name, "dotenv_chunks");
    }
}
