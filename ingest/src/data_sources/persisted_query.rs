use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    error::AppError,
    storage::page::{Page, PageAction, PageFormat},
};
use serde::Deserialize;
use tracing::info;

use super::DataSource;

pub const PERSISTED_QUERY_SOURCE_NAME: &str = "persisted-queries";

/// Published manifest of the persisted GraphQL operations to document.
const MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/mongodb/docs-ingest-manifests/main/persisted-queries.json";

const FETCH_TIMEOUT_SECS: u64 = 30;

/// One operation entry in the persisted-query manifest.
#[derive(Debug, Clone, Deserialize)]
struct PersistedQueryRecord {
    name: String,
    query: String,
    #[serde(default)]
    description: Option<String>,
}

/// Data source rendering one page per persisted GraphQL operation.
///
/// Constructing the source performs no I/O; the manifest is downloaded when
/// the runner asks for pages.
pub struct PersistedQueryDataSource {
    client: reqwest::Client,
    manifest_url: String,
}

impl PersistedQueryDataSource {
    pub fn new() -> Result<Self, AppError> {
        Self::with_manifest_url(MANIFEST_URL)
    }

    pub fn with_manifest_url(manifest_url: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;

        Ok(PersistedQueryDataSource {
            client,
            manifest_url: manifest_url.into(),
        })
    }

    fn render_page(&self, record: &PersistedQueryRecord) -> Page {
        let mut body = format!("# {}\n\n", record.name);
        if let Some(description) = &record.description {
            body.push_str(description);
            body.push_str("\n\n");
        }
        body.push_str("```graphql\n");
        body.push_str(record.query.trim_end());
        body.push_str("\n```\n");

        Page {
            url: format!("{}#{}", self.manifest_url, record.name),
            source_name: PERSISTED_QUERY_SOURCE_NAME.to_string(),
            title: Some(record.name.clone()),
            body,
            format: PageFormat::Md,
            metadata: serde_json::Value::Null,
            action: PageAction::Created,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl DataSource for PersistedQueryDataSource {
    fn name(&self) -> &str {
        PERSISTED_QUERY_SOURCE_NAME
    }

    async fn fetch_pages(&self) -> Result<Vec<Page>, AppError> {
        let records: Vec<PersistedQueryRecord> = self
            .client
            .get(&self.manifest_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(
            source = PERSISTED_QUERY_SOURCE_NAME,
            operations = records.len(),
            "fetched persisted-query manifest"
        );

        Ok(records
            .iter()
            .map(|record| self.render_page(record))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_markdown_page_per_operation() {
        let source = PersistedQueryDataSource::with_manifest_url("https://example.com/m.json")
            .expect("source");
        let record = PersistedQueryRecord {
            name: "GetMovies".to_string(),
            query: "query GetMovies { movies { title } }".to_string(),
            description: Some("Lists movies.".to_string()),
        };

        let page = source.render_page(&record);
        assert_eq!(page.url, "https://example.com/m.json#GetMovies");
        assert_eq!(page.source_name, PERSISTED_QUERY_SOURCE_NAME);
        assert_eq!(page.title.as_deref(), Some("GetMovies"));
        assert_eq!(page.format, PageFormat::Md);
        assert!(page.body.contains("Lists movies."));
        assert!(page.body.contains("```graphql"));
    }

    #[test]
    fn manifest_records_tolerate_missing_descriptions() {
        let record: PersistedQueryRecord = serde_json::from_str(
            r#"{"name": "GetMovies", "query": "query GetMovies { movies { title } }"}"#,
        )
        .expect("deserialize");
        assert!(record.description.is_none());
    }
}
