use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::StoreDescriptor;

/// Raw ingested page content, persisted before chunking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub source_name: String,
    pub title: Option<String>,
    pub body: String,
    pub format: PageFormat,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub action: PageAction,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    #[default]
    Md,
    Html,
    Txt,
}

impl PageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageFormat::Md => "md",
            PageFormat::Html => "html",
            PageFormat::Txt => "txt",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "md" => Ok(PageFormat::Md),
            "html" => Ok(PageFormat::Html),
            "txt" => Ok(PageFormat::Txt),
            other => Err(AppError::Validation(format!(
                "unknown page format '{other}'"
            ))),
        }
    }
}

/// Lifecycle marker recorded alongside a persisted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageAction {
    #[default]
    Created,
    Updated,
    Deleted,
}

impl PageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageAction::Created => "created",
            PageAction::Updated => "updated",
            PageAction::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "created" => Ok(PageAction::Created),
            "updated" => Ok(PageAction::Updated),
            "deleted" => Ok(PageAction::Deleted),
            other => Err(AppError::Validation(format!(
                "unknown page action '{other}'"
            ))),
        }
    }
}

/// Filter for [`PageStore::load_pages`]. The default loads everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageQuery<'a> {
    pub source_name: Option<&'a str>,
    pub updated_since: Option<DateTime<Utc>>,
}

/// Persistent store for raw ingested pages, keyed by `(url, source_name)`.
#[async_trait]
pub trait PageStore: Send + Sync {
    fn descriptor(&self) -> StoreDescriptor;

    async fn load_pages(&self, query: PageQuery<'_>) -> Result<Vec<Page>, AppError>;

    /// Upserts the batch; returns the number of pages written.
    async fn update_pages(&self, pages: &[Page]) -> Result<u64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_round_trips_through_labels() {
        for format in [PageFormat::Md, PageFormat::Html, PageFormat::Txt] {
            assert_eq!(PageFormat::parse(format.as_str()).expect("parse"), format);
        }
        assert!(PageFormat::parse("pdf").is_err());
    }

    #[test]
    fn action_round_trips_through_labels() {
        for action in [PageAction::Created, PageAction::Updated, PageAction::Deleted] {
            assert_eq!(PageAction::parse(action.as_str()).expect("parse"), action);
        }
        assert!(PageAction::parse("archived").is_err());
    }
}
