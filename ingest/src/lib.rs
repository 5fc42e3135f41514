#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunk;
pub mod config;
pub mod data_sources;

pub use crate::config::{IngestConfig, INGEST_META_ENTRY_ID};
