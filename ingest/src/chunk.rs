use common::{error::AppError, storage::page::Page};

/// A chunk of page content on its way to the embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub url: String,
    pub source_name: String,
    pub text: String,
    pub chunk_index: u32,
    pub token_count: u32,
}

/// Transform applied to every chunk's front matter during ingestion.
pub type ChunkTransform = fn(&Page, Chunk) -> Result<Chunk, AppError>;

/// Chunking knobs handed to the ingestion runner.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub transform: ChunkTransform,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        ChunkOptions {
            transform: standard_chunk_front_matter_updater,
        }
    }
}

/// Keys this module owns in a chunk's front matter.
const STANDARD_KEYS: [&str; 3] = ["pageTitle", "sourceName", "pageUrl"];

/// Rewrites the chunk's YAML front-matter block so every chunk carries its
/// page context. Existing non-standard keys written by the chunker are kept;
/// standard keys are replaced, which makes the update idempotent.
pub fn standard_chunk_front_matter_updater(
    page: &Page,
    mut chunk: Chunk,
) -> Result<Chunk, AppError> {
    let (existing, body) = split_front_matter(&chunk.text);

    let mut lines: Vec<String> = Vec::new();
    if let Some(title) = &page.title {
        lines.push(format!("pageTitle: {title}"));
    }
    lines.push(format!("sourceName: {}", page.source_name));
    lines.push(format!("pageUrl: {}", page.url));
    for line in existing {
        if !is_standard_key(&line) {
            lines.push(line);
        }
    }

    chunk.text = format!("---\n{}\n---\n{body}", lines.join("\n"));
    Ok(chunk)
}

fn is_standard_key(line: &str) -> bool {
    STANDARD_KEYS
        .iter()
        .any(|key| line.trim_start().starts_with(&format!("{key}:")))
}

/// Splits `text` into its front-matter lines and the remaining body. Text
/// without a leading front-matter block comes back unchanged as the body.
fn split_front_matter(text: &str) -> (Vec<String>, String) {
    let Some(rest) = text.strip_prefix("---\n") else {
        return (Vec::new(), text.to_string());
    };

    match rest.split_once("\n---\n") {
        Some((front, body)) => (
            front.lines().map(str::to_string).collect(),
            body.to_string(),
        ),
        None => (Vec::new(), text.to_string()),
    }
}
