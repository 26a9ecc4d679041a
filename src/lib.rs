//! Concurrent fetch-clean-chunk pipeline for a research-centre web estate.
//!
//! Feed it a URL map (three accepted JSON shapes), and it fetches every page
//! with a per-host adaptive HTTP client (falling back to a headless-browser
//! renderer behind the `real_rendering` feature), strips the HTML down to
//! readable body text through a priority-ordered noise-pattern catalogue,
//! and emits three parallel chunk streams: character-windowed, structural
//! and whole-page full text. Every chunk carries provenance metadata and is
//! deduplicated by content hash and canonical URL.

#[cfg(test)]
mod tests;

pub mod chunker;
pub mod cleaner;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod language;
pub mod patterns;
pub mod pipeline;
pub mod renderer;
pub mod state;

/// Shortest cleaned text a chunk or page record may carry.
pub const MIN_CHUNK_CHARS: usize = 30;
/// Shortest element text the structural chunker considers a section seed.
pub const MIN_INITIAL_CHARS: usize = 20;
/// Shortest text sample worth running statistical language detection on;
/// also the visible-text floor below which a page counts as an error page.
pub const MIN_TEXT_SAMPLE_LENGTH: usize = 50;

pub use chunker::{ChunkContext, ChunkType, Document, DocumentMetadata};
pub use config::{HostConfig, HostTable, PipelineConfig};
pub use pipeline::{HarvestOutput, Pipeline, PipelineError, UrlMap, UrlTask};
pub use renderer::{RenderError, Rendered, Renderer};
pub use state::{PageRecord, PipelineState};
