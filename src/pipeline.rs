use crate::MIN_CHUNK_CHARS;
use crate::chunker::{self, ChunkContext, ChunkType, Document};
use crate::config::PipelineConfig;
use crate::fetcher::{self, Fetcher};
use crate::renderer::Renderer;
use crate::state::{PageRecord, PipelineState};
use crate::{extractor, language};
use scraper::Html;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use sysinfo::System;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read url map {path}: {source}")]
    MapRead {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse url map {path}: {source}")]
    MapParse {
        path: String,
        source: serde_json::Error,
    },
}

/// One unit of scheduled work; depth is provenance, not a crawl frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTask {
    pub url: String,
    pub depth: u32,
}

/// The three accepted URL-map shapes, normalised to `(url, depth)` before
/// the pipeline sees them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UrlMap {
    /// `{"urls_by_depth": {"0": [...], "1": [...]}}`; non-numeric depth keys
    /// are ignored and the shallowest depth wins for repeated URLs.
    ByDepth {
        urls_by_depth: BTreeMap<String, Vec<String>>,
    },
    /// `{"url": {...}, ...}` with opaque per-URL metadata; depth 0.
    ByKey(serde_json::Map<String, serde_json::Value>),
    /// `["url", ...]`; depth 0.
    Flat(Vec<String>),
}

impl UrlMap {
    /// Expands to tasks in ascending depth order up to `max_depth`,
    /// deduplicated keeping the first occurrence.
    pub fn into_tasks(self, max_depth: u32) -> Vec<UrlTask> {
        let mut tasks: Vec<UrlTask> = Vec::new();
        match self {
            UrlMap::ByDepth { urls_by_depth } => {
                let mut by_depth: Vec<(u32, Vec<String>)> = urls_by_depth
                    .into_iter()
                    .filter_map(|(key, urls)| key.parse::<u32>().ok().map(|d| (d, urls)))
                    .collect();
                by_depth.sort_by_key(|(depth, _)| *depth);
                for (depth, urls) in by_depth {
                    if depth > max_depth {
                        continue;
                    }
                    tasks.extend(urls.into_iter().map(|url| UrlTask { url, depth }));
                }
            }
            UrlMap::ByKey(map) => {
                tasks.extend(map.into_iter().map(|(url, _)| UrlTask { url, depth: 0 }));
            }
            UrlMap::Flat(urls) => {
                tasks.extend(urls.into_iter().map(|url| UrlTask { url, depth: 0 }));
            }
        }
        let mut seen: HashSet<String> = HashSet::new();
        tasks.retain(|task| seen.insert(task.url.clone()));
        tasks
    }
}

/// The three chunk streams a run produces, concatenated in completion order.
#[derive(Debug, Default)]
pub struct HarvestOutput {
    pub character_chunks: Vec<Document>,
    pub structural_chunks: Vec<Document>,
    pub full_text_chunks: Vec<Document>,
}

/// Fetch-clean-chunk coordinator: bounded worker pool, per-URL task
/// assembly, progress accounting and snapshot files.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    state: Arc<PipelineState>,
    fetcher: Arc<Fetcher>,
    workers: Arc<Semaphore>,
    max_workers: usize,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let max_workers = compute_max_workers();
        let render_permits = (max_workers / 6).max(4);
        let state = Arc::new(PipelineState::new());
        let renderer = Arc::new(Renderer::new(
            config.hosts.clone(),
            config.render_scroll,
            render_permits,
        ));
        let fetcher = Arc::new(Fetcher::new(config.hosts.clone(), state.clone(), renderer));
        Self {
            config: Arc::new(config),
            state,
            fetcher,
            workers: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn state(&self) -> Arc<PipelineState> {
        self.state.clone()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Loads a URL-map file and runs the whole pipeline over it. Failing to
    /// load the file is the only fatal error; everything downstream is
    /// recorded per URL.
    pub async fn run_from_map_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<HarvestOutput, PipelineError> {
        let display = path.as_ref().display().to_string();
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            PipelineError::MapRead {
                path: display.clone(),
                source,
            }
        })?;
        let map: UrlMap =
            serde_json::from_str(&raw).map_err(|source| PipelineError::MapParse {
                path: display,
                source,
            })?;
        let tasks = self.prepare_tasks(map);
        let attempted = !tasks.is_empty();
        let output = self.run(tasks).await;
        if attempted || !self.state.errors_snapshot().is_empty() {
            self.write_snapshots();
        }
        Ok(output)
    }

    /// Normalises a URL map into the task list: depth expansion, first-wins
    /// dedup, extension skips (recorded as `skip-ext`), optional truncation.
    pub fn prepare_tasks(&self, map: UrlMap) -> Vec<UrlTask> {
        let mut tasks = map.into_tasks(self.config.max_depth);
        tasks.retain(|task| {
            if fetcher::has_non_html_extension(&task.url) {
                self.state.record_error(&task.url, "skip-ext");
                false
            } else {
                true
            }
        });
        if let Some(limit) = self.config.limit {
            tasks.truncate(limit);
        }
        info!(urls = tasks.len(), "url map prepared");
        tasks
    }

    /// Processes tasks in batches. A failing or panicking task becomes an
    /// `error_urls` entry and never poisons its batch.
    pub async fn run(&self, tasks: Vec<UrlTask>) -> HarvestOutput {
        let total = tasks.len();
        let progress = Arc::new(AtomicUsize::new(0));
        let batch_size = self
            .config
            .batch_size
            .unwrap_or_else(|| 30.min(self.max_workers * 2))
            .max(1);
        let mut output = HarvestOutput::default();

        for batch in tasks.chunks(batch_size) {
            let mut handles = Vec::with_capacity(batch.len());
            for task in batch {
                let url = task.url.clone();
                let depth = task.depth;
                let config = self.config.clone();
                let state = self.state.clone();
                let fetch = self.fetcher.clone();
                let workers = self.workers.clone();
                let progress = progress.clone();
                let handle = tokio::spawn(async move {
                    let _slot = workers.acquire().await.ok();
                    let result = process_url(&config, &state, &fetch, &url, depth).await;
                    let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(done, total, url = %url, "url processed");
                    result
                });
                handles.push((task.url.clone(), handle));
            }
            let joined = futures::future::join_all(
                handles
                    .into_iter()
                    .map(|(url, handle)| async move { (url, handle.await) }),
            )
            .await;
            for (url, outcome) in joined {
                match outcome {
                    Ok((char_docs, struct_docs, full_docs)) => {
                        let produced =
                            char_docs.len() + struct_docs.len() + full_docs.len() > 0;
                        if produced {
                            self.state.mark_processed(&url);
                            if let Some(target) = self.state.redirect_target(&url) {
                                self.state.mark_processed(&target);
                            }
                        }
                        output.character_chunks.extend(char_docs);
                        output.structural_chunks.extend(struct_docs);
                        output.full_text_chunks.extend(full_docs);
                    }
                    Err(join_error) => {
                        self.state
                            .record_error(&url, &format!("transport: {join_error}"));
                    }
                }
            }
        }
        output
    }

    /// Writes `redirected_urls.json` (when non-empty) and the final
    /// page-counts snapshot. Write failures are logged, never raised.
    pub fn write_snapshots(&self) {
        let redirects = self.state.redirects_snapshot();
        if !redirects.is_empty() {
            write_json("redirected_urls.json", &redirects);
        }
        let snapshot = self.state.page_counts_snapshot();
        write_json("page_character_counts_final.json", &snapshot);
    }
}

fn write_json<T: serde::Serialize>(path: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(source) = std::fs::write(path, json) {
                error!(path, %source, "snapshot write failed");
            }
        }
        Err(source) => error!(path, %source, "snapshot serialisation failed"),
    }
}

/// `min(2 x logical CPUs, (RAM_GB / 2) x CPUs, 200)`. The RAM term is kept
/// fractional until after the multiply, so a 1 GB host with 4 CPUs caps at
/// 2 workers, not 4. When the platform reports no memory total, the RAM
/// term falls back to the CPU term.
fn compute_max_workers() -> usize {
    let system = System::new_all();
    let cpus = system.cpus().len().max(1);
    let cpu_term = cpus * 2;
    let ram_gb = system.total_memory() as f64 / 1e9;
    let ram_term = if ram_gb > 0.0 {
        ((ram_gb / 2.0) * cpus as f64) as usize
    } else {
        cpu_term
    };
    cpu_term.min(ram_term).min(200).max(1)
}

fn split_cached(documents: Vec<Document>) -> (Vec<Document>, Vec<Document>, Vec<Document>) {
    let mut char_docs = Vec::new();
    let mut struct_docs = Vec::new();
    let mut full_docs = Vec::new();
    for document in documents {
        match document.metadata.chunk_type {
            ChunkType::Character => char_docs.push(document),
            ChunkType::Structural => struct_docs.push(document),
            ChunkType::FullText => full_docs.push(document),
        }
    }
    (char_docs, struct_docs, full_docs)
}

/// Per-URL task: cache replay, redirect short-circuit, fetch, then the
/// parse-extract-chunk half in `harvest_html`.
async fn process_url(
    config: &PipelineConfig,
    state: &PipelineState,
    fetcher: &Fetcher,
    url: &str,
    depth: u32,
) -> (Vec<Document>, Vec<Document>, Vec<Document>) {
    if state.is_processed(url) {
        if let Some(cached) = state.cached_documents(url) {
            return split_cached(cached);
        }
    }
    if let Some(target) = state.redirect_target(url) {
        if state.is_processed(&target) {
            state.mark_processed(url);
            return Default::default();
        }
    }

    let Some(html) = fetcher.fetch(url).await else {
        state.mark_processed(url);
        return Default::default();
    };
    harvest_html(config, state, url, depth, &html)
}

/// Everything that happens to a fetched page: parse, extract, language
/// detection, page accounting, the three chunkers, cache fill.
pub(crate) fn harvest_html(
    config: &PipelineConfig,
    state: &PipelineState,
    url: &str,
    depth: u32,
    html: &str,
) -> (Vec<Document>, Vec<Document>, Vec<Document>) {
    let document = Html::parse_document(html);
    let title = extractor::page_title(&document).unwrap_or_else(|| "No title".to_string());
    let (content, sample) = extractor::extract_content(&document, true, &config.content_tags);
    let detected = language::detect_language(&document, &sample, Some(url));

    if content.len() >= MIN_CHUNK_CHARS {
        state.record_page(PageRecord {
            url: url.to_string(),
            title: title.clone(),
            character_count: content.len(),
            word_count: content.split_whitespace().count(),
            language: detected.clone(),
            depth,
        });
    }

    let context = ChunkContext::new(url, &title, depth, &detected);
    let (char_docs, struct_docs, full_docs) = state.with_chunk_sets(|processed, full_text| {
        let char_docs = if content.len() >= MIN_CHUNK_CHARS {
            chunker::create_chunks(
                &content,
                &context,
                ChunkType::Character,
                config.chunk_size,
                config.chunk_overlap,
                processed,
            )
        } else {
            Vec::new()
        };
        let struct_docs = chunker::create_structural_chunks(
            &document,
            &context,
            config.chunk_size,
            config.chunk_overlap,
            processed,
        );
        let full_docs = if content.len() >= MIN_CHUNK_CHARS {
            chunker::create_full_text_document(&content, &context, full_text)
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };
        (char_docs, struct_docs, full_docs)
    });

    let produced = char_docs.len() + struct_docs.len() + full_docs.len() > 0;
    if produced {
        state.mark_processed(url);
        let mut all = char_docs.clone();
        all.extend(struct_docs.iter().cloned());
        all.extend(full_docs.iter().cloned());
        state.cache_documents(url, all);
    }
    (char_docs, struct_docs, full_docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_map_expands_in_order_and_shallowest_wins() {
        let raw = r#"{"urls_by_depth": {"1": ["https://h/a", "https://h/b"], "0": ["https://h/a"]}}"#;
        let map: UrlMap = serde_json::from_str(raw).expect("map");
        let tasks = map.into_tasks(2);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0], UrlTask { url: "https://h/a".into(), depth: 0 });
        assert_eq!(tasks[1], UrlTask { url: "https://h/b".into(), depth: 1 });
    }

    #[test]
    fn depths_beyond_max_are_dropped() {
        let raw = r#"{"urls_by_depth": {"0": ["https://h/a"], "3": ["https://h/deep"]}}"#;
        let map: UrlMap = serde_json::from_str(raw).expect("map");
        let tasks = map.into_tasks(1);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url, "https://h/a");
    }

    #[test]
    fn keyed_and_flat_maps_default_to_depth_zero() {
        let keyed: UrlMap =
            serde_json::from_str(r#"{"https://h/a": {"note": 1}, "https://h/b": {}}"#).expect("map");
        let tasks = keyed.into_tasks(0);
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.depth == 0));

        let flat: UrlMap = serde_json::from_str(r#"["https://h/a", "https://h/a"]"#).expect("map");
        let tasks = flat.into_tasks(0);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn non_numeric_depth_keys_are_ignored() {
        let raw = r#"{"urls_by_depth": {"0": ["https://h/a"], "meta": ["https://h/x"]}}"#;
        let map: UrlMap = serde_json::from_str(raw).expect("map");
        let tasks = map.into_tasks(5);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn worker_formula_is_bounded() {
        let workers = compute_max_workers();
        assert!(workers >= 1);
        assert!(workers <= 200);
    }
}
