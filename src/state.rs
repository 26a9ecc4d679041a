use crate::chunker::Document;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Soft cap on tracked URLs.
pub const MAX_TRACKED_URLS: usize = 10_000;
/// Soft cap on each fingerprint pool.
pub const MAX_TRACKED_HASHES: usize = 100_000;

/// Insertion-ordered set with a soft capacity bound: when full, the oldest
/// half is evicted. The bound is a memory cap, not a correctness property.
#[derive(Debug)]
pub struct BoundedHashSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl BoundedHashSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Inserts a value, evicting the oldest half first when at capacity.
    /// Returns false if the value was already present.
    pub fn insert(&mut self, value: String) -> bool {
        if self.members.contains(&value) {
            return false;
        }
        if self.members.len() >= self.capacity {
            for _ in 0..self.capacity / 2 {
                if let Some(evicted) = self.order.pop_front() {
                    self.members.remove(&evicted);
                }
            }
        }
        self.order.push_back(value.clone());
        self.members.insert(value);
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.members.contains(value)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Per-page accounting for pages whose cleaned body met the chunk threshold.
#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub character_count: usize,
    pub word_count: usize,
    pub language: String,
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageStats {
    pub pages: usize,
    pub characters: usize,
    pub words: usize,
}

#[derive(Debug, Serialize)]
pub struct PageCountsSummary {
    pub total_pages: usize,
    pub total_characters: usize,
    pub total_words: usize,
    pub average_characters_per_page: f64,
    pub language_breakdown: BTreeMap<String, LanguageStats>,
}

#[derive(Debug, Serialize)]
pub struct PageCountsSnapshot {
    pub timestamp: String,
    pub summary: PageCountsSummary,
    pub pages: Vec<PageRecord>,
}

struct StateInner {
    processed_urls: BoundedHashSet,
    processed_hashes: BoundedHashSet,
    full_text_hashes: BoundedHashSet,
    redirected_urls: HashMap<String, String>,
    error_urls: HashMap<String, String>,
    url_to_documents: HashMap<String, Vec<Document>>,
    page_counts: BTreeMap<String, PageRecord>,
}

/// Single owner of all shared pipeline bookkeeping. Every map lives behind
/// one mutex and is reached only through the operations below; the lock is
/// never held across a suspension point.
pub struct PipelineState {
    inner: Mutex<StateInner>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StateInner {
                processed_urls: BoundedHashSet::new(MAX_TRACKED_URLS),
                processed_hashes: BoundedHashSet::new(MAX_TRACKED_HASHES),
                full_text_hashes: BoundedHashSet::new(MAX_TRACKED_HASHES),
                redirected_urls: HashMap::new(),
                error_urls: HashMap::new(),
                url_to_documents: HashMap::new(),
                page_counts: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateInner> {
        // A poisoned lock means a chunker panicked mid-update; the sets only
        // ever grow, so the data is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mark_processed(&self, url: &str) {
        self.lock().processed_urls.insert(url.to_string());
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.lock().processed_urls.contains(url)
    }

    pub fn record_error(&self, url: &str, reason: &str) {
        self.lock()
            .error_urls
            .insert(url.to_string(), reason.to_string());
    }

    pub fn clear_error(&self, url: &str) {
        self.lock().error_urls.remove(url);
    }

    pub fn error_for(&self, url: &str) -> Option<String> {
        self.lock().error_urls.get(url).cloned()
    }

    pub fn errors_snapshot(&self) -> HashMap<String, String> {
        self.lock().error_urls.clone()
    }

    pub fn remember_redirect(&self, from: &str, to: &str) {
        self.lock()
            .redirected_urls
            .insert(from.to_string(), to.to_string());
    }

    pub fn redirect_target(&self, url: &str) -> Option<String> {
        self.lock().redirected_urls.get(url).cloned()
    }

    pub fn redirects_snapshot(&self) -> BTreeMap<String, String> {
        self.lock().redirected_urls.clone().into_iter().collect()
    }

    pub fn cache_documents(&self, url: &str, documents: Vec<Document>) {
        self.lock()
            .url_to_documents
            .insert(url.to_string(), documents);
    }

    pub fn cached_documents(&self, url: &str) -> Option<Vec<Document>> {
        self.lock().url_to_documents.get(url).cloned()
    }

    pub fn record_page(&self, record: PageRecord) {
        self.lock().page_counts.insert(record.url.clone(), record);
    }

    pub fn page_record(&self, url: &str) -> Option<PageRecord> {
        self.lock().page_counts.get(url).cloned()
    }

    /// Runs `f` with exclusive access to both fingerprint pools
    /// (character/structural first, full-text second).
    pub fn with_chunk_sets<R>(
        &self,
        f: impl FnOnce(&mut BoundedHashSet, &mut BoundedHashSet) -> R,
    ) -> R {
        let mut inner = self.lock();
        let StateInner {
            processed_hashes,
            full_text_hashes,
            ..
        } = &mut *inner;
        f(processed_hashes, full_text_hashes)
    }

    /// Assembles the final page-counts snapshot with per-language totals.
    pub fn page_counts_snapshot(&self) -> PageCountsSnapshot {
        let inner = self.lock();
        let pages: Vec<PageRecord> = inner.page_counts.values().cloned().collect();
        let total_pages = pages.len();
        let total_characters: usize = pages.iter().map(|p| p.character_count).sum();
        let total_words: usize = pages.iter().map(|p| p.word_count).sum();
        let mut language_breakdown: BTreeMap<String, LanguageStats> = BTreeMap::new();
        for page in &pages {
            let stats = language_breakdown
                .entry(page.language.clone())
                .or_insert(LanguageStats {
                    pages: 0,
                    characters: 0,
                    words: 0,
                });
            stats.pages += 1;
            stats.characters += page.character_count;
            stats.words += page.word_count;
        }
        let average = if total_pages > 0 {
            (total_characters as f64 / total_pages as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };
        PageCountsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            summary: PageCountsSummary {
                total_pages,
                total_characters,
                total_words,
                average_characters_per_page: average,
                language_breakdown,
            },
            pages,
        }
    }
}
