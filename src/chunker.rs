use crate::state::BoundedHashSet;
use crate::{cleaner, extractor, patterns};
use crate::{MIN_CHUNK_CHARS, MIN_INITIAL_CHARS};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Chunk family; selects the strategy that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Character,
    Structural,
    FullText,
}

/// One unit of cleaned text with provenance, the atomic record handed to
/// downstream indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    pub title: String,
    pub depth: u32,
    pub language: String,
    pub chunk_type: ChunkType,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_level: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continued: bool,
}

/// Page-level provenance shared by every chunk of one URL.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub source: String,
    pub title: String,
    pub depth: u32,
    pub language: String,
    pub section_title: Option<String>,
    pub section_level: Option<u32>,
}

impl ChunkContext {
    pub fn new(source: &str, title: &str, depth: u32, language: &str) -> Self {
        Self {
            source: source.to_string(),
            title: title.to_string(),
            depth,
            language: language.to_string(),
            section_title: None,
            section_level: None,
        }
    }

    fn with_section(&self, title: &str, level: u32) -> Self {
        let mut ctx = self.clone();
        ctx.section_title = Some(title.to_string());
        ctx.section_level = Some(level);
        ctx
    }

    fn metadata(&self, chunk_type: ChunkType, index: usize, total: usize) -> DocumentMetadata {
        DocumentMetadata {
            source: self.source.clone(),
            title: self.title.clone(),
            depth: self.depth,
            language: self.language.clone(),
            chunk_type,
            chunk_index: index,
            total_chunks: total,
            section_title: self.section_title.clone(),
            section_level: self.section_level,
            continued: index > 0,
        }
    }
}

static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+|[.!?]$|\n\s*\n").expect("sentence boundary pattern"));

fn prev_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn next_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Splits text into windows of at most `max_size` bytes, preferring a
/// sentence terminator in the rightmost 30% of each window and falling back
/// to the last space. Consecutive windows overlap by roughly `overlap`
/// bytes, nudged forward to the next word boundary.
pub fn split_text_by_size(
    text: &str,
    max_size: usize,
    overlap: usize,
    min_chars: usize,
) -> Vec<String> {
    if text.len() <= max_size {
        return if text.trim().len() >= min_chars {
            vec![text.to_string()]
        } else {
            Vec::new()
        };
    }
    let min_chunk_size = (max_size / 2).max(max_size.saturating_sub(overlap)).max(1);
    let len = text.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = prev_char_boundary(text, (start + max_size).min(len));
        if end < len {
            let search_start = next_char_boundary(
                text,
                (end.saturating_sub((max_size as f64 * 0.3) as usize)).max(start + min_chunk_size),
            )
            .min(end);
            let zone = &text[search_start..end];
            if let Some(found) = SENTENCE_BOUNDARY.find_iter(zone).last() {
                let trailing = found.as_str().trim_start_matches(['.', '!', '?']).len();
                end = search_start + found.end() - trailing;
            } else if let Some(space) = zone.rfind(' ') {
                let boundary = search_start + space;
                if boundary > start {
                    end = boundary;
                }
            }
        }

        let chunk = text[start..end].trim();
        if chunk.len() >= min_chars {
            chunks.push(chunk.to_string());
        }
        if end >= len {
            break;
        }

        let ideal_next = next_char_boundary(text, end.saturating_sub(overlap));
        start = if ideal_next <= start {
            next_char_boundary(text, start + min_chunk_size)
        } else {
            match text[ideal_next..].find(' ') {
                Some(pos) if ideal_next + pos < end => ideal_next + pos + 1,
                _ => ideal_next,
            }
        };
    }
    chunks
}

// Fingerprints hash the normalised chunk and the section title as separate
// fields, not one concatenated string.
fn chunk_fingerprint(chunk: &str, section_title: &str) -> String {
    let normalized = patterns::collapse_whitespace(&chunk.trim().to_lowercase());
    let mut context = md5::Context::new();
    context.consume(normalized.as_bytes());
    context.consume([0u8]);
    context.consume(section_title.as_bytes());
    format!("{:x}", context.compute())
}

pub fn content_hash(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Character-window chunker.
///
/// The window runs over the input text as given; the cleaned text only gates
/// emission. Duplicate windows are dropped twice over: per call by the
/// fingerprint of (normalised chunk, section title), and globally by content
/// hash against `processed_hashes`.
pub fn create_chunks(
    text: &str,
    context: &ChunkContext,
    chunk_type: ChunkType,
    chunk_size: usize,
    chunk_overlap: usize,
    processed_hashes: &mut BoundedHashSet,
) -> Vec<Document> {
    if text.is_empty() {
        return Vec::new();
    }
    let cleaned = cleaner::clean_content(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let windows = split_text_by_size(text, chunk_size, chunk_overlap, MIN_CHUNK_CHARS);
    let section_title = context.section_title.as_deref().unwrap_or("");
    let total = windows.len();
    let mut fingerprints: HashSet<String> = HashSet::new();
    let mut documents = Vec::new();

    for (index, window) in windows.iter().enumerate() {
        if !fingerprints.insert(chunk_fingerprint(window, section_title)) {
            continue;
        }
        if !processed_hashes.insert(content_hash(window)) {
            continue;
        }
        documents.push(Document {
            content: window.clone(),
            metadata: context.metadata(chunk_type, index, total),
        });
    }
    documents
}

/// Full-text chunker: one whole-page document per URL, deduplicated across
/// URLs by body hash.
pub fn create_full_text_document(
    content: &str,
    context: &ChunkContext,
    full_text_hashes: &mut BoundedHashSet,
) -> Option<Document> {
    if content.len() < MIN_CHUNK_CHARS {
        return None;
    }
    if !full_text_hashes.insert(content_hash(content)) {
        return None;
    }
    Some(Document {
        content: content.to_string(),
        metadata: context.metadata(ChunkType::FullText, 0, 1),
    })
}

const HEADER_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").expect("heading selector"));
static FLOW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5, h6, p, li, td").expect("flow selector"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("body selector"));

// Coarse to fine; the ancestor guard stops nested re-emission.
const SECTION_TAGS: [&str; 46] = [
    "section",
    "article",
    "main",
    "div.content-section",
    "div.module",
    "div.text",
    "div.content",
    "div.text-block",
    "div.main-content",
    "div.container",
    "div.row",
    "div.card",
    "div.content-main",
    "div.teaser-text",
    "div.publication-item",
    "div.news-item",
    "div.portlet-body",
    "div.event-details",
    "div.indico-content",
    "div.publication-list",
    "div.event-description",
    "div.news-content",
    "div.status-report",
    "div.status",
    "div.monitor",
    "div.experiment",
    "div.results",
    "div.timetable",
    "p",
    "p[id]",
    "span",
    "table",
    "table.i-table",
    "caption",
    "td",
    "th",
    "tr",
    "ul",
    "ol",
    "li",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
];

struct Section {
    title: String,
    content: Vec<String>,
    level: u32,
}

/// Structural chunker. Pass 1 slices the page along an ordered selector
/// list; pass 2 (if pass 1 emits nothing) rebuilds sections from the heading
/// hierarchy; pass 3 (last resort) treats the whole body as one section.
/// Login and error pages yield nothing.
pub fn create_structural_chunks(
    document: &Html,
    context: &ChunkContext,
    chunk_size: usize,
    chunk_overlap: usize,
    processed_hashes: &mut BoundedHashSet,
) -> Vec<Document> {
    if extractor::is_login_page(document) || extractor::is_error_page(document) {
        return Vec::new();
    }
    let page_title = extractor::page_title(document).unwrap_or_else(|| "No title".to_string());

    let mut chunks = selector_sections(
        document,
        context,
        &page_title,
        chunk_size,
        chunk_overlap,
        processed_hashes,
    );
    if chunks.is_empty() {
        chunks = heading_sections(document, context, chunk_size, chunk_overlap, processed_hashes);
    }
    if chunks.is_empty() {
        let body_text = document
            .select(&BODY_SELECTOR)
            .next()
            .map(|b| cleaner::element_text(&b))
            .unwrap_or_else(|| extractor::visible_text(document));
        if !body_text.is_empty() {
            let ctx = context.with_section(&page_title, 0);
            chunks = create_chunks(
                &body_text,
                &ctx,
                ChunkType::Structural,
                chunk_size,
                chunk_overlap,
                processed_hashes,
            );
        }
    }
    chunks
}

fn selector_sections(
    document: &Html,
    context: &ChunkContext,
    page_title: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    processed_hashes: &mut BoundedHashSet,
) -> Vec<Document> {
    let mut processed: HashSet<ego_tree::NodeId> = HashSet::new();
    let mut chunks = Vec::new();

    for tag in SECTION_TAGS {
        let Ok(selector) = Selector::parse(tag) else {
            continue;
        };
        for element in document.select(&selector) {
            if processed.contains(&element.id())
                || element.ancestors().any(|a| processed.contains(&a.id()))
            {
                continue;
            }
            let text = cleaner::element_text(&element);
            if text.len() <= MIN_INITIAL_CHARS {
                continue;
            }
            for descendant in element.descendants() {
                processed.insert(descendant.id());
            }
            let section_title = element
                .select(&HEADING_SELECTOR)
                .next()
                .map(|h| cleaner::element_text(&h))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| page_title.to_string());
            let section = Section {
                title: section_title,
                content: vec![text],
                level: 1,
            };
            chunks.extend(section_to_chunks(
                &section,
                context,
                chunk_size,
                chunk_overlap,
                processed_hashes,
            ));
        }
    }
    chunks
}

fn heading_sections(
    document: &Html,
    context: &ChunkContext,
    chunk_size: usize,
    chunk_overlap: usize,
    processed_hashes: &mut BoundedHashSet,
) -> Vec<Document> {
    let mut active: BTreeMap<u32, Section> = BTreeMap::new();
    let mut chunks = Vec::new();

    for element in document.select(&FLOW_SELECTOR) {
        let name = element.value().name();
        let text = cleaner::element_text(&element);
        if text.is_empty() {
            continue;
        }
        if HEADER_TAGS.contains(&name) {
            let level = name[1..].parse::<u32>().unwrap_or(6);
            let flushed: Vec<u32> = active.range(level..).map(|(l, _)| *l).collect();
            for l in flushed {
                if let Some(section) = active.remove(&l) {
                    chunks.extend(section_to_chunks(
                        &section,
                        context,
                        chunk_size,
                        chunk_overlap,
                        processed_hashes,
                    ));
                }
            }
            active.insert(
                level,
                Section {
                    title: text,
                    content: Vec::new(),
                    level,
                },
            );
        } else if let Some((_, section)) = active.iter_mut().next_back() {
            section.content.push(text);
        }
    }

    for (_, section) in active {
        chunks.extend(section_to_chunks(
            &section,
            context,
            chunk_size,
            chunk_overlap,
            processed_hashes,
        ));
    }
    chunks
}

fn section_to_chunks(
    section: &Section,
    context: &ChunkContext,
    chunk_size: usize,
    chunk_overlap: usize,
    processed_hashes: &mut BoundedHashSet,
) -> Vec<Document> {
    if section.content.is_empty() {
        return Vec::new();
    }
    let content_text = section.content.join("\n");
    let full_text = if section.title.is_empty() {
        content_text
    } else {
        format!("{}\n\n{}", section.title, content_text)
    };
    let full_text = full_text.trim().to_string();
    if full_text.len() < MIN_CHUNK_CHARS {
        return Vec::new();
    }
    // Section text is already tag-free, so cleaning reduces to the text
    // normalisation passes of the cleaner.
    let cleaned = cleaner::clean_content(&full_text);
    if cleaned.is_empty() {
        return Vec::new();
    }
    let ctx = context.with_section(&section.title, section.level);
    create_chunks(
        &cleaned,
        &ctx,
        ChunkType::Structural,
        chunk_size,
        chunk_overlap,
        processed_hashes,
    )
}
