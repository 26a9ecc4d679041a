use crate::cleaner::{self, element_text};
use crate::patterns;
use crate::{MIN_CHUNK_CHARS, MIN_TEXT_SAMPLE_LENGTH};
use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

// Navigation, legal, social and sharing containers pruned from the whole
// document before block iteration.
static PRE_PRUNE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(concat!(
        r#"[id*="nav" i], [class*="nav" i], "#,
        r#"[id*="menu" i], [class*="menu" i], "#,
        r#"[id*="sidebar" i], [class*="sidebar" i], "#,
        r#"[id*="quicklinks" i], [class*="quicklinks" i], "#,
        r#"p.copyright, div.copyright, footer, "#,
        r#"[class*="footer" i], [id*="footer" i], "#,
        r#"[class*="impressum" i], [id*="impressum" i], "#,
        r#"[class*="datenschutz" i], [id*="datenschutz" i], "#,
        r#"[class*="legal" i], [id*="legal" i], "#,
        r#"[class*="social" i], [id*="social" i], "#,
        r#"[class*="share" i], [id*="share" i], "#,
        r#"[class*="links" i], [id*="links" i], "#,
        r#"[class*="bottom" i], [id*="bottom" i], "#,
        r#"[class*="contact" i], [id*="contact" i], "#,
        r#"[class*="mastodon" i], [class*="facebook" i], "#,
        r#"[class*="instagram" i], [class*="linkedin" i], "#,
        r#"[class*="twitter" i], [class*="rss" i], "#,
        r#"a[href*="impressum"], a[href*="datenschutz"], "#,
        r#"a[href*="privacy"], a[href*="accessibility"], "#,
        r#"a[href*="kontakt"], a[href*="contact"], "#,
        r#"a[href*="social"], a[href*="linkedin"], "#,
        r#"a[href*="twitter"], a[href*="facebook"], "#,
        r#"a[href*="instagram"], a[href*="mastodon"], "#,
        r#"a[href*="rss"]"#
    ))
    .expect("pre-prune selector")
});

// Block candidates, finest first; the ancestor-processed guard keeps coarse
// wrappers from swallowing blocks already emitted by an earlier tag.
const COMPREHENSIVE_TAGS: [&str; 39] = [
    "p[id]",
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "div.content-section",
    "div.module",
    "div.text",
    "div.content",
    "div.text-block",
    "div.main-content",
    "div.publication-item",
    "div.news-item",
    "div.event-details",
    "div.news-content",
    "div.status-report",
    "div.status",
    "div.monitor",
    "div.teaser-text",
    "div.portlet-body",
    "div.indico-content",
    "div.publication-list",
    "div.event-description",
    "div.experiment",
    "div.results",
    "div.timetable",
    "table",
    "table.i-table",
    "caption",
    "td",
    "th",
    "tr",
    "section",
    "article",
    "main",
    "span",
];
// "div" last: by then every meaningful block inside it is already marked.
const COARSE_TAGS: [&str; 1] = ["div"];

static SKIP_IDS: [&str; 4] = ["cookie-bar", "footer", "page-footer", "site-footer"];
static SKIP_CLASSES: [&str; 8] = [
    "cookie-bar",
    "LinkElementTitle",
    "ZMSTeaserContainer",
    "footer",
    "copyright",
    "link",
    "site-footer",
    "ZMSDocument0",
];
static FOOTER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(footer|page-footer|site-footer)").expect("footer id pattern"));

/// Extracts the semantically meaningful body text of a parsed page.
///
/// Returns `(content, sample)`; the sample equals the content and feeds
/// language detection. `use_tags` is accepted for call-site parity and has
/// no observable effect; `extra_tags` are caller-supplied block selectors
/// appended to the built-in list.
pub fn extract_content(document: &Html, _use_tags: bool, extra_tags: &[String]) -> (String, String) {
    let pruned = prune_navigation(document);

    let mut processed: HashSet<NodeId> = HashSet::new();
    let mut seen_hashes: HashSet<String> = HashSet::new();
    let mut parts: Vec<String> = Vec::new();

    let tag_selectors = COMPREHENSIVE_TAGS
        .iter()
        .copied()
        .chain(extra_tags.iter().map(String::as_str))
        .chain(COARSE_TAGS.iter().copied());
    for tag in tag_selectors {
        let Ok(selector) = Selector::parse(tag) else {
            continue;
        };
        for element in document.select(&selector) {
            if element.descendants().any(|d| processed.contains(&d.id()))
                || element.ancestors().any(|a| processed.contains(&a.id()))
                || element.ancestors().any(|a| pruned.contains(&a.id()))
                || pruned.contains(&element.id())
                || should_skip_element(&element)
            {
                continue;
            }

            let cleaned = cleaner::clean_content(&element.html());
            let cleaned = patterns::scrub_html(&cleaned);
            if cleaned.len() < MIN_CHUNK_CHARS {
                continue;
            }

            let fingerprint = normalized_hash(&cleaned);
            if !seen_hashes.insert(fingerprint) {
                continue;
            }
            for descendant in element.descendants() {
                processed.insert(descendant.id());
            }
            parts.push(cleaned);
        }
    }

    let joined = parts.join("\n");
    let content = if patterns::contains_markup(&joined) {
        cleaner::finish_text(&cleaner::extract_visible_text(&joined))
    } else {
        cleaner::finish_text(&joined)
    };
    (content.clone(), content)
}

/// MD5 of the lowercased, whitespace-normalised text.
pub fn normalized_hash(text: &str) -> String {
    let normalized = patterns::collapse_whitespace(&text.to_lowercase());
    format!("{:x}", md5::compute(normalized.as_bytes()))
}

fn prune_navigation(document: &Html) -> HashSet<NodeId> {
    let mut pruned = HashSet::new();
    for element in document.select(&PRE_PRUNE_SELECTOR) {
        for node in element.descendants() {
            pruned.insert(node.id());
        }
    }
    pruned
}

fn should_skip_element(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if value.attr("id").is_some_and(|id| SKIP_IDS.contains(&id)) {
        return true;
    }
    if value
        .classes()
        .any(|class| SKIP_CLASSES.contains(&class))
    {
        return true;
    }
    if value.name() == "li" {
        return true;
    }
    element.ancestors().any(|a| {
        a.value().as_element().is_some_and(|e| {
            e.name() == "li" || e.attr("id").is_some_and(|id| FOOTER_ID.is_match(id))
        })
    })
}

static LOGIN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)log\s*in|sign\s*in").expect("login pattern"));
static AUTH_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)log\s*in|sign\s*in|authenticate").expect("auth pattern"));
static PUBLISH_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)error.*encountered.*publishing").expect("publish error pattern"));

static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("form").expect("form"));
static PASSWORD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"input[name="username"], input[name="password"][type="password"]"#)
        .expect("credential inputs")
});
static LOGIN_BOX_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.login-box, div.auth-form").expect("login box"));
static BUTTONISH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("button, input[value], a").expect("buttons"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("title"));
static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3").expect("headings"));

const ERROR_PHRASES: [&str; 9] = [
    "not found",
    "page doesn't exist",
    "404",
    "page not found",
    "does not exist",
    "could not be found",
    "site error",
    "error was encountered",
    "error occurred",
];

/// True when the page is a login gate: a login-typed form, a credential
/// input, or a login-intent button/anchor.
pub fn is_login_page(document: &Html) -> bool {
    if page_title(document).is_some_and(|t| LOGIN_TEXT.is_match(&t)) {
        return true;
    }
    for form in document.select(&FORM_SELECTOR) {
        let value = form.value();
        let id_hit = value
            .attr("id")
            .is_some_and(|id| id.to_lowercase().contains("login"));
        let action_hit = value
            .attr("action")
            .is_some_and(|action| action.to_lowercase().contains("login"));
        if id_hit || action_hit {
            return true;
        }
    }
    if document.select(&PASSWORD_SELECTOR).next().is_some() {
        return true;
    }
    if document.select(&LOGIN_BOX_SELECTOR).next().is_some() {
        return true;
    }
    document.select(&BUTTONISH_SELECTOR).any(|el| {
        let by_text = AUTH_TEXT.is_match(&element_text(&el));
        let by_value = el
            .value()
            .attr("value")
            .is_some_and(|v| LOGIN_TEXT.is_match(v));
        by_text || by_value
    })
}

/// True for 404/error pages: error phrases in the title, headings or body,
/// or a body with almost no visible text.
pub fn is_error_page(document: &Html) -> bool {
    if let Some(title) = page_title(document) {
        let lowered = title.to_lowercase();
        if ERROR_PHRASES.iter().any(|p| lowered.contains(p)) {
            return true;
        }
    }
    let page_text = visible_text(document);
    let lowered = page_text.to_lowercase();
    if PUBLISH_ERROR.is_match(&lowered) {
        return true;
    }
    for heading in document.select(&HEADING_SELECTOR) {
        let text = element_text(&heading).to_lowercase();
        if ERROR_PHRASES.iter().any(|p| text.contains(p)) {
            return true;
        }
    }
    if ERROR_PHRASES.iter().any(|p| lowered.contains(p)) {
        return true;
    }
    page_text.len() < MIN_TEXT_SAMPLE_LENGTH
}

pub fn page_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| element_text(&t))
        .filter(|t| !t.is_empty())
}

/// Concatenated visible text of the whole document, segments trimmed.
pub fn visible_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

static PUBLICATION_LIST_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("ul.publication-list, ol.publication-list, dl.publication-list, ul.pub-list, ol.pub-list, dl.pub-list")
        .expect("publication list selector")
});
static LIST_ITEM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li, dt, dd").expect("list item selector"));
static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("table"));
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row"));
static CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").expect("cell"));

const BIBLIO_KEYWORDS: [&str; 9] = [
    "author", "title", "journal", "doi", "isbn", "vol", "pp", "year", "20",
];
const TABLE_KEYWORDS: [&str; 7] = [
    "author",
    "title",
    "journal",
    "publication",
    "presenter",
    "date",
    "conference",
];

/// Flattens publication-style lists into newline-separated records, keeping
/// only items that look bibliographic.
pub fn extract_list_metadata(document: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();
    for list in document.select(&PUBLICATION_LIST_SELECTOR) {
        let items: Vec<_> = list.select(&LIST_ITEM_SELECTOR).collect();
        if items.len() <= 1 {
            continue;
        }
        let mut records: Vec<String> = Vec::new();
        for item in &items {
            let text = element_text(item);
            if text.len() > 10 {
                let lowered = text.to_lowercase();
                if BIBLIO_KEYWORDS.iter().any(|k| lowered.contains(k)) {
                    records.push(text);
                }
            }
        }
        if records.len() > 2 {
            parts.extend(records);
        }
    }
    parts.join("\n")
}

/// Flattens metadata-bearing tables into `cell | cell | cell` rows.
pub fn extract_table_metadata(document: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();
    for table in document.select(&TABLE_SELECTOR) {
        let rows: Vec<_> = table.select(&ROW_SELECTOR).collect();
        if rows.len() < 2 {
            continue;
        }
        let table_text = element_text(&table).to_lowercase();
        let is_biblio = TABLE_KEYWORDS.iter().any(|k| table_text.contains(k));
        for row in &rows {
            let cells: Vec<String> = row
                .select(&CELL_SELECTOR)
                .map(|c| element_text(&c))
                .filter(|t| !t.is_empty())
                .collect();
            if cells.len() < 2 {
                continue;
            }
            if is_biblio {
                let kept: Vec<_> = cells.iter().filter(|t| t.len() > 3).cloned().collect();
                if !kept.is_empty() {
                    parts.push(kept.join(" | "));
                }
            } else if cells.iter().any(|t| t.len() > 15) {
                parts.push(cells.join(" | "));
            }
        }
    }
    parts.join("\n")
}
