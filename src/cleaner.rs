use crate::patterns;
use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

// Main-content candidates, tried in order; first match wins. Falls through
// to <body>, then the document root.
static MAIN_CONTENT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "main",
        "article",
        r#"section[class*="content"]"#,
        r#"div[class*="main-content"]"#,
        r#"div[class*="content-section"]"#,
        r#"div[class*="text-block"]"#,
        r#"div[id="content"]"#,
        r#"div[id="main"]"#,
        r#"div[id="bodyContent"]"#,
        r#"div[class*="content"]"#,
        r#"div[class*="text"]"#,
        r#"div[class*="body"]"#,
        r#"div[class*="page"]"#,
        r#"div[class*="container"]"#,
        "center",
    ]
    .iter()
    .filter_map(|s| Selector::parse(s).ok())
    .collect()
});

// Structural noise removed from both the main node and the full document.
static NOISE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        r#"div[id="overall"]"#,
        r#"div[class="wrapper"]"#,
        r#"header[id="header"]"#,
        r#"div[id="mobile_menu_header"]"#,
        r#"div[id="mobile_menu"]"#,
        r#"div[id="mobile_dropdown"]"#,
        r#"div[id="top"]"#,
        r#"div[id="logoarea"]"#,
        r#"div[id="topleft"]"#,
        r#"div[id="topright"]"#,
        r#"div[id="topmenu"]"#,
        r#"nav[id="menu"]"#,
        r#"ul[id="main_menu"]"#,
        "nav",
        r#"ul[id*="menu" i]"#,
        r#"ol[id*="menu" i]"#,
        r#"div[id="icons"]"#,
        r#"div[class="topright_button"]"#,
        r#"li[class*="ZMS"]"#,
        r#"a[class*="ZMS"]"#,
        r#"img[class="imgNoborder"]"#,
        r#"img[id*="logo"]"#,
        r#"img[id*="icon"]"#,
        r#"a[target="_blank"]"#,
        r#"a[href*="doi.org"]"#,
        r#"a[href*="DOI"]"#,
        r#"a[href*="journals.aps.org"]"#,
        r#"a[href*="dx.doi.org"]"#,
        r#"a[href*="doi:"]"#,
        r#"a[href*="abstract"]"#,
        r#"a[href*="citation"]"#,
        r#"div[class="clear"]"#,
        r#"div[class="loading"]"#,
        "footer",
        "header",
        r#"div[id*="footer" i]"#,
        r#"div[class*="footer" i]"#,
        r#"div[class*="copyright" i]"#,
        r#"div[class*="teaser" i]"#,
        r#"div[class*="LinkElement" i]"#,
        r#"div[class*="quicklinks" i]"#,
        r#"div[class*="ZMS" i]"#,
        r#"div[id*="teaser" i]"#,
        r#"div[id*="quicklinks" i]"#,
        "[data-cookie]",
        "[data-consent]",
        r#"[class*="cookie" i]"#,
        r#"[class*="consent" i]"#,
        r#"[style*="display:none" i]"#,
        r#"[style*="visibility:hidden" i]"#,
        r#"div[id="quick_nav_container"]"#,
        r#"a[href*="data_privacy_policy"]"#,
        r#"a[href*="declaration_of_accessibility"]"#,
        r#"ul[style*="padding-bottom"]"#,
        r#"button[class*="btt"]"#,
        r#"div[class*="btt"]"#,
        r#"ul[class*="footer__links"]"#,
        r#"div[class*="footer__logos"]"#,
        r#"img[alt*="Logo"]"#,
        r#"a[href*="linkedin"]"#,
        r#"a[href*="twitter"]"#,
        r#"li[class*="ZMSFolder"]"#,
        r#"li[class*="ZMSDocument"]"#,
        r#"a[class*="ZMSFolder"]"#,
        r#"a[class*="ZMSDocument"]"#,
        "p.hidden.showforprint",
        r#"[class*="showforprint" i]"#,
        r#"[class*="show-for-print" i]"#,
        r#"[class~="showforprint"]"#,
        r#"[class~="hidden"]"#,
        r#"a[class*="print" i]"#,
        r#"a[class*="changelang" i]"#,
        r#"div[class*="nav" i]"#,
        r#"div[id*="nav" i]"#,
        r#"div[class*="menu" i]"#,
        r#"div[id*="menu" i]"#,
        r#"ul[class*="menu" i]"#,
        r#"li[class*="menu" i]"#,
        r#"li[id*="menu" i]"#,
        r#"a[class*="menu" i]"#,
        r#"a[id*="menu" i]"#,
        r#"section[class*="nav" i]"#,
        r#"section[class*="menu" i]"#,
        r#"ul[class*="nav" i]"#,
        r#"ul[id*="nav" i]"#,
        r#"div[id*="content-nav" i]"#,
        r#"div[id="page-footer"]"#,
        r#"ul[id="footer-nav"]"#,
    ]
    .iter()
    .filter_map(|s| Selector::parse(s).ok())
    .collect()
});

static LI_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("li").expect("li selector"));
static HREF_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("body selector"));

static DOI_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(doi\.org|journals\.aps\.org|dx\.doi\.org|DOI:)").expect("DOI href pattern")
});

const BLOCK_CONTAINERS: [&str; 5] = ["div", "section", "aside", "p", "span"];
const COOKIE_CLIMB_LIMIT: usize = 4;

/// Turns an HTML string into normalised plain text.
///
/// Selects a main-content node, prunes structural noise, applies every HTML
/// pattern group to the serialised result, drops copyright text nodes and
/// cookie-banner containers on a re-parse, then extracts and normalises the
/// text. Idempotent: cleaning its own output is a no-op.
pub fn clean_content(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let document = Html::parse_document(html);
    let main_content = select_main_content(&document);

    let mut text = main_content.html();
    for removal in collect_noise(&document, &main_content) {
        if !removal.is_empty() {
            text = text.replace(&removal, "");
        }
    }

    let text = patterns::scrub_html(&text);
    let text = if patterns::contains_markup(&text) {
        extract_visible_text(&text)
    } else {
        text
    };

    finish_text(&text)
}

/// Whitespace collapse, navigation-residue cleanup and DOI dedup shared with
/// the content extractor.
pub fn finish_text(text: &str) -> String {
    let text = patterns::collapse_whitespace(text);
    let text = patterns::apply_text_cleanup(&text);
    let text = patterns::dedup_dois(&text);
    patterns::collapse_whitespace(&text)
}

fn select_main_content<'a>(document: &'a Html) -> ElementRef<'a> {
    for selector in MAIN_CONTENT_SELECTORS.iter() {
        if let Some(element) = document.select(selector).next() {
            return element;
        }
    }
    document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element())
}

/// Serialised subtrees to delete: noise-selector matches in the main node and
/// the whole document, `<li>` outside any `id="content"` ancestor, and DOI
/// anchors.
fn collect_noise(document: &Html, main_content: &ElementRef<'_>) -> Vec<String> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut removals = Vec::new();

    for selector in NOISE_SELECTORS.iter() {
        for element in document.select(selector).chain(main_content.select(selector)) {
            if seen.insert(element.id()) {
                removals.push(element.html());
            }
        }
    }

    for li in document.select(&LI_SELECTOR) {
        let under_content = li.ancestors().any(|a| {
            a.value()
                .as_element()
                .and_then(|e| e.attr("id"))
                .is_some_and(|id| id == "content")
        });
        if !under_content && seen.insert(li.id()) {
            removals.push(li.html());
        }
    }

    for anchor in document.select(&HREF_SELECTOR) {
        if let Some(href) = anchor.value().attr("href") {
            if DOI_HREF.is_match(href) && seen.insert(anchor.id()) {
                removals.push(anchor.html());
            }
        }
    }

    removals
}

/// Re-parses partially cleaned markup and extracts text with single-space
/// node separation, dropping copyright text nodes and any block container
/// (up to four levels above a matching text node) that carries a
/// cookie-banner phrase.
pub(crate) fn extract_visible_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut condemned: HashSet<NodeId> = HashSet::new();

    for node in fragment.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let lowered = text.to_lowercase();
        if !patterns::COOKIE_PHRASES.iter().any(|p| p.is_match(&lowered)) {
            continue;
        }
        let mut ancestor = node.parent();
        for _ in 0..COOKIE_CLIMB_LIMIT {
            let Some(current) = ancestor else { break };
            match current.value().as_element() {
                Some(element) if BLOCK_CONTAINERS.contains(&element.name()) => {
                    condemned.insert(current.id());
                    break;
                }
                _ => ancestor = current.parent(),
            }
        }
    }

    let mut out = String::new();
    collect_text(fragment.tree.root(), &condemned, &mut out);
    out
}

fn collect_text(
    node: ego_tree::NodeRef<'_, scraper::Node>,
    condemned: &HashSet<NodeId>,
    out: &mut String,
) {
    if condemned.contains(&node.id()) {
        return;
    }
    if let Some(text) = node.value().as_text() {
        if !patterns::COPYRIGHT_NODE.is_match(text) {
            out.push_str(text);
            out.push(' ');
        }
        return;
    }
    for child in node.children() {
        collect_text(child, condemned, out);
    }
}

/// Extracts and normalises the text content of a single element, collapsing
/// consecutive whitespace into single spaces.
pub fn element_text(element: &ElementRef<'_>) -> String {
    let raw: String = element.text().collect::<Vec<_>>().join(" ");
    patterns::collapse_whitespace(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_main_content_and_drops_chrome() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><p>Accelerator commissioning resumed this week.</p></main>
            <footer>Imprint</footer>
        </body></html>"#;
        let cleaned = clean_content(html);
        assert!(cleaned.contains("Accelerator commissioning resumed this week."));
        assert!(!cleaned.contains("Imprint"));
    }

    #[test]
    fn list_items_outside_content_are_dropped() {
        let html = r#"<html><body><main>
            <ul><li>Menu entry one</li><li>Menu entry two</li></ul>
            <p>Body paragraph that stays.</p>
        </main></body></html>"#;
        let cleaned = clean_content(html);
        assert!(!cleaned.contains("Menu entry one"));
        assert!(cleaned.contains("Body paragraph that stays."));
    }

    #[test]
    fn list_items_under_content_id_survive() {
        let html = r#"<html><body><div id="content">
            <ul><li>First measured value stays visible here</li></ul>
        </div></body></html>"#;
        let cleaned = clean_content(html);
        assert!(cleaned.contains("First measured value stays visible here"));
    }

    #[test]
    fn cookie_container_is_climbed_and_removed() {
        let html = r#"<html><body><main>
            <div><span>We use cookies to improve your experience</span></div>
            <p>Regular article text about detector upgrades.</p>
        </main></body></html>"#;
        let cleaned = clean_content(html);
        assert!(!cleaned.to_lowercase().contains("we use cookies"));
        assert!(cleaned.contains("detector upgrades"));
    }

    #[test]
    fn copyright_text_nodes_are_dropped() {
        let html = r#"<html><body><main>
            <p>Research highlights from the photon source.</p>
            <p>© 2024 Deutsches Elektronen-Synchrotron DESY</p>
        </body></html>"#;
        let cleaned = clean_content(html);
        assert!(cleaned.contains("Research highlights"));
        assert!(!cleaned.contains("© 2024"));
    }

    #[test]
    fn cleaning_is_idempotent() {
        let html = r#"<html><body><main>
            <p>Beam time applications close on Friday afternoon.</p>
            <script>tracker();</script>
        </main></body></html>"#;
        let once = clean_content(html);
        let twice = clean_content(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(clean_content(""), "");
        assert_eq!(clean_content("   \n "), "");
    }
}
