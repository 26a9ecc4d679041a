use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

// Pattern tables for boilerplate elimination, grouped by priority. Groups are
// applied in declaration order; later groups see the output of earlier ones.
// All HTML groups operate on raw markup strings, TEXT_CLEANUP and WHITESPACE
// on extracted text.

fn compile(table: &[&str]) -> Vec<Regex> {
    table
        .iter()
        .map(|p| Regex::new(p).expect("invalid noise pattern"))
        .collect()
}

/// Scripts, styles, navigation, forms, site chrome by id, cookie banners.
pub static CRITICAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?is)<script[^>]*>.*?</script>",
        r"(?is)<style[^>]*>.*?</style>",
        r"(?is)<nav\b[^>]*>.*?</nav>",
        r"(?is)<(?:header|footer)\b[^>]*>.*?</(?:header|footer)>",
        r"(?is)<form\b[^>]*>.*?</form>",
        r#"(?is)<(?:div|section|nav|ul|header)\b[^>]*id\s*=\s*['"](?:footer|overall|wrapper|icons|search_icon|phone_icon|close_gcs|mobile_menu_header|mobile_menu|mobile_dropdown|mobile_loading|mobile_dropdown_content|top|logoarea|topleft|topright|topmenu|menu|main_menu|header|leftmenu|rightmenu)\b[^'"]*['"][^>]*>.*?</(?:div|section|nav|ul|header)>"#,
        r#"(?is)<(?:div|section|aside|footer)[^>]*id=["']?[^"'>]*\b(?:cookie|consent|privacy|banner|notice|preferences)\b[^"'>]*["']?[^>]*>.*?</(?:div|section|aside|footer)>"#,
        r#"(?is)<(?:div|section|aside|footer)[^>]*class=["'][^"'>]*\b(?:cookie|consent|banner|popup|notice|preferences|privacy|cookie-consent-wrapper|cookie-bar-wrapper)[^"'>]*["'][^>]*>.*?</(?:div|section|aside|footer)>"#,
        r#"(?is)<(?:div|section|aside|footer)[^>]*style=["'][^"']*display\s*:\s*none[^"']*["'][^>]*>.*?</(?:div|section|aside|footer)>"#,
        r#"(?is)<[^>]+class=["'][^"'>]*\bcookie-bar__inner\b[^"'>]*["'][^>]*>.*?</[^>]+>"#,
        r"(?is)<!--\s*Cookie\s+Bar\s*-->.*?<!--\s*End\s+Cookie\s+Bar\s*-->",
        r#"(?is)<div[^>]*id=["']?cookie-bar["']?[^>]*>.*?</div>"#,
        r#"(?is)<nav\b[^>]*id\s*=\s*['"](?:leftmenu|topmenu|menu)[^'"]*['"][^>]*>.*?</nav>"#,
        r#"(?is)<ul\b[^>]*id\s*=\s*['"](?:main_menu|menu)[^'"]*['"][^>]*>.*?</ul>"#,
        r#"(?is)<li\b[^>]*class\s*=\s*['"][^'"]*\b(?:inactive|active|ZMSFolder\d*|ZMSDocument\d*)\b[^'"]*['"][^>]*>.*?</li>"#,
    ])
});

/// Breadcrumb/menu containers, site headers and footers, consent wrappers,
/// sidebars.
pub static HIGH_PRIORITY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"(?is)<(?:div|ul|ol|section)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:breadcrumb|bread[-_]?nav|nav|navigation|tagline|menu[-_]?bar|top[-_]?nav|site[-_]?nav|main[-_]?navigation|nav[-_]?container|sub[-_]?nav|menu[-_]?container|menu|sub[-_]?menu|nav[-_]?menu|quick[-_]?nav|quick[-_]?links)\b[^'"]*['"][^>]*>.*?</(?:div|ul|ol|section)>"#,
        r#"(?is)<(?:div|ul|ol|section|li)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:breadcrumb|bread[-_]?nav|nav|navigation|tagline|menu[-_]?bar|top[-_]?nav|site[-_]?nav|main[-_]?navigation|nav[-_]?container|sub[-_]?nav|menu[-_]?container|menu|sub[-_]?menu|nav[-_]?menu|quick[-_]?nav|quick[-_]?links|topright[-_]?button|wrapper)\b[^'"]*['"][^>]*>.*?</(?:div|ul|ol|section|li)>"#,
        r#"(?is)<(?:header|footer)\b[^>]*(?:id\s*=\s*['"]header['"])?.*?</(?:header|footer)>"#,
        r#"(?is)<div\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:header|footer|site[-_]?footer|page[-_]?footer|site[-_]?header|nav[-_]?footer|group[-_]?header|banner[-_]?header|wrapper)\b[^'"]*['"][^>]*>.*?</div>"#,
        r#"(?is)<(?:div|section|aside)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:cookies?|consent|banner|popup|modal|cookie[-_]?notices?|cookie[-_]?consents?|cookie[-_]?policys?|gdpr|privacy[-_]?banner)\b[^'"]*['"][^>]*>.*?</(?:div|section|aside)>"#,
        r#"(?is)<(?:div|aside|section)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:sidebar|left|right|side[-_]?nav|widget[-_]?area|nav[-_]?panel)\b[^'"]*['"][^>]*>.*?</(?:div|aside|section)>"#,
    ])
});

/// Search forms, mobile menu variants, language switchers, overlays, buttons,
/// DOI anchors.
pub static MEDIUM_PRIORITY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"(?is)<div\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:search|search[-_]?form|search[-_]?box|search[-_]?bar|cse[-_]?search[-_]?form)\b[^'"]*['"][^>]*>.*?</div>"#,
        r#"(?is)<(?:div|nav|ul)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\bmobile(?:[-_]?(?:nav|menu|back|toggle|dropdown|loading))?\b[^'"]*['"][^>]*>.*?</(?:div|nav|ul)>"#,
        r#"(?is)<(?:div|ul|select)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:lang|language|lang[-_]?switch)\b[^'"]*['"][^>]*>.*?</(?:div|ul|select)>"#,
        r#"(?is)<(?:div|section)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:overlay|modal[-_]?overlay|popup[-_]?overlay)\b[^'"]*['"][^>]*>.*?</(?:div|section)>"#,
        r#"(?is)<(?:button|input|div)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:btns?|buttons?|btt|topright[-_]?button)\b[^'"]*['"][^>]*(?:>.*?</(?:button|input|div)>|/??>)"#,
        r#"(?is)<a\b[^>]*href\s*=\s*['"][^'"]*\b(?:doi\.org|journals\.aps\.org|dx\.doi\.org|DOI:)[^'"]*['"][^>]*>.*?</a>"#,
    ])
});

// Generic page wrappers belong to the MEDIUM group but need a containment
// check (keep wrappers that hold <main>/<article>) that a single substitution
// cannot express; see strip_plain_wrappers.
static WRAPPER_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<(?:div|section)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:wrapper|container|main[-_]?container|page[-_]?wrapper|site[-_]?wrapper)\b[^'"]*['"][^>]*>"#,
    )
    .expect("invalid wrapper pattern")
});
static WRAPPER_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(?:div|section)>").expect("invalid wrapper close pattern"));
static CONTENT_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:main|article|content)\b").expect("invalid content mark"));

/// Menu-styled list items, footnote and reference blocks, legal/branding
/// anchors, loader and logo images, ARIA navigation landmarks.
pub static LOW_PRIORITY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"(?is)<li\b[^>]*class\s*=\s*['"][^'"]*\b(?:inactive|folder|nav[-_]?item|menu[-_]?item|ZMSFolder\d*|ZMSDocument\d*)\b[^'"]*['"][^>]*>.*?</li>"#,
        r#"(?is)<(?:div|section|aside|span)\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:footnotes?|foot[-_]?notes?|references?|citations?|endnotes?)\b[^'"]*['"][^>]*>.*?</(?:div|section|aside|span)>"#,
        r#"(?is)<a\b[^>]*(?:id\s*=\s*['"](?:mobile_back_to_desy|mobile[-_]?nav[-_]?toggle|search|phone)['"]|(?:class|id)\s*=\s*['"][^'"]*\b(?:inactive|ZMSFolder\d*|ZMSDocument\d*)\b[^'"]*['"]|href\s*=\s*['"][^'"]*(?:index_print|desy\.de|testbeam\.desy\.de)[^'"]*['"]|title\s*=\s*['"][^'"]*(?:Change\s+language|DESY\s+Homepage)[^'"]*['"]|target\s*=\s*['"]_blank['"])[^>]*>.*?</a>"#,
        r#"(?i)<img\b[^>]*(?:id\s*=\s*['"][^'"]*(?:phonebook_icon|print_icon|lang_icon|desylogo)[^'"]*['"]|alt\s*=\s*['"][^'"]*(?:phone\s+book|Diese\s+Seite\s+drucken|loading|DESY\s+Logo)[^'"]*['"]|src\s*=\s*['"][^'"]*(?:loading\.gif|logo_desy\.gif|arrow_large_white\.png)[^'"]*['"])[^>]*/?>"#,
        r#"(?is)<[^>]*(?:role\s*=\s*['"]navigation['"]|aria-label\s*=\s*['"][^'"]*['"])[^>]*>.*?</[^>]+>"#,
        r#"(?is)<ul\b[^>]*>(?:\s*<li\b[^>]*(?:class|id)\s*=\s*['"][^'"]*\b(?:inactive|ZMSFolder\d*|ZMSDocument\d*)\b[^'"]*['"][^>]*>.*?</li>\s*)+</ul>"#,
    ])
});

/// Verbatim site boilerplate: institutional tag lines, imprint rows, German
/// skip-navigation labels.
pub static SPECIALIZED: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)Deutsches\s+Elektronen-Synchrotron\s+DESY\s+A\s+Research\s+Centre\s+of\s+the\s+Helmholtz\s+Association",
        r"(?i)Data\s+Privacy\s+Policy\s*\|\s*Declaration\s+of\s+Accessibility\s*\|\s*Imprint\s*©[^.]*",
        r"(?i)A\s+Research\s+Centre\s+of\s+the\s+Helmholtz\s+Association",
        r"(?i)©\s*\d{4}\s*Deutsches\s+Elektronen-Synchrotron\s+DESY.*?(?:Helmholtz\s+Association)?",
        r"(?i)Deutsches\s*Elektronen-Synchrotron",
        r"(?i)Data\s+Privacy\s+Policy\s*\|.*?(?:Imprint|©)",
        r"(?i)Impressum\s*/\s*Datenschutz\s*/\s*Erklärung\s+zur\s+Barrierefreiheit",
        r"(?i)\bSprungnavigation\b",
        r"(?i)\bZielgruppennavigation\b",
        r"(?i)\bServicefunktionen\b",
        r"(?i)\bBreadcrumb\b",
        r"(?i)\bFooter\b",
        r"(?i)\bDesy\s+Global\b",
        r"(?i)\bZum\s+Untermenü\b",
        r"(?i)\bZum\s+Inhalt\b",
        r"(?i)\bZum\s+Hauptmenu\b",
        r"(?i)\bInfos\s*&\s*Services\b",
        r"(?i)\bLeichte\s+Sprache\b",
        r"(?i)\bGebärdensprache\b",
    ])
});

/// Template comments, templating attribute residue, inline SVGs, decorative
/// styles.
pub static CLEANUP: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?is)<!--\s*(?://wrapper\s*//\s*-->.*?<!--\s*/standard_html_header\s*--|/?\s*standard_html_header\s*-->)",
        r"(?is)<!--[^>]*(?:wrapper|overall|standard_html)[^>]*-->",
        r"(?i)<!--[^>]*tal:attributes[^>]*-->",
        r"(?is)<!--a\s+tal:.*?</a-->",
        r"(?is)<svg[^>]*>.*?</svg>",
        r#"(?i)title\s*=\s*['"][^'"]*(?:Aktuelle|Seminare|Events)[^'"]*['"]"#,
        r#"(?i)<[^>]*style\s*=\s*['"][^'"]*(?:display\s*:\s*block|text-align\s*:\s*right|margin|opacity)[^'"]['"][^>]*>"#,
    ])
});

/// Navigation-word residue in extracted text.
pub static TEXT_CLEANUP: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\bNavigation\b",
        r"(?i)\bDatenschutzerklärung\b",
        r"(?i)\bErklärung\s+zur\s+Barrierefreiheit\b",
        r"(?i)\bBack\s+to\s+Top\b",
        r"(?i)\b(?:nav|menu|breadcrumb|navigation)\s*[:\-|]\s*",
        r"(?i)\b(?:Home|Startseite|Kontakt|Suche|Login|Anmelden)\b",
        r"(?i)\b(?:Archiv|Archive)\s*\d{4}",
        r"(?i)\b(?:Page\s+\d+|Seite\s+\d+|\d+\s+of\s+\d+)\b",
        r"(?i)\b(?:cookie|gdpr|popup|consent)\b",
    ])
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{a0}\u{202f}\s]+").expect("invalid whitespace pattern"));

/// Cookie-banner phrases; a text node matching any of these condemns its
/// nearest block-level container.
pub static COOKIE_PHRASES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)cookie[- ]?banner",
        r"(?i)cookie[- ]?consent",
        r"(?i)diese website verwendet cookies",
        r"(?i)we use cookies",
        r"(?i)accept all cookies",
        r"(?i)cookie einstellungen",
        r"(?i)cookie policy",
        r"(?i)consent to cookies",
        r"(?i)diese seite nutzt cookies",
        r"(?i)cookie notice",
        r"(?i)cookie preferences",
        r"(?i)cookie declaration",
        r"(?i)cookie information",
        r"(?i)cookie settings",
        r"(?i)cookie usage",
    ])
});

/// Copyright lines as they appear in stray text nodes.
pub static COPYRIGHT_NODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)©\s*\d{4}\s*Deutsches\s*Elektronen-Synchrotron\s*DESY")
        .expect("invalid copyright pattern")
});

static DOI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b10\.\d{4,9}/[-._;()/:A-Z0-9]+\b").expect("invalid DOI pattern")
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("invalid tag pattern"));

/// Applies one pattern group, deleting every match.
pub fn apply_group(input: &str, group: &[Regex]) -> String {
    let mut text = Cow::Borrowed(input);
    for pattern in group {
        if pattern.is_match(&text) {
            text = Cow::Owned(pattern.replace_all(&text, "").into_owned());
        }
    }
    text.into_owned()
}

/// Applies all HTML groups in priority order: CRITICAL, HIGH, MEDIUM (with
/// the wrapper containment check), LOW, SPECIALIZED, CLEANUP.
pub fn scrub_html(input: &str) -> String {
    let text = apply_group(input, &CRITICAL);
    let text = apply_group(&text, &HIGH_PRIORITY);
    let text = apply_group(&text, &MEDIUM_PRIORITY);
    let text = strip_plain_wrappers(&text);
    let text = apply_group(&text, &LOW_PRIORITY);
    let text = apply_group(&text, &SPECIALIZED);
    apply_group(&text, &CLEANUP)
}

/// Removes wrapper/container blocks that do not themselves contain a
/// `<main>`, `<article>` or `<content>` element.
fn strip_plain_wrappers(input: &str) -> String {
    let mut text = input.to_string();
    let mut from = 0;
    while let Some(open) = WRAPPER_OPEN.find_at(&text, from) {
        let Some(close) = WRAPPER_CLOSE.find_at(&text, open.end()) else {
            break;
        };
        if CONTENT_MARK.is_match(&text[open.end()..close.start()]) {
            from = open.end();
        } else {
            let (start, end) = (open.start(), close.end());
            text.replace_range(start..end, "");
            from = start;
        }
    }
    text
}

/// Collapses every whitespace run (including NBSP and narrow NBSP) to a
/// single ASCII space and trims.
pub fn collapse_whitespace(input: &str) -> String {
    WHITESPACE.replace_all(input, " ").trim().to_string()
}

pub fn apply_text_cleanup(input: &str) -> String {
    apply_group(input, &TEXT_CLEANUP)
}

/// Keeps only the first occurrence of each DOI identifier.
pub fn dedup_dois(input: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    let result = DOI.replace_all(input, |caps: &regex::Captures<'_>| {
        let doi = caps[0].to_string();
        if seen.insert(doi.clone()) { doi } else { String::new() }
    });
    result.into_owned()
}

/// Bare tag strip, the degraded path when parsing fails.
pub fn strip_tags(input: &str) -> String {
    TAG.replace_all(input, " ").into_owned()
}

pub fn contains_markup(input: &str) -> bool {
    input.contains('<') && input.contains('>')
}
