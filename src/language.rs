use crate::MIN_TEXT_SAMPLE_LENGTH;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

const DETECTION_SAMPLE_CHARS: usize = 1000;

static HTML_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("html").expect("html"));
static META_CONTENT_LANGUAGE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[http-equiv="content-language"]"#).expect("content-language meta")
});
static META_OG_LOCALE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:locale"]"#).expect("og:locale meta"));

// whatlang reports ISO 639-3; chunk metadata carries 639-1. One entry per
// language the detector supports.
const ISO_639_3_TO_1: [(&str, &str); 69] = [
    ("afr", "af"),
    ("aka", "ak"),
    ("amh", "am"),
    ("ara", "ar"),
    ("aze", "az"),
    ("bel", "be"),
    ("ben", "bn"),
    ("bul", "bg"),
    ("cat", "ca"),
    ("ces", "cs"),
    ("cmn", "zh"),
    ("dan", "da"),
    ("deu", "de"),
    ("ell", "el"),
    ("eng", "en"),
    ("epo", "eo"),
    ("est", "et"),
    ("fin", "fi"),
    ("fra", "fr"),
    ("guj", "gu"),
    ("heb", "he"),
    ("hin", "hi"),
    ("hrv", "hr"),
    ("hun", "hu"),
    ("hye", "hy"),
    ("ind", "id"),
    ("ita", "it"),
    ("jav", "jv"),
    ("jpn", "ja"),
    ("kan", "kn"),
    ("kat", "ka"),
    ("khm", "km"),
    ("kor", "ko"),
    ("lat", "la"),
    ("lav", "lv"),
    ("lit", "lt"),
    ("mal", "ml"),
    ("mar", "mr"),
    ("mkd", "mk"),
    ("mya", "my"),
    ("nep", "ne"),
    ("nld", "nl"),
    ("nob", "nb"),
    ("ori", "or"),
    ("pan", "pa"),
    ("pes", "fa"),
    ("pol", "pl"),
    ("por", "pt"),
    ("ron", "ro"),
    ("rus", "ru"),
    ("sin", "si"),
    ("slk", "sk"),
    ("slv", "sl"),
    ("sna", "sn"),
    ("spa", "es"),
    ("srp", "sr"),
    ("swe", "sv"),
    ("tam", "ta"),
    ("tel", "te"),
    ("tgl", "tl"),
    ("tha", "th"),
    ("tuk", "tk"),
    ("tur", "tr"),
    ("ukr", "uk"),
    ("urd", "ur"),
    ("uzb", "uz"),
    ("vie", "vi"),
    ("yid", "yi"),
    ("zul", "zu"),
];

fn iso_639_1(code: &str) -> Option<&'static str> {
    ISO_639_3_TO_1
        .iter()
        .find(|(three, _)| *three == code)
        .map(|(_, one)| *one)
}

/// Detects the page language as an ISO 639-1 code.
///
/// Order: the `_ger.html` URL convention, statistical detection over a text
/// sample, declared language attributes, and finally `en`.
pub fn detect_language(document: &Html, sample: &str, url: Option<&str>) -> String {
    if url.is_some_and(|u| u.to_lowercase().ends_with("_ger.html")) {
        return "de".to_string();
    }
    if sample.len() >= MIN_TEXT_SAMPLE_LENGTH {
        if let Some(code) = detect_from_text(sample) {
            return code;
        }
    }
    if let Some(code) = declared_language(document) {
        return code;
    }
    "en".to_string()
}

fn detect_from_text(sample: &str) -> Option<String> {
    let head: String = sample.chars().take(DETECTION_SAMPLE_CHARS).collect();
    let info = whatlang::detect(&head)?;
    iso_639_1(info.lang().code()).map(str::to_string)
}

/// Declared language: `<html lang>`, `xml:lang`, the content-language meta,
/// then `og:locale`, trimmed to a two-letter prefix.
fn declared_language(document: &Html) -> Option<String> {
    let html_attr = document.select(&HTML_SELECTOR).next().and_then(|el| {
        el.value()
            .attr("lang")
            .or_else(|| el.value().attr("xml:lang"))
            .map(str::to_string)
    });
    let meta_attr = || {
        document
            .select(&META_CONTENT_LANGUAGE)
            .next()
            .and_then(|el| el.value().attr("content").map(str::to_string))
            .or_else(|| {
                document
                    .select(&META_OG_LOCALE)
                    .next()
                    .and_then(|el| el.value().attr("content").map(str::to_string))
            })
    };
    let raw = html_attr.or_else(meta_attr)?;
    let prefix: String = raw
        .trim()
        .to_lowercase()
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    (prefix.len() == 2).then_some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn german_url_suffix_wins() {
        let doc = Html::parse_document("<html lang=\"en\"><body>irrelevant</body></html>");
        assert_eq!(
            detect_language(&doc, "", Some("https://h/page_ger.html")),
            "de"
        );
    }

    #[test]
    fn statistical_detection_on_long_samples() {
        let doc = Html::parse_document("<html><body></body></html>");
        let sample = "The storage ring provides highly brilliant X-ray beams \
                      for experiments in physics, chemistry and biology every day.";
        assert_eq!(detect_language(&doc, sample, None), "en");
    }

    #[test]
    fn every_detector_language_maps_to_two_letters() {
        for lang in whatlang::Lang::all() {
            let mapped = iso_639_1(lang.code());
            assert!(mapped.is_some(), "no 639-1 code for {}", lang.code());
            assert_eq!(mapped.map(str::len), Some(2));
        }
    }

    #[test]
    fn declared_attributes_are_the_fallback() {
        let doc = Html::parse_document(r#"<html lang="de-DE"><body>x</body></html>"#);
        assert_eq!(detect_language(&doc, "short", None), "de");

        let doc = Html::parse_document(
            r#"<html><head><meta property="og:locale" content="fr_FR"></head><body>x</body></html>"#,
        );
        assert_eq!(detect_language(&doc, "", None), "fr");
    }

    #[test]
    fn english_is_the_default() {
        let doc = Html::parse_document("<html><body>x</body></html>");
        assert_eq!(detect_language(&doc, "", None), "en");
    }
}
