#[cfg(test)]
mod chunk_window_tests {
    use crate::chunker::{
        ChunkContext, ChunkType, create_chunks, create_full_text_document, split_text_by_size,
    };
    use crate::state::BoundedHashSet;

    fn sentence_soup(target_len: usize) -> String {
        let mut text = String::new();
        let mut i = 0;
        while text.len() < target_len {
            text.push_str(&format!("Sentence number {i} describes one measurement. "));
            i += 1;
        }
        text.truncate(target_len);
        text
    }

    #[test]
    fn double_window_body_yields_at_most_three_chunks() {
        let n = 100;
        let k = 20;
        let text = sentence_soup(2 * n + 1);
        let chunks = split_text_by_size(&text, n, k, 30);
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= 3, "got {} chunks", chunks.len());
        for chunk in &chunks {
            assert!(chunk.len() <= n);
        }
    }

    #[test]
    fn windows_prefer_sentence_boundaries() {
        let text = sentence_soup(450);
        let chunks = split_text_by_size(&text, 200, 40, 30);
        assert!(chunks.len() >= 2);
        // every window but the last should end at a sentence terminator
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.ends_with('.'),
                "window does not end on a sentence: {chunk:?}"
            );
        }
    }

    #[test]
    fn twenty_nine_chars_yield_nothing_thirty_yield_one() {
        let mut hashes = BoundedHashSet::new(100);
        let ctx = ChunkContext::new("https://h/page", "Page", 0, "en");

        let short = "Alpha beta gamma delta epsilo"; // 29
        assert_eq!(short.len(), 29);
        let docs = create_chunks(short, &ctx, ChunkType::Character, 1000, 200, &mut hashes);
        assert!(docs.is_empty());

        let exact = "Alpha beta gamma delta epsilon"; // 30
        assert_eq!(exact.len(), 30);
        let docs = create_chunks(exact, &ctx, ChunkType::Character, 1000, 200, &mut hashes);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, exact);
        assert_eq!(docs[0].metadata.chunk_index, 0);
        assert!(!docs[0].metadata.continued);

        let mut full_hashes = BoundedHashSet::new(100);
        assert!(create_full_text_document(short, &ctx, &mut full_hashes).is_none());
        let full = create_full_text_document(exact, &ctx, &mut full_hashes);
        assert_eq!(full.map(|d| d.content), Some(exact.to_string()));
    }

    #[test]
    fn continued_is_set_on_every_follow_up_window() {
        let mut hashes = BoundedHashSet::new(10_000);
        let ctx = ChunkContext::new("https://h/long", "Long", 0, "en");
        let text = sentence_soup(3000);
        let docs = create_chunks(&text, &ctx, ChunkType::Character, 400, 80, &mut hashes);
        assert!(docs.len() > 1);
        for doc in &docs {
            assert!(doc.content.len() >= 30);
            if doc.metadata.chunk_index > 0 {
                assert!(doc.metadata.continued);
                assert!(doc.metadata.total_chunks > 1);
            }
        }
    }

    #[test]
    fn repeated_content_is_dropped_across_calls() {
        let mut hashes = BoundedHashSet::new(100);
        let text = "The exact same announcement text, repeated on a second page.";
        let first = create_chunks(
            text,
            &ChunkContext::new("https://h/a", "A", 0, "en"),
            ChunkType::Character,
            1000,
            200,
            &mut hashes,
        );
        let second = create_chunks(
            text,
            &ChunkContext::new("https://h/b", "B", 0, "en"),
            ChunkType::Character,
            1000,
            200,
            &mut hashes,
        );
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn character_and_full_text_pools_do_not_cross_dedup() {
        let mut char_hashes = BoundedHashSet::new(100);
        let mut full_hashes = BoundedHashSet::new(100);
        let ctx = ChunkContext::new("https://h/a", "A", 0, "en");
        let text = "Body text long enough to be chunked and recorded twice over.";

        let chars = create_chunks(text, &ctx, ChunkType::Character, 1000, 200, &mut char_hashes);
        let full = create_full_text_document(text, &ctx, &mut full_hashes);
        assert_eq!(chars.len(), 1);
        assert!(full.is_some());
    }
}

#[cfg(test)]
mod structural_tests {
    use crate::chunker::{ChunkType, ChunkContext, create_structural_chunks};
    use crate::state::BoundedHashSet;
    use scraper::Html;

    #[test]
    fn sections_come_out_with_their_headings() {
        let html = r#"<html><head><title>Status report</title></head><body>
            <section>
                <h2>Injector performance</h2>
                <p>The injector reached its design current in all shifts last week.</p>
            </section>
        </body></html>"#;
        let document = Html::parse_document(html);
        let mut hashes = BoundedHashSet::new(1000);
        let ctx = ChunkContext::new("https://h/status", "Status report", 0, "en");
        let docs = create_structural_chunks(&document, &ctx, 1000, 200, &mut hashes);
        assert!(!docs.is_empty());
        let doc = &docs[0];
        assert_eq!(doc.metadata.chunk_type, ChunkType::Structural);
        assert_eq!(doc.metadata.section_title.as_deref(), Some("Injector performance"));
        assert!(doc.content.contains("design current"));
    }

    #[test]
    fn login_pages_produce_no_structural_chunks() {
        let html = r#"<html><head><title>Sign in</title></head><body>
            <form action="/login"><input type="password" name="password"></form>
            <p>Please authenticate before using the internal reporting tools.</p>
        </body></html>"#;
        let document = Html::parse_document(html);
        let mut hashes = BoundedHashSet::new(1000);
        let ctx = ChunkContext::new("https://h/login", "Sign in", 0, "en");
        assert!(create_structural_chunks(&document, &ctx, 1000, 200, &mut hashes).is_empty());
    }

    #[test]
    fn heading_stack_fallback_collects_short_paragraphs() {
        // every individual element is below the section-seed threshold, so
        // pass 1 finds nothing and the heading stack takes over
        let html = r#"<html><head><title>Weekly notes</title></head><body>
            <h2>Beam studies</h2>
            <p>Orbit drift seen.</p>
            <p>Optics retuned.</p>
            <p>Vacuum stable.</p>
        </body></html>"#;
        let document = Html::parse_document(html);
        let mut hashes = BoundedHashSet::new(1000);
        let ctx = ChunkContext::new("https://h/notes", "Weekly notes", 0, "en");
        let docs = create_structural_chunks(&document, &ctx, 1000, 200, &mut hashes);
        assert!(!docs.is_empty());
        let doc = &docs[0];
        assert_eq!(doc.metadata.section_title.as_deref(), Some("Beam studies"));
        assert_eq!(doc.metadata.section_level, Some(2));
        assert!(doc.content.contains("Orbit drift"));
        assert!(doc.content.contains("Vacuum stable"));
    }
}

#[cfg(test)]
mod invariant_tests {
    use crate::chunker::{ChunkContext, ChunkType, create_chunks};
    use crate::extractor::extract_content;
    use crate::state::BoundedHashSet;
    use scraper::Html;
    use url::Url;

    #[test]
    fn five_identical_paragraphs_collapse_to_one_chunk() {
        let paragraph =
            "<p>Identical teaser text that the estate repeats on many pages.</p>".repeat(5);
        let document =
            Html::parse_document(&format!("<html><body><main>{paragraph}</main></body></html>"));
        let (content, _) = extract_content(&document, true, &[]);
        let mut hashes = BoundedHashSet::new(1000);
        let ctx = ChunkContext::new("https://h/dup", "Dup", 0, "en");
        let docs = create_chunks(&content, &ctx, ChunkType::Character, 1000, 200, &mut hashes);
        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].content.matches("Identical teaser text").count(),
            1
        );
    }

    #[test]
    fn emitted_chunks_satisfy_length_and_source_invariants() {
        let html = r#"<html><head><title>Overview</title></head><body><main>
            <p>First block of real content that easily clears the length floor.</p>
            <p>Second block of real content with different words in every spot.</p>
        </main></body></html>"#;
        let document = Html::parse_document(html);
        let (content, _) = extract_content(&document, true, &[]);
        let mut hashes = BoundedHashSet::new(1000);
        let ctx = ChunkContext::new("https://sub.example.org/overview.html", "Overview", 2, "en");
        let docs = create_chunks(&content, &ctx, ChunkType::Character, 200, 40, &mut hashes);
        assert!(!docs.is_empty());
        for doc in &docs {
            assert!(doc.content.len() >= 30);
            assert!(Url::parse(&doc.metadata.source).is_ok());
            assert_eq!(doc.metadata.depth, 2);
            assert_eq!(doc.metadata.chunk_type, ChunkType::Character);
        }
    }
}

#[cfg(test)]
mod pipeline_tests {
    use crate::chunker::{ChunkContext, ChunkType, create_chunks, create_full_text_document};
    use crate::config::PipelineConfig;
    use crate::pipeline::{Pipeline, UrlMap, UrlTask};
    use crate::state::BoundedHashSet;

    #[test]
    fn pdf_urls_are_skipped_before_any_fetch() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let map: UrlMap =
            serde_json::from_str(r#"["https://h/files/annual_report.pdf", "https://h/x.zip"]"#)
                .expect("map");
        let tasks = pipeline.prepare_tasks(map);
        assert!(tasks.is_empty());
        let errors = pipeline.state().errors_snapshot();
        assert_eq!(
            errors.get("https://h/files/annual_report.pdf").map(String::as_str),
            Some("skip-ext")
        );
        assert_eq!(errors.get("https://h/x.zip").map(String::as_str), Some("skip-ext"));
    }

    #[test]
    fn redirect_to_processed_target_short_circuits() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        tokio_test::block_on(async {
            let pipeline = Pipeline::new(PipelineConfig::default());
            let state = pipeline.state();
            state.mark_processed("https://h/b");
            state.remember_redirect("https://h/a", "https://h/b");

            let output = pipeline
                .run(vec![UrlTask {
                    url: "https://h/a".into(),
                    depth: 0,
                }])
                .await;

            assert!(output.character_chunks.is_empty());
            assert!(output.structural_chunks.is_empty());
            assert!(output.full_text_chunks.is_empty());
            assert!(state.is_processed("https://h/a"));
            assert_eq!(
                state.redirect_target("https://h/a").as_deref(),
                Some("https://h/b")
            );
        });
    }

    #[tokio::test]
    async fn cached_urls_replay_identically_without_fetching() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let state = pipeline.state();
        let ctx = ChunkContext::new("https://h/cached", "Cached", 1, "en");

        let (char_docs, full_doc) = {
            let mut char_hashes = BoundedHashSet::new(100);
            let mut full_hashes = BoundedHashSet::new(100);
            let text = "Cached page body that was chunked on the first pass through.";
            (
                create_chunks(text, &ctx, ChunkType::Character, 1000, 200, &mut char_hashes),
                create_full_text_document(text, &ctx, &mut full_hashes),
            )
        };
        let mut all = char_docs.clone();
        let full_doc = full_doc.expect("full-text document");
        all.push(full_doc.clone());
        state.mark_processed("https://h/cached");
        state.cache_documents("https://h/cached", all);

        let first = pipeline
            .run(vec![UrlTask {
                url: "https://h/cached".into(),
                depth: 1,
            }])
            .await;
        let second = pipeline
            .run(vec![UrlTask {
                url: "https://h/cached".into(),
                depth: 1,
            }])
            .await;

        assert_eq!(first.character_chunks, char_docs);
        assert_eq!(first.full_text_chunks, vec![full_doc]);
        assert_eq!(first.character_chunks, second.character_chunks);
        assert_eq!(first.structural_chunks, second.structural_chunks);
        assert_eq!(first.full_text_chunks, second.full_text_chunks);
    }

    #[tokio::test]
    async fn errors_and_chunk_producers_stay_disjoint() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let state = pipeline.state();
        let map: UrlMap = serde_json::from_str(r#"["https://h/gone.pdf"]"#).expect("map");
        let tasks = pipeline.prepare_tasks(map);
        let output = pipeline.run(tasks).await;

        let errors = state.errors_snapshot();
        let produced: Vec<&str> = output
            .character_chunks
            .iter()
            .chain(output.structural_chunks.iter())
            .chain(output.full_text_chunks.iter())
            .map(|d| d.metadata.source.as_str())
            .collect();
        for url in errors.keys() {
            assert!(!produced.contains(&url.as_str()));
        }
    }
}

#[cfg(test)]
mod scenario_tests {
    use crate::chunker::ChunkType;
    use crate::config::PipelineConfig;
    use crate::fetcher::{self, PageVerdict};
    use crate::pipeline::harvest_html;
    use crate::state::PipelineState;

    #[test]
    fn under_threshold_page_yields_no_chunks_in_any_family() {
        let config = PipelineConfig::default();
        let state = PipelineState::new();
        let html = "<html><head><title>Stub</title></head>\
                    <body><main><p>Ten chars.</p></main></body></html>";

        let (char_docs, struct_docs, full_docs) =
            harvest_html(&config, &state, "https://example.org/empty", 0, html);

        assert!(char_docs.is_empty());
        assert!(struct_docs.is_empty());
        assert!(full_docs.is_empty());
        // under the threshold is not an error, and the page is not counted
        assert!(state.page_record("https://example.org/empty").is_none());
        assert!(state.errors_snapshot().is_empty());
        assert!(state.cached_documents("https://example.org/empty").is_none());
    }

    #[test]
    fn soft_blocked_body_escalates_and_render_yields_character_chunks() {
        // 200-byte response carrying a javascript gate: the fetcher must
        // escalate rather than hand this to the extractor
        let mut thin = String::from("<html><body><p>javascript required</p></body></html>");
        while thin.len() < 200 {
            thin.push(' ');
        }
        assert_eq!(thin.len(), 200);
        assert!(fetcher::body_requires_render(&thin));

        // what the render backend hands back for the same URL
        let mut rendered =
            String::from("<html><head><title>Rendered status page</title></head><body><main>");
        for i in 0..12 {
            rendered.push_str(&format!(
                "<p>Paragraph {i} carries enough rendered text to be chunked and indexed properly.</p>"
            ));
        }
        rendered.push_str("</main></body></html>");
        assert!(rendered.len() >= 1000);
        assert_eq!(fetcher::classify_rendered(&rendered), PageVerdict::Clean);

        let config = PipelineConfig::default();
        let state = PipelineState::new();
        let (char_docs, _, full_docs) =
            harvest_html(&config, &state, "https://example.org/js-page", 0, &rendered);

        assert!(!char_docs.is_empty());
        assert!(
            char_docs
                .iter()
                .all(|d| d.metadata.chunk_type == ChunkType::Character)
        );
        assert!(!full_docs.is_empty());
        assert!(state.page_record("https://example.org/js-page").is_some());
    }
}

#[cfg(test)]
mod full_text_tests {
    use crate::chunker::{ChunkContext, create_full_text_document};
    use crate::cleaner::clean_content;
    use crate::state::BoundedHashSet;

    #[test]
    fn full_text_document_carries_the_whole_cleaned_body() {
        let html = r#"<html><body><main>
            <p>Complete description of the experiment hall and its detectors.</p>
        </main></body></html>"#;
        let body = clean_content(html);
        let mut hashes = BoundedHashSet::new(100);
        let ctx = ChunkContext::new("https://h/hall", "Hall", 0, "en");
        let doc = create_full_text_document(&body, &ctx, &mut hashes).expect("document");
        assert_eq!(doc.content, body);
        assert_eq!(doc.metadata.total_chunks, 1);
    }

    #[test]
    fn identical_bodies_on_two_urls_emit_once() {
        let body = "Shared boilerplate body text that two mirrors serve identically.";
        let mut hashes = BoundedHashSet::new(100);
        let first = create_full_text_document(
            body,
            &ChunkContext::new("https://h/a", "A", 0, "en"),
            &mut hashes,
        );
        let second = create_full_text_document(
            body,
            &ChunkContext::new("https://mirror/a", "A", 0, "en"),
            &mut hashes,
        );
        assert!(first.is_some());
        assert!(second.is_none());
    }
}
