use criterion::{Criterion, black_box, criterion_group, criterion_main};
use webharvest::chunker::{ChunkContext, ChunkType, create_chunks, split_text_by_size};
use webharvest::cleaner::clean_content;
use webharvest::extractor::extract_content;
use webharvest::state::BoundedHashSet;

const SAMPLE_HTML: &str = r#"
<!DOCTYPE html>
<html>
<head>
    <title>Accelerator status</title>
</head>
<body>
    <nav id="topmenu"><ul><li class="inactive"><a href="/">Start</a></li></ul></nav>
    <div class="cookie-consent-wrapper">We use cookies to improve your experience.</div>
    <main>
        <h1>Machine status overview</h1>
        <p>The storage ring delivered beam to all experimental stations this week,
           with an availability of 97 percent across the three operation shifts.</p>
        <h2>Injector performance</h2>
        <p>The injector chain reached its design current and transfer efficiency
           stayed above the target band through every fill of the run.</p>
        <table>
            <tr><th>Station</th><th>Hours</th></tr>
            <tr><td>P01 imaging hutch</td><td>118</td></tr>
            <tr><td>P02 diffraction hutch</td><td>112</td></tr>
        </table>
    </main>
    <footer>Imprint and legal information</footer>
</body>
</html>
"#;

fn long_text() -> String {
    let mut text = String::new();
    for i in 0..200 {
        text.push_str(&format!(
            "Sentence number {i} reports one more measurement from the weekly machine summary. "
        ));
    }
    text
}

fn benchmark_cleaner(c: &mut Criterion) {
    c.bench_function("clean_content", |b| {
        b.iter(|| clean_content(black_box(SAMPLE_HTML)));
    });
}

fn benchmark_extractor(c: &mut Criterion) {
    c.bench_function("extract_content", |b| {
        b.iter(|| {
            let document = scraper::Html::parse_document(black_box(SAMPLE_HTML));
            extract_content(&document, true, &[])
        });
    });
}

fn benchmark_window_split(c: &mut Criterion) {
    let text = long_text();
    c.bench_function("split_text_by_size", |b| {
        b.iter(|| split_text_by_size(black_box(&text), 1000, 200, 30));
    });
}

fn benchmark_character_chunker(c: &mut Criterion) {
    let text = long_text();
    let ctx = ChunkContext::new("https://example.org/status", "Status", 0, "en");
    c.bench_function("create_chunks", |b| {
        b.iter(|| {
            let mut hashes = BoundedHashSet::new(100_000);
            create_chunks(
                black_box(&text),
                &ctx,
                ChunkType::Character,
                1000,
                200,
                &mut hashes,
            )
        });
    });
}

criterion_group!(
    benches,
    benchmark_cleaner,
    benchmark_extractor,
    benchmark_window_split,
    benchmark_character_chunker
);
criterion_main!(benches);
