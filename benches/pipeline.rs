use criterion::{black_box, criterion_group, criterion_main, Criterion};
use omnichat::protocol::{normalize_record, DeltaVec, ProviderStreamKind};
use omnichat::stream::{SseParser, SseRecord};

const PLAIN_BODY: &str = "\
data: {\"choices\":[{\"delta\":{\"content\":\"The quick brown fox \"},\"index\":0,\"finish_reason\":null}]}\n\
\n\
data: {\"choices\":[{\"delta\":{\"content\":\"jumps over \",\"reasoning_content\":\"considering idioms\"},\"index\":0,\"finish_reason\":null}]}\n\
\n\
data: {\"choices\":[{\"delta\":{\"content\":\"the lazy dog.\"},\"index\":0,\"finish_reason\":null}]}\n\
\n\
data: {\"groundingMetadata\":{\"groundingChunks\":[{\"web\":{\"uri\":\"http://example.com\",\"title\":\"Example\"}}]}}\n\
\n\
data: [DONE]\n\
\n";

const GEMINI_CHUNK: &str = "{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"pondering the question\",\"thought\":true},{\"text\":\"The answer is 42.\"}]},\"groundingMetadata\":{\"groundingChunks\":[]}}]}";

fn bench_reassembly(c: &mut Criterion) {
    c.bench_function("sse_parse_whole_body", |b| {
        b.iter(|| {
            let mut parser = SseParser::new();
            black_box(parser.feed(black_box(PLAIN_BODY)))
        });
    });

    c.bench_function("sse_parse_fragmented", |b| {
        b.iter(|| {
            let mut parser = SseParser::new();
            let mut records = Vec::new();
            for chunk in PLAIN_BODY.as_bytes().chunks(7) {
                let chunk = std::str::from_utf8(chunk).expect("ascii fixture");
                parser.feed_into(black_box(chunk), &mut records);
            }
            black_box(records)
        });
    });
}

fn bench_normalize(c: &mut Criterion) {
    let mut parser = SseParser::new();
    let plain_records = parser.feed(PLAIN_BODY);
    let gemini_record = SseRecord {
        event: None,
        data: GEMINI_CHUNK.to_string(),
    };

    c.bench_function("normalize_plain_records", |b| {
        b.iter(|| {
            let mut out = DeltaVec::new();
            for record in &plain_records {
                normalize_record(black_box(record), ProviderStreamKind::Plain, &mut out);
            }
            black_box(out.len())
        });
    });

    c.bench_function("normalize_gemini_chunk", |b| {
        b.iter(|| {
            let mut out = DeltaVec::new();
            normalize_record(
                black_box(&gemini_record),
                ProviderStreamKind::Gemini,
                &mut out,
            );
            black_box(out.len())
        });
    });
}

criterion_group!(benches, bench_reassembly, bench_normalize);
criterion_main!(benches);
