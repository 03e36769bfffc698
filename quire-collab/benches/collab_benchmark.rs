use std::collections::HashMap;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use quire_collab::broadcast::{fan_out, outbox, AtomicBroadcastStats};
use quire_collab::delta::Delta;
use quire_collab::protocol::{self, ClientEvent, ServerEvent};
use quire_collab::storage::{DocumentStore, RocksStore, StoreConfig};
use uuid::Uuid;

/// A document of `paragraphs` lines, every other one bold.
fn large_document(paragraphs: usize) -> Delta {
    let mut bold = serde_json::Map::new();
    bold.insert("bold".into(), serde_json::Value::Bool(true));

    let mut doc = Delta::new();
    for i in 0..paragraphs {
        let line = format!("Paragraph {i} of the collaborative document.\n");
        let attributes = (i % 2 == 0).then(|| bold.clone());
        doc = doc.insert(line, attributes);
    }
    doc
}

fn bench_apply_typing(c: &mut Criterion) {
    let doc = large_document(1_000);
    let middle = doc.length() / 2;
    let keystroke = Delta::new().retain(middle, None).insert("x", None);

    c.bench_function("apply_keystroke_1k_paragraphs", |b| {
        b.iter(|| black_box(doc.apply(black_box(&keystroke)).unwrap()))
    });
}

fn bench_compose_formatting(c: &mut Criterion) {
    let doc = large_document(1_000);
    let mut italic = serde_json::Map::new();
    italic.insert("italic".into(), serde_json::Value::Bool(true));
    let format_all = Delta::new().retain(doc.length() - 1, Some(italic));

    c.bench_function("compose_format_whole_document", |b| {
        b.iter(|| black_box(doc.compose(black_box(&format_all))))
    });
}

fn bench_event_encode(c: &mut Criterion) {
    let event = ServerEvent::ReceiveChanges(Delta::new().retain(120, None).insert("hello", None));

    c.bench_function("receive_changes_encode", |b| {
        b.iter(|| black_box(protocol::encode(black_box(&event)).unwrap()))
    });
}

fn bench_event_decode(c: &mut Criterion) {
    let frame = protocol::encode(&ClientEvent::SendChanges(
        Delta::new().retain(120, None).insert("hello", None),
    ))
    .unwrap();

    c.bench_function("send_changes_decode", |b| {
        b.iter(|| black_box(protocol::decode::<ClientEvent>(black_box(&frame)).unwrap()))
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let stats = AtomicBroadcastStats::new();
    let mut outboxes = HashMap::new();
    let mut inboxes = Vec::new();
    for _ in 0..100 {
        let (tx, rx) = outbox();
        outboxes.insert(Uuid::new_v4(), tx);
        inboxes.push(rx);
    }
    let origin = outboxes.keys().next().copied();
    let event = ServerEvent::ReceiveChanges(Delta::new().insert("x", None));

    c.bench_function("fan_out_100_members", |b| {
        b.iter(|| {
            let sent = fan_out(outboxes.iter(), origin, event.clone(), &stats);
            for inbox in &mut inboxes {
                while inbox.try_recv().is_ok() {}
            }
            black_box(sent)
        })
    });
}

fn bench_rocks_upsert(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let doc = large_document(200);

    c.bench_function("rocks_upsert_200_paragraphs", |b| {
        b.iter(|| black_box(store.upsert("bench", black_box(&doc)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_apply_typing,
    bench_compose_formatting,
    bench_event_encode,
    bench_event_decode,
    bench_fan_out,
    bench_rocks_upsert,
);

criterion_main!(benches);
