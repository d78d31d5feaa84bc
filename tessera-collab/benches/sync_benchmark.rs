use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tessera_collab::{
    CollabConfig, CollaboratorInfo, PollRequest, PresencePayload, RelayConfig, SessionKey,
    SyncRelay,
};
use tessera_collab::DocumentSession;
use tessera_core::{Block, BlockDocument, BlockOp};
use uuid::Uuid;

fn bench_request_encode(c: &mut Criterion) {
    let mut req = PollRequest::new(
        SessionKey::new("post", "42"),
        Uuid::new_v4(),
        vec![0u8; 32],
    );
    req.presence = Some(PresencePayload {
        info: CollaboratorInfo::new("Bench"),
        selection: None,
    });

    c.bench_function("poll_request_encode", |b| {
        b.iter(|| {
            black_box(black_box(&req).encode().unwrap());
        })
    });
}

fn bench_request_decode(c: &mut Criterion) {
    let req = PollRequest::new(
        SessionKey::new("post", "42"),
        Uuid::new_v4(),
        vec![0u8; 32],
    );
    let encoded = req.encode().unwrap();

    c.bench_function("poll_request_decode", |b| {
        b.iter(|| {
            black_box(PollRequest::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn bench_apply_splice(c: &mut Criterion) {
    let doc = BlockDocument::new();
    let block = Block::paragraph("the quick brown fox jumps over the lazy dog");
    doc.apply(&BlockOp::InsertBlock {
        index: 0,
        block: block.clone(),
    });

    c.bench_function("apply_splice_1_char", |b| {
        b.iter(|| {
            let out = doc.apply(black_box(&BlockOp::SpliceText {
                id: block.id,
                at: 4,
                delete: 0,
                insert: "x".into(),
            }));
            black_box(out);
        })
    });
}

fn bench_insert_100_blocks(c: &mut Criterion) {
    c.bench_function("insert_100_blocks", |b| {
        b.iter(|| {
            let doc = BlockDocument::new();
            for i in 0..100u32 {
                doc.apply(&BlockOp::InsertBlock {
                    index: i,
                    block: Block::paragraph(format!("paragraph {i}")),
                });
            }
            black_box(doc.full_state());
        })
    });
}

fn bench_snapshot_100_blocks(c: &mut Criterion) {
    let doc = BlockDocument::new();
    for i in 0..100u32 {
        doc.apply(&BlockOp::InsertBlock {
            index: i,
            block: Block::paragraph(format!("paragraph {i}")),
        });
    }

    c.bench_function("snapshot_100_blocks", |b| {
        b.iter(|| {
            black_box(doc.snapshot());
        })
    });
}

fn bench_merge_remote_update(c: &mut Criterion) {
    let source = BlockDocument::new();
    source.apply(&BlockOp::InsertBlock {
        index: 0,
        block: Block::paragraph("a typical remote edit"),
    });
    let update = source.full_state();

    c.bench_function("merge_remote_update", |b| {
        b.iter(|| {
            let doc = BlockDocument::new();
            doc.apply_remote(black_box(&update)).unwrap();
            black_box(doc.block_count());
        })
    });
}

fn bench_relay_poll(c: &mut Criterion) {
    let relay = Arc::new(SyncRelay::new(RelayConfig::default()));
    let config = CollabConfig::default();
    let session = DocumentSession::new(SessionKey::new("post", "bench"), &config);
    session.apply_local(&BlockOp::InsertBlock {
        index: 0,
        block: Block::paragraph("warm the room"),
    });
    relay.handle(&session.build_request(None)).unwrap();

    c.bench_function("relay_poll_no_changes", |b| {
        b.iter(|| {
            let req = session.build_request(None);
            black_box(relay.handle(black_box(&req)).unwrap());
        })
    });
}

fn bench_undo_redo_cycle(c: &mut Criterion) {
    let config = CollabConfig {
        undo_capture_window: std::time::Duration::ZERO,
        ..CollabConfig::default()
    };
    let session = DocumentSession::new(SessionKey::new("post", "bench"), &config);
    let block = Block::paragraph("undo target");
    session.apply_local(&BlockOp::InsertBlock {
        index: 0,
        block: block.clone(),
    });

    c.bench_function("undo_redo_cycle", |b| {
        b.iter(|| {
            session.apply_local(black_box(&BlockOp::SpliceText {
                id: block.id,
                at: 0,
                delete: 0,
                insert: "x".into(),
            }));
            session.undo();
            black_box(session.redo());
            session.undo();
        })
    });
}

criterion_group!(
    benches,
    bench_request_encode,
    bench_request_decode,
    bench_apply_splice,
    bench_insert_100_blocks,
    bench_snapshot_100_blocks,
    bench_merge_remote_update,
    bench_relay_poll,
    bench_undo_redo_cycle,
);
criterion_main!(benches);
