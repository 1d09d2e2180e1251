//! Persistence integration tests.
//!
//! Verifies:
//! - Accepted operations survive a store restart
//! - Replay through the RocksDB backend matches the live document
//! - Undecodable records make the document fail to load
//! - Deleting a document's log resets it
//! - Multi-document isolation within one store
//! - Backing files are written on close and used as base content, not as an entry

use quire_collab::storage::{LogProvider, OperationLog, RocksLogConfig, RocksLogProvider};
use quire_collab::{
    DocumentConfig, DocumentError, DocumentHandle, DocumentRegistry, History, Operation,
};

use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use uuid::Uuid;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn open_store(path: &Path) -> Arc<RocksLogProvider> {
    Arc::new(RocksLogProvider::open(RocksLogConfig::for_testing(path)).unwrap())
}

/// Append `count` numbered lines, each authored by a fresh actor.
async fn write_lines(doc: &DocumentHandle, count: usize) {
    for i in 0..count {
        let snapshot = doc.snapshot().await.unwrap();
        let len = snapshot.content.len();
        let line = format!("line {i}\n");
        let op = Operation::insert_at(len, len, line).unwrap();
        doc.apply(op, Uuid::new_v4(), snapshot.index).await.unwrap();
    }
}

// ─── Restart ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_operations_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("db");

    let live = {
        let store = open_store(&db_path);
        let doc = DocumentHandle::open(store, "journal", DocumentConfig::for_testing())
            .await
            .unwrap();
        write_lines(&doc, 12).await;
        let snapshot = doc.snapshot().await.unwrap();
        doc.close().await;
        snapshot
    };
    assert_eq!(live.index, Some(11));

    let store = open_store(&db_path);
    let doc = DocumentHandle::open(store.clone(), "journal", DocumentConfig::for_testing())
        .await
        .unwrap();
    assert_eq!(doc.snapshot().await.unwrap(), live);

    // A stale edit is rebased past every replayed entry. The nil author
    // wins every insert tie, so the heading lands first.
    let stale = Operation::insert_at(0, 0, "# journal\n").unwrap();
    let accepted = doc.apply(stale, Uuid::nil(), None).await.unwrap();
    assert_eq!(accepted.index, 12);
    let content = doc.snapshot().await.unwrap().content;
    assert_eq!(content, [b"# journal\n".as_slice(), live.content.as_slice()].concat());
    doc.close().await;
}

#[tokio::test]
async fn test_replay_matches_direct_recovery() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("db"));

    let doc = DocumentHandle::open(store.clone(), "three", DocumentConfig::for_testing())
        .await
        .unwrap();
    let author = Uuid::new_v4();
    doc.apply(Operation::insert_at(0, 0, "abc").unwrap(), author, None)
        .await
        .unwrap();
    doc.apply(Operation::insert_at(3, 1, "X").unwrap(), author, Some(0))
        .await
        .unwrap();
    doc.apply(Operation::delete_at(b"aXbc", 3, 1).unwrap(), author, Some(1))
        .await
        .unwrap();
    let live = doc.snapshot().await.unwrap();
    doc.close().await;

    let log = store.recover("three").unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log.read(2).unwrap().meta.base, Some(1));

    let (history, content) = History::recover(log, 2).unwrap();
    assert_eq!(history.next_index(), 3);
    assert_eq!(content, live.content);
    assert_eq!(content, b"aXb");
}

// ─── Corruption ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_deleted_document_starts_empty() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("db"));
    {
        let doc = DocumentHandle::open(store.clone(), "doc", DocumentConfig::for_testing())
            .await
            .unwrap();
        write_lines(&doc, 3).await;
        doc.close().await;
    }

    assert_eq!(store.delete_document("doc").unwrap(), 3);
    let doc = DocumentHandle::open(store.clone(), "doc", DocumentConfig::for_testing())
        .await
        .unwrap();
    let snapshot = doc.snapshot().await.unwrap();
    assert!(snapshot.content.is_empty());
    assert_eq!(snapshot.index, None);
    doc.close().await;
}

#[tokio::test]
async fn test_undecodable_record_fails_load() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("db"));

    // A well-formed envelope whose payload is not an operation.
    let mut log = store.recover("doc").unwrap();
    let meta = quire_collab::RecordMeta::new(0, Uuid::nil(), None);
    log.push(&meta, b"not an operation").unwrap();
    log.close().unwrap();

    let result = DocumentHandle::open(store.clone(), "doc", DocumentConfig::for_testing()).await;
    assert!(matches!(result, Err(DocumentError::Load(_))));
}

// ─── Isolation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_documents_isolated_in_one_store() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("db"));
    let registry = DocumentRegistry::with_provider(store.clone(), DocumentConfig::for_testing());

    let a = registry.open("a.txt").await.unwrap();
    let b = registry.open("b.txt").await.unwrap();
    write_lines(&a, 5).await;
    write_lines(&b, 2).await;

    assert_eq!(a.snapshot().await.unwrap().index, Some(4));
    assert_eq!(b.snapshot().await.unwrap().content, b"line 0\nline 1\n");
    registry.shutdown().await;

    let mut names = store.list_documents().unwrap();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

// ─── Backing File ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_file_seed_and_flush() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("docs");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("readme.md"), "# Title\n").unwrap();

    let store = open_store(&dir.path().join("db"));
    let config = DocumentConfig::for_testing().with_root_dir(&root);

    {
        let doc = DocumentHandle::open(store.clone(), "readme.md", config.clone())
            .await
            .unwrap();
        let snapshot = doc.snapshot().await.unwrap();
        assert_eq!(snapshot.content, b"# Title\n");
        assert_eq!(snapshot.index, None);

        let op = Operation::insert_at(8, 8, "body\n").unwrap();
        let accepted = doc.apply(op, Uuid::new_v4(), None).await.unwrap();
        assert_eq!(accepted.index, 0);
        doc.close().await;
    }
    assert_eq!(
        std::fs::read(root.join("readme.md")).unwrap(),
        b"# Title\nbody\n"
    );

    // The seed is the log's base content, so later file edits do not change replay.
    std::fs::write(root.join("readme.md"), "edited outside").unwrap();
    let doc = DocumentHandle::open(store.clone(), "readme.md", config)
        .await
        .unwrap();
    let snapshot = doc.snapshot().await.unwrap();
    assert_eq!(snapshot.content, b"# Title\nbody\n");
    assert_eq!(snapshot.index, Some(0));
    doc.close().await;

    let log = store.recover("readme.md").unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log.base_content().unwrap().as_deref(), Some(&b"# Title\n"[..]));
}
