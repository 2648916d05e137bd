//! End-to-end freezer behaviour against an in-memory or local object backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ancient_core::{AncientRecord, AncientStore, BlockItem, FreezerError, HashItem, Kind};
use ancient_storage::{
    BackendConfig, ChunkCodec, Encoding, Freezer, FreezerConfig, ObjectBackend,
    ObjectStoreBackend, INDEX_MARKER_KEY,
};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

fn record(n: u64) -> AncientRecord {
    let mut hash = vec![0xaa; 24];
    hash.extend_from_slice(&n.to_be_bytes());
    let tagged = |tag: u8| {
        let mut blob = vec![tag];
        blob.extend_from_slice(&n.to_be_bytes());
        blob
    };
    AncientRecord {
        hash,
        header: tagged(0xbb),
        body: tagged(0xcc),
        receipts: tagged(0xdd),
        td: tagged(0xee),
    }
}

fn rewritten_record(n: u64) -> AncientRecord {
    let mut record = record(n);
    record.header = vec![0x11, n as u8];
    record
}

fn production_config() -> FreezerConfig {
    FreezerConfig {
        block_group_size: 1024,
        hash_group_size: 32768,
        encoding: Encoding::JsonGz,
        ..Default::default()
    }
}

fn small_config() -> FreezerConfig {
    FreezerConfig {
        block_group_size: 4,
        hash_group_size: 8,
        encoding: Encoding::Json,
        ..Default::default()
    }
}

fn memory_backend() -> Arc<dyn ObjectBackend> {
    Arc::new(ObjectStoreBackend::in_memory("test"))
}

async fn append_range(freezer: &Freezer, range: std::ops::Range<u64>) {
    for n in range {
        freezer.append_ancient(n, record(n)).await.unwrap();
        assert_eq!(freezer.ancients().await.unwrap(), n + 1);
    }
}

async fn marker(backend: &Arc<dyn ObjectBackend>) -> String {
    let raw = backend.get(INDEX_MARKER_KEY).await.unwrap();
    String::from_utf8(raw.to_vec()).unwrap()
}

async fn keys(backend: &Arc<dyn ObjectBackend>, prefix: &str) -> Vec<String> {
    backend.list(prefix, None, usize::MAX).await.unwrap()
}

async fn block_chunk(backend: &Arc<dyn ObjectBackend>, key: &str, encoding: Encoding) -> Vec<BlockItem> {
    let payload = backend.get(key).await.unwrap();
    ChunkCodec::new(encoding).decode(&payload).unwrap()
}

async fn hash_chunk(backend: &Arc<dyn ObjectBackend>, key: &str, encoding: Encoding) -> Vec<HashItem> {
    let payload = backend.get(key).await.unwrap();
    ChunkCodec::new(encoding).decode(&payload).unwrap()
}

async fn assert_reads_back(freezer: &Freezer, range: std::ops::Range<u64>) {
    for n in range {
        let expected = record(n);
        for kind in Kind::ALL {
            assert_eq!(
                freezer.ancient(kind, n).await.unwrap(),
                expected.field(kind),
                "{} #{}",
                kind,
                n
            );
        }
    }
}

async fn assert_out_of_bounds(freezer: &Freezer, range: std::ops::Range<u64>) {
    for n in range {
        for kind in Kind::ALL {
            let err = freezer.ancient(kind, n).await.unwrap_err();
            assert!(
                matches!(err, FreezerError::OutOfBounds { .. }),
                "{} #{}: {}",
                kind,
                n,
                err
            );
        }
    }
}

/// Freezer with 2050 synced items, as most scenarios start from.
async fn synced_2050() -> (Arc<dyn ObjectBackend>, Freezer) {
    let backend = memory_backend();
    let freezer = Freezer::open(backend.clone(), production_config())
        .await
        .unwrap();
    append_range(&freezer, 0..2050).await;
    freezer.sync().await.unwrap();
    (backend, freezer)
}

#[tokio::test]
async fn test_fresh_append_and_sync_writes_aligned_chunks() {
    let (backend, freezer) = synced_2050().await;
    assert_eq!(freezer.ancients().await.unwrap(), 2050);

    assert_eq!(
        keys(&backend, "blocks").await,
        vec![
            "blocks/000000000.json.gz",
            "blocks/000001024.json.gz",
            "blocks/000002048.json.gz",
        ]
    );
    // Two complete block chunks, plus the open chunk holding 2048..2050
    assert_eq!(
        block_chunk(&backend, "blocks/000000000.json.gz", Encoding::JsonGz)
            .await
            .len(),
        1024
    );
    assert_eq!(
        block_chunk(&backend, "blocks/000001024.json.gz", Encoding::JsonGz)
            .await
            .len(),
        1024
    );
    assert_eq!(
        block_chunk(&backend, "blocks/000002048.json.gz", Encoding::JsonGz)
            .await
            .len(),
        2
    );

    // No complete hash chunk yet; the open one holds everything so far
    assert_eq!(keys(&backend, "hashes").await, vec!["hashes/000000000.json.gz"]);
    assert_eq!(
        hash_chunk(&backend, "hashes/000000000.json.gz", Encoding::JsonGz)
            .await
            .len(),
        2050
    );

    assert_eq!(marker(&backend).await, "2050");
}

#[tokio::test]
async fn test_reopen_reads_every_item() {
    let (backend, freezer) = synced_2050().await;
    freezer.close().await.unwrap();
    drop(freezer);

    let reopened = Freezer::open(backend, production_config()).await.unwrap();
    assert_eq!(reopened.ancients().await.unwrap(), 2050);
    assert_reads_back(&reopened, 0..2050).await;
}

#[tokio::test]
async fn test_out_of_order_append_leaves_frontier() {
    let (_backend, freezer) = synced_2050().await;

    let err = freezer.append_ancient(2049, record(2049)).await.unwrap_err();
    assert!(matches!(
        err,
        FreezerError::OutOfOrder {
            number: 2049,
            frozen: 2050
        }
    ));
    let err = freezer.append_ancient(2051, record(2051)).await.unwrap_err();
    assert!(matches!(err, FreezerError::OutOfOrder { .. }));
    assert_eq!(freezer.ancients().await.unwrap(), 2050);
}

#[tokio::test]
async fn test_invalid_record_leaves_frontier() {
    let freezer = Freezer::open_in_memory(small_config()).await.unwrap();
    let mut bad = record(0);
    bad.hash.truncate(8);

    let err = freezer.append_ancient(0, bad).await.unwrap_err();
    assert!(matches!(err, FreezerError::InvalidRecord(_)));
    assert_eq!(freezer.ancients().await.unwrap(), 0);
}

#[tokio::test]
async fn test_truncate_to_unaligned_item() {
    let (backend, freezer) = synced_2050().await;

    freezer.truncate_ancients(1500).await.unwrap();

    assert_eq!(freezer.ancients().await.unwrap(), 1500);
    assert_eq!(marker(&backend).await, "1500");
    assert_eq!(
        keys(&backend, "blocks").await,
        vec!["blocks/000000000.json.gz", "blocks/000001024.json.gz"]
    );
    assert_eq!(
        block_chunk(&backend, "blocks/000001024.json.gz", Encoding::JsonGz)
            .await
            .len(),
        476
    );
    assert_eq!(
        hash_chunk(&backend, "hashes/000000000.json.gz", Encoding::JsonGz)
            .await
            .len(),
        1500
    );

    assert_out_of_bounds(&freezer, 1500..2050).await;
    assert_reads_back(&freezer, 0..1500).await;

    // Durable state agrees with the in-memory view
    let reopened = Freezer::open(backend, production_config()).await.unwrap();
    assert_eq!(reopened.ancients().await.unwrap(), 1500);
    assert_out_of_bounds(&reopened, 1500..1510).await;
    assert_reads_back(&reopened, 1000..1500).await;
}

#[tokio::test]
async fn test_truncate_below_flushed_chunk() {
    let (backend, freezer) = synced_2050().await;

    freezer.truncate_ancients(500).await.unwrap();

    assert_eq!(marker(&backend).await, "500");
    assert_eq!(keys(&backend, "blocks").await, vec!["blocks/000000000.json.gz"]);
    assert_eq!(
        block_chunk(&backend, "blocks/000000000.json.gz", Encoding::JsonGz)
            .await
            .len(),
        500
    );

    freezer.append_ancient(500, record(500)).await.unwrap();
    assert_eq!(freezer.ancients().await.unwrap(), 501);
    assert_reads_back(&freezer, 0..501).await;
}

#[tokio::test]
async fn test_truncate_is_idempotent() {
    let (backend, freezer) = synced_2050().await;

    freezer.truncate_ancients(1500).await.unwrap();
    let blocks = keys(&backend, "blocks").await;
    let chunk = backend.get("blocks/000001024.json.gz").await.unwrap();

    freezer.truncate_ancients(1500).await.unwrap();
    assert_eq!(freezer.ancients().await.unwrap(), 1500);
    assert_eq!(keys(&backend, "blocks").await, blocks);
    assert_eq!(backend.get("blocks/000001024.json.gz").await.unwrap(), chunk);
    assert_eq!(marker(&backend).await, "1500");

    // Truncating above the frontier changes nothing
    freezer.truncate_ancients(4000).await.unwrap();
    assert_eq!(freezer.ancients().await.unwrap(), 1500);
}

#[tokio::test]
async fn test_truncate_to_aligned_boundary_and_zero() {
    let backend = memory_backend();
    let freezer = Freezer::open(backend.clone(), small_config()).await.unwrap();
    append_range(&freezer, 0..14).await;
    freezer.sync().await.unwrap();

    freezer.truncate_ancients(8).await.unwrap();
    assert_eq!(
        keys(&backend, "blocks").await,
        vec!["blocks/000000000.json", "blocks/000000004.json"]
    );
    assert_eq!(keys(&backend, "hashes").await, vec!["hashes/000000000.json"]);
    assert_out_of_bounds(&freezer, 8..14).await;
    assert_reads_back(&freezer, 0..8).await;

    freezer.truncate_ancients(0).await.unwrap();
    assert_eq!(freezer.ancients().await.unwrap(), 0);
    assert!(keys(&backend, "blocks").await.is_empty());
    assert!(keys(&backend, "hashes").await.is_empty());
    assert_eq!(marker(&backend).await, "0");

    append_range(&freezer, 0..3).await;
    assert_reads_back(&freezer, 0..3).await;
}

#[tokio::test]
async fn test_truncate_removes_chunks_with_wide_keys() {
    let backend = memory_backend();
    let freezer = Freezer::open(backend.clone(), small_config()).await.unwrap();
    append_range(&freezer, 0..6).await;
    freezer.sync().await.unwrap();

    backend
        .put("blocks/1000000000.json", Bytes::from_static(b"[]"))
        .await
        .unwrap();
    freezer.truncate_ancients(4).await.unwrap();

    assert_eq!(keys(&backend, "blocks").await, vec!["blocks/000000000.json"]);
    assert_reads_back(&freezer, 0..4).await;
}

#[tokio::test]
async fn test_marker_dominates_stale_chunks() {
    let backend = memory_backend();
    let freezer = Freezer::open(backend.clone(), small_config()).await.unwrap();
    append_range(&freezer, 0..10).await;
    freezer.sync().await.unwrap();
    drop(freezer);

    // Simulate a crash right after a truncation rewrote the marker
    backend
        .put(INDEX_MARKER_KEY, Bytes::from_static(b"6"))
        .await
        .unwrap();

    let freezer = Freezer::open(backend.clone(), small_config()).await.unwrap();
    assert_eq!(freezer.ancients().await.unwrap(), 6);
    assert_out_of_bounds(&freezer, 6..10).await;
    assert_reads_back(&freezer, 0..6).await;

    for n in 6..10 {
        freezer.append_ancient(n, rewritten_record(n)).await.unwrap();
    }
    freezer.sync().await.unwrap();

    let reopened = Freezer::open(backend.clone(), small_config()).await.unwrap();
    for n in 6..10 {
        assert_eq!(
            reopened.ancient(Kind::Header, n).await.unwrap(),
            vec![0x11, n as u8]
        );
    }
    let stale = block_chunk(&backend, "blocks/000000008.json", Encoding::Json).await;
    assert_eq!(stale.len(), 2);
    assert_eq!(&stale[0].header[..], &[0x11, 8]);
}

#[tokio::test]
async fn test_chunk_keys_are_aligned() {
    let backend = memory_backend();
    let config = small_config();
    let freezer = Freezer::open(backend.clone(), config.clone()).await.unwrap();
    append_range(&freezer, 0..37).await;
    freezer.sync().await.unwrap();
    freezer.truncate_ancients(23).await.unwrap();
    append_range(&freezer, 23..30).await;
    freezer.sync().await.unwrap();

    for (prefix, family, group) in [
        ("blocks", ancient_core::Family::Blocks, config.block_group_size),
        ("hashes", ancient_core::Family::Hashes, config.hash_group_size),
    ] {
        let listed = keys(&backend, prefix).await;
        assert!(!listed.is_empty());
        for key in listed {
            let start = ChunkCodec::parse_chunk_key(family, &key).unwrap();
            assert_eq!(start % group, 0, "{}", key);
        }
    }
    assert_reads_back(&freezer, 0..30).await;
}

#[tokio::test]
async fn test_write_cache_overflow_flushes_complete_chunks() {
    let backend = memory_backend();
    let config = FreezerConfig {
        write_cache_chunks: 2,
        ..small_config()
    };
    let freezer = Freezer::open(backend.clone(), config.clone()).await.unwrap();
    append_range(&freezer, 0..21).await;

    // Nothing synced yet, but the cache had to make room
    assert!(backend.get(INDEX_MARKER_KEY).await.is_err());
    assert!(keys(&backend, "blocks").await.len() >= 3);
    assert_reads_back(&freezer, 0..21).await;

    freezer.sync().await.unwrap();
    let reopened = Freezer::open(backend, config).await.unwrap();
    assert_eq!(reopened.ancients().await.unwrap(), 21);
    assert_reads_back(&reopened, 0..21).await;
}

#[tokio::test]
async fn test_unsynced_items_are_lost_on_reopen() {
    let backend = memory_backend();
    let freezer = Freezer::open(backend.clone(), small_config()).await.unwrap();
    append_range(&freezer, 0..6).await;
    freezer.sync().await.unwrap();
    append_range(&freezer, 6..9).await;
    drop(freezer);

    let reopened = Freezer::open(backend, small_config()).await.unwrap();
    assert_eq!(reopened.ancients().await.unwrap(), 6);
    reopened.append_ancient(6, record(6)).await.unwrap();
}

#[tokio::test]
async fn test_ancient_range_crosses_chunks() {
    let backend = memory_backend();
    let freezer = Freezer::open(backend.clone(), small_config()).await.unwrap();
    append_range(&freezer, 0..12).await;
    freezer.sync().await.unwrap();

    let reopened = Freezer::open(backend, small_config()).await.unwrap();
    let headers = reopened
        .ancient_range(Kind::Header, 2, 7, 0)
        .await
        .unwrap();
    assert_eq!(headers.len(), 7);
    for (i, header) in headers.iter().enumerate() {
        assert_eq!(header, &record(2 + i as u64).header);
    }

    // Stops at the frontier
    let tail = reopened.ancient_range(Kind::Hash, 10, 50, 0).await.unwrap();
    assert_eq!(tail.len(), 2);

    // Byte limit: each header is 9 bytes
    let limited = reopened.ancient_range(Kind::Header, 0, 12, 20).await.unwrap();
    assert_eq!(limited.len(), 2);

    let err = reopened.ancient_range(Kind::Body, 12, 1, 0).await.unwrap_err();
    assert!(matches!(err, FreezerError::OutOfBounds { .. }));
}

#[tokio::test]
async fn test_has_ancient_and_size() {
    let freezer = Freezer::open_in_memory(small_config()).await.unwrap();
    append_range(&freezer, 0..3).await;

    assert!(freezer.has_ancient(Kind::Receipts, 2).await.unwrap());
    assert!(!freezer.has_ancient(Kind::Receipts, 3).await.unwrap());

    let err = freezer.ancient_size(Kind::Header).await.unwrap_err();
    assert!(matches!(err, FreezerError::NotSupported(_)));
}

#[tokio::test]
async fn test_read_only_freezer() {
    let backend = memory_backend();
    let freezer = Freezer::open(backend.clone(), small_config()).await.unwrap();
    append_range(&freezer, 0..5).await;
    freezer.sync().await.unwrap();

    let config = FreezerConfig {
        read_only: true,
        ..small_config()
    };
    let reader = Freezer::open(backend, config).await.unwrap();
    assert!(reader.is_read_only());
    assert_reads_back(&reader, 0..5).await;

    assert!(matches!(
        reader.append_ancient(5, record(5)).await,
        Err(FreezerError::ReadOnly)
    ));
    assert!(matches!(
        reader.truncate_ancients(1).await,
        Err(FreezerError::ReadOnly)
    ));
    reader.sync().await.unwrap();
    assert_eq!(reader.ancients().await.unwrap(), 5);
}

#[tokio::test]
async fn test_closed_freezer_rejects_calls() {
    let freezer = Freezer::open_in_memory(small_config()).await.unwrap();
    append_range(&freezer, 0..2).await;
    freezer.close().await.unwrap();
    freezer.close().await.unwrap();

    assert!(matches!(freezer.ancients().await, Err(FreezerError::Closed)));
    assert!(matches!(
        freezer.append_ancient(2, record(2)).await,
        Err(FreezerError::Closed)
    ));
}

#[tokio::test]
async fn test_corrupt_marker_fails_open() {
    let backend = memory_backend();
    backend
        .put(INDEX_MARKER_KEY, Bytes::from_static(b"twelve"))
        .await
        .unwrap();
    let err = Freezer::open(backend, small_config()).await.err().unwrap();
    assert!(matches!(err, FreezerError::Fatal(_)));
}

#[tokio::test]
async fn test_local_filesystem_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = BackendConfig::local(dir.path(), "chain");

    {
        let backend: Arc<dyn ObjectBackend> =
            Arc::new(ObjectStoreBackend::connect(&config).await.unwrap());
        let freezer = Freezer::open(backend, small_config()).await.unwrap();
        append_range(&freezer, 0..11).await;
        freezer.sync().await.unwrap();
        freezer.close().await.unwrap();
    }

    assert!(dir.path().join("chain").join("index-marker").is_file());
    assert!(dir
        .path()
        .join("chain")
        .join("blocks")
        .join("000000008.json")
        .is_file());

    let backend: Arc<dyn ObjectBackend> =
        Arc::new(ObjectStoreBackend::connect(&config).await.unwrap());
    let freezer = Freezer::open(backend, small_config()).await.unwrap();
    assert_eq!(freezer.ancients().await.unwrap(), 11);
    assert_reads_back(&freezer, 0..11).await;

    freezer.truncate_ancients(3).await.unwrap();
    assert!(!dir
        .path()
        .join("chain")
        .join("blocks")
        .join("000000004.json")
        .exists());
}

/// Backend whose next block-chunk download, once armed, parks with the
/// fetched bytes until released.
#[derive(Debug)]
struct GatedBackend {
    inner: Arc<dyn ObjectBackend>,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedBackend {
    fn new(inner: Arc<dyn ObjectBackend>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl ObjectBackend for GatedBackend {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn ensure(&self) -> ancient_core::Result<()> {
        self.inner.ensure().await
    }

    async fn put(&self, key: &str, data: Bytes) -> ancient_core::Result<()> {
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> ancient_core::Result<Bytes> {
        let result = self.inner.get(key).await;
        if key.starts_with("blocks/") && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        result
    }

    async fn delete(&self, key: &str) -> ancient_core::Result<()> {
        self.inner.delete(key).await
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> ancient_core::Result<Vec<String>> {
        self.inner.list(prefix, cursor, limit).await
    }
}

#[tokio::test]
async fn test_download_racing_truncation_is_not_cached() {
    let backend = memory_backend();
    let writer = Freezer::open(backend.clone(), small_config()).await.unwrap();
    append_range(&writer, 0..8).await;
    writer.sync().await.unwrap();
    writer.close().await.unwrap();

    let gated = Arc::new(GatedBackend::new(backend));
    let freezer = Arc::new(
        Freezer::open(gated.clone(), small_config())
            .await
            .unwrap(),
    );

    // Chunk 0..4 is not cached after reopen, so this read downloads it.
    gated.armed.store(true, Ordering::SeqCst);
    let reader = {
        let freezer = freezer.clone();
        tokio::spawn(async move { freezer.ancient(Kind::Header, 1).await })
    };
    gated.entered.notified().await;

    freezer.truncate_ancients(0).await.unwrap();
    for n in 0..8 {
        freezer.append_ancient(n, rewritten_record(n)).await.unwrap();
    }
    freezer.sync().await.unwrap();

    gated.release.notify_one();
    reader.await.unwrap().unwrap();

    for n in 0..8 {
        assert_eq!(
            freezer.ancient(Kind::Header, n).await.unwrap(),
            rewritten_record(n).header,
            "header {}",
            n
        );
    }
}
