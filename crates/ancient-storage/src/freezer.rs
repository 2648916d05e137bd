//! Freezer Core
//!
//! An append-only store of five-blob records keyed by a dense item number,
//! laid out as fixed-size chunks on an object backend.
//!
//! ## State
//!
//! - **frozen count** `F`: one past the highest stored item. Written under the
//!   freezer mutex, readable lock-free through an atomic.
//! - **index marker**: the durable copy of `F`. On open, `F` comes from the
//!   marker and chunk contents at or above it are ignored.
//! - **write cache** per family: appended items not yet part of a flushed
//!   complete chunk.
//! - **read cache** per family: recently appended or downloaded items.
//!
//! ## Operations
//!
//! ```text
//! append(n)    lock, n == F?, insert into caches, F += 1       (no backend I/O)
//! sync         lock, upload chunks from write cache, splice complete ones,
//!              rewrite marker
//! truncate(n)  lock, rewrite marker to n, rewrite the chunk holding n - 1,
//!              delete chunks above, trim caches, F = n
//! read(k, n)   n < F?, write cache, read cache, else download chunk
//! ```
//!
//! Appends, syncs and truncations are serialized by one mutex. Reads do not
//! take it; they only lock the caches, so a read racing a truncation may still
//! see pre-truncation data. A download that overlapped a truncation is never
//! cached: every truncation bumps an epoch, and a read only fills the read
//! cache if the epoch it started under is still current.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ancient_core::{
    AncientRecord, AncientStore, BlockItem, Family, FreezerError, HashItem, Kind, Result,
};
use ancient_observability::metrics::{
    APPENDS_TOTAL, CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CHUNK_DOWNLOADS_TOTAL,
    CHUNK_UPLOADS_TOTAL, FROZEN_ITEMS, SYNCS_TOTAL, SYNC_LATENCY, TRUNCATIONS_TOTAL,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::backend::{ObjectBackend, ObjectStoreBackend};
use crate::cache::{ReadCache, WriteCache};
use crate::codec::{ChunkCodec, INDEX_MARKER_KEY};
use crate::config::FreezerConfig;

/// Keys requested per listing page while deleting truncated chunks.
const LIST_PAGE_SIZE: usize = 1000;

/// An item type stored in one chunk family.
trait ChunkItem: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn blob(&self, kind: Kind) -> Option<Vec<u8>>;
}

impl ChunkItem for BlockItem {
    fn blob(&self, kind: Kind) -> Option<Vec<u8>> {
        self.field(kind).map(<[u8]>::to_vec)
    }
}

impl ChunkItem for HashItem {
    fn blob(&self, kind: Kind) -> Option<Vec<u8>> {
        (kind == Kind::Hash).then(|| self.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushMode {
    /// Upload complete chunks and the trailing partial chunk.
    All,
    /// Upload complete chunks only; used to make room during appends.
    CompleteOnly,
}

struct FamilyCache<T> {
    family: Family,
    group: u64,
    write: Mutex<WriteCache<T>>,
    read: Mutex<ReadCache<T>>,
}

impl<T: ChunkItem> FamilyCache<T> {
    fn new(family: Family, config: &FreezerConfig) -> Self {
        Self {
            family,
            group: config.group_size(family),
            write: Mutex::new(WriteCache::new(config.write_cache_capacity(family))),
            read: Mutex::new(ReadCache::new(config.read_cache_capacity(family))),
        }
    }

    fn chunk_start(&self, number: u64) -> u64 {
        number - number % self.group
    }

    async fn cached(&self, number: u64) -> Option<T> {
        if let Some(item) = self.write.lock().await.get(number).cloned() {
            CACHE_HITS_TOTAL.with_label_values(&["write"]).inc();
            return Some(item);
        }
        let item = self.read.lock().await.get(number);
        if item.is_some() {
            CACHE_HITS_TOTAL.with_label_values(&["read"]).inc();
        }
        item
    }
}

/// Object-backed freezer.
pub struct Freezer {
    backend: Arc<dyn ObjectBackend>,
    codec: ChunkCodec,
    read_only: bool,
    frozen: AtomicU64,
    /// Bumped by every truncation that drops items.
    truncations: AtomicU64,
    /// Serializes append, sync and truncate.
    lock: Mutex<()>,
    closed: AtomicBool,
    blocks: FamilyCache<BlockItem>,
    hashes: FamilyCache<HashItem>,
}

impl Freezer {
    /// Open the freezer stored in `backend`, creating the namespace if needed.
    pub async fn open(backend: Arc<dyn ObjectBackend>, config: FreezerConfig) -> Result<Self> {
        config.validate()?;
        backend.ensure().await?;

        let freezer = Self {
            codec: ChunkCodec::new(config.encoding),
            read_only: config.read_only,
            frozen: AtomicU64::new(0),
            truncations: AtomicU64::new(0),
            lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            blocks: FamilyCache::new(Family::Blocks, &config),
            hashes: FamilyCache::new(Family::Hashes, &config),
            backend,
        };

        let frozen = freezer.read_marker().await?;
        freezer.warm(&freezer.blocks, frozen).await?;
        freezer.warm(&freezer.hashes, frozen).await?;
        freezer.publish(frozen);

        tracing::info!(
            namespace = %freezer.backend.namespace(),
            frozen,
            encoding = %config.encoding,
            block_group_size = config.block_group_size,
            hash_group_size = config.hash_group_size,
            read_only = config.read_only,
            "Opened freezer"
        );
        Ok(freezer)
    }

    /// Open a fresh freezer over a process-local object store.
    pub async fn open_in_memory(config: FreezerConfig) -> Result<Self> {
        Self::open(Arc::new(ObjectStoreBackend::in_memory("memory")), config).await
    }

    /// Current frozen count, without touching the mutex.
    pub fn frozen(&self) -> u64 {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn backend(&self) -> &Arc<dyn ObjectBackend> {
        &self.backend
    }

    fn publish(&self, frozen: u64) {
        self.frozen.store(frozen, Ordering::SeqCst);
        FROZEN_ITEMS.set(frozen as i64);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FreezerError::Closed);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(FreezerError::ReadOnly);
        }
        Ok(())
    }

    async fn read_marker(&self) -> Result<u64> {
        let raw = match self.backend.get(INDEX_MARKER_KEY).await {
            Ok(raw) => raw,
            Err(FreezerError::NotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                FreezerError::Fatal(format!(
                    "corrupt index marker: {:?}",
                    String::from_utf8_lossy(&raw)
                ))
            })
    }

    async fn write_marker(&self, frozen: u64) -> Result<()> {
        self.backend
            .put(INDEX_MARKER_KEY, Bytes::from(frozen.to_string()))
            .await
    }

    async fn download<T: ChunkItem>(&self, fam: &FamilyCache<T>, start: u64) -> Result<Vec<T>> {
        let key = self.codec.chunk_key(fam.family, start);
        let payload = self.backend.get(&key).await?;
        let items: Vec<T> = self.codec.decode(&payload)?;
        if items.len() as u64 > fam.group {
            return Err(FreezerError::Codec(format!(
                "chunk {} holds {} items, more than the group size {}",
                key,
                items.len(),
                fam.group
            )));
        }
        CHUNK_DOWNLOADS_TOTAL
            .with_label_values(&[fam.family.prefix()])
            .inc();
        tracing::debug!(key = %key, items = items.len(), "Downloaded chunk");
        Ok(items)
    }

    async fn upload<T: ChunkItem>(
        &self,
        fam: &FamilyCache<T>,
        start: u64,
        items: Vec<(u64, T)>,
    ) -> Result<()> {
        let count = items.len();
        let contiguous = match (items.first(), items.last()) {
            (Some((first, _)), Some((last, _))) => {
                *first == start && *last == start + count as u64 - 1
            }
            _ => false,
        };
        if !contiguous {
            return Err(FreezerError::Fatal(format!(
                "{} chunk {} is not contiguous in the write cache",
                fam.family, start
            )));
        }

        let values: Vec<T> = items.into_iter().map(|(_, item)| item).collect();
        let key = self.codec.chunk_key(fam.family, start);
        let payload = self.codec.encode(&values)?;
        let size = payload.len();
        self.backend.put(&key, payload).await?;

        CHUNK_UPLOADS_TOTAL
            .with_label_values(&[fam.family.prefix()])
            .inc();
        tracing::debug!(key = %key, items = count, bytes = size, "Uploaded chunk");
        Ok(())
    }

    /// Load the chunk holding `frozen - 1` so the next sync can rebuild it.
    async fn warm<T: ChunkItem>(&self, fam: &FamilyCache<T>, frozen: u64) -> Result<()> {
        if frozen == 0 {
            return Ok(());
        }
        let start = fam.chunk_start(frozen - 1);
        let items = match self.download(fam, start).await {
            Ok(items) => items,
            Err(FreezerError::NotFound(key)) => {
                return Err(FreezerError::Fatal(format!(
                    "chunk {} holding item {} is missing",
                    key,
                    frozen - 1
                )))
            }
            Err(e) => return Err(e),
        };

        let needed = (frozen - start) as usize;
        if items.len() < needed {
            return Err(FreezerError::Fatal(format!(
                "{} chunk {} holds {} items, index marker needs {}",
                fam.family,
                start,
                items.len(),
                needed
            )));
        }

        // Items past the marker are leftovers of an interrupted truncation.
        let live = items.into_iter().take(needed).enumerate();
        if frozen % fam.group != 0 {
            let mut write = fam.write.lock().await;
            for (i, item) in live {
                write.insert(start + i as u64, item);
            }
        } else {
            let mut read = fam.read.lock().await;
            for (i, item) in live {
                read.put(start + i as u64, item);
            }
        }
        tracing::debug!(family = %fam.family, start, items = needed, "Warmed caches");
        Ok(())
    }

    /// Fill the write cache with items `start..end` from the stored chunk at
    /// `start`, leaving items already cached untouched.
    async fn backfill<T: ChunkItem>(&self, fam: &FamilyCache<T>, start: u64, end: u64) -> Result<()> {
        let items = match self.download(fam, start).await {
            Ok(items) => items,
            Err(FreezerError::NotFound(key)) => {
                return Err(FreezerError::Fatal(format!(
                    "cannot rebuild {} chunk {}: {} is missing",
                    fam.family, start, key
                )))
            }
            Err(e) => return Err(e),
        };

        let needed = (end - start) as usize;
        if items.len() < needed {
            return Err(FreezerError::Fatal(format!(
                "cannot rebuild {} chunk {}: stored chunk holds {} items, need {}",
                fam.family,
                start,
                items.len(),
                needed
            )));
        }

        let mut write = fam.write.lock().await;
        for (i, item) in items.into_iter().take(needed).enumerate() {
            let number = start + i as u64;
            if !write.contains(number) {
                write.insert(number, item);
            }
        }
        Ok(())
    }

    /// Upload the write cache of one family, chunk by chunk. Complete chunks
    /// are spliced out once stored; a trailing partial chunk stays cached.
    /// Must be called with the freezer mutex held.
    async fn flush<T: ChunkItem>(&self, fam: &FamilyCache<T>, mode: FlushMode) -> Result<usize> {
        loop {
            let first = fam.write.lock().await.first_key();
            let Some(first) = first else {
                return Ok(0);
            };
            let start = fam.chunk_start(first);
            if start == first {
                break;
            }
            tracing::warn!(
                family = %fam.family,
                first,
                "Write cache starts mid-chunk, backfilling from backend"
            );
            self.backfill(fam, start, first).await?;
        }

        let mut uploaded = 0;
        loop {
            let (start, items) = {
                let write = fam.write.lock().await;
                let Some(start) = write.first_key() else {
                    break;
                };
                (start, write.range(start, start + fam.group))
            };

            let complete = items.len() as u64 == fam.group;
            if !complete && mode == FlushMode::CompleteOnly {
                break;
            }

            self.upload(fam, start, items).await?;
            uploaded += 1;

            if !complete {
                break;
            }
            fam.write.lock().await.splice(fam.group as usize);
        }
        Ok(uploaded)
    }

    /// Flush complete chunks if the write cache reached its high-water mark.
    async fn make_room<T: ChunkItem>(&self, fam: &FamilyCache<T>) -> Result<()> {
        let (full, len) = {
            let write = fam.write.lock().await;
            (write.is_full(), write.len())
        };
        if full {
            tracing::debug!(family = %fam.family, items = len, "Write cache full, flushing complete chunks");
            self.flush(fam, FlushMode::CompleteOnly).await?;
        }
        Ok(())
    }

    /// Rewrite the chunk holding `items - 1` and delete every chunk above it.
    async fn truncate_stored<T: ChunkItem>(&self, fam: &FamilyCache<T>, items: u64) -> Result<()> {
        fam.write.lock().await.truncate_from(items);

        let boundary = if items % fam.group == 0 {
            items
        } else {
            let start = fam.chunk_start(items);
            let first = fam.write.lock().await.first_key();
            match first {
                Some(first) if first <= start => {}
                other => self.backfill(fam, start, other.unwrap_or(items)).await?,
            }
            let survivors = fam.write.lock().await.range(start, items);
            self.upload(fam, start, survivors).await?;
            start + fam.group
        };

        self.delete_from(fam, boundary).await
    }

    /// Delete every chunk of the family starting at or after `boundary`.
    async fn delete_from<T: ChunkItem>(&self, fam: &FamilyCache<T>, boundary: u64) -> Result<()> {
        let prefix = fam.family.prefix();
        // Keys wider than nine digits sort before a cursor that does not
        // start with '0', so such boundaries list the whole family.
        let mut cursor = boundary
            .checked_sub(1)
            .filter(|last_kept| *last_kept < 100_000_000)
            .map(|last_kept| format!("{}/{:09}", prefix, last_kept));
        let mut deleted = 0usize;

        loop {
            let page = self
                .backend
                .list(prefix, cursor.as_deref(), LIST_PAGE_SIZE)
                .await?;
            let Some(last) = page.last().cloned() else {
                break;
            };
            for key in &page {
                match ChunkCodec::parse_chunk_key(fam.family, key) {
                    Some(start) if start >= boundary => {
                        self.backend.delete(key).await?;
                        deleted += 1;
                    }
                    Some(_) => {}
                    None => tracing::warn!(key = %key, "Ignoring unexpected object under chunk prefix"),
                }
            }
            cursor = Some(last);
        }

        if deleted > 0 {
            tracing::info!(family = %fam.family, boundary, deleted, "Deleted truncated chunks");
        }
        Ok(())
    }

    async fn lookup<T: ChunkItem>(&self, fam: &FamilyCache<T>, number: u64) -> Result<T> {
        if let Some(item) = fam.cached(number).await {
            return Ok(item);
        }
        CACHE_MISSES_TOTAL.inc();

        let epoch = self.truncations.load(Ordering::SeqCst);
        let start = fam.chunk_start(number);
        let items = match self.download(fam, start).await {
            Ok(items) => items,
            Err(FreezerError::NotFound(key)) => {
                let frozen = self.frozen();
                if number >= frozen {
                    return Err(FreezerError::OutOfBounds { number, frozen });
                }
                return Err(FreezerError::Fatal(format!(
                    "chunk {} holding item {} is missing below frozen count {}",
                    key, number, frozen
                )));
            }
            Err(e) => return Err(e),
        };

        let frozen = self.frozen();
        let wanted = (number - start) as usize;
        {
            // Checked under the read cache lock: a truncation bumps the epoch
            // before it trims this cache.
            let mut read = fam.read.lock().await;
            if self.truncations.load(Ordering::SeqCst) == epoch {
                for (i, item) in items.iter().enumerate() {
                    let n = start + i as u64;
                    if n >= frozen {
                        break;
                    }
                    read.fill(n, item.clone());
                }
            } else {
                tracing::debug!(family = %fam.family, start, "Chunk download raced a truncation, not caching it");
            }
        }

        match items.into_iter().nth(wanted) {
            Some(item) if number < frozen => Ok(item),
            _ => Err(FreezerError::OutOfBounds { number, frozen }),
        }
    }
}

#[async_trait]
impl AncientStore for Freezer {
    async fn has_ancient(&self, _kind: Kind, number: u64) -> Result<bool> {
        self.ensure_open()?;
        Ok(number < self.frozen())
    }

    async fn ancient(&self, kind: Kind, number: u64) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let frozen = self.frozen();
        if number >= frozen {
            return Err(FreezerError::OutOfBounds { number, frozen });
        }

        let blob = match kind.family() {
            Family::Blocks => self.lookup(&self.blocks, number).await?.blob(kind),
            Family::Hashes => self.lookup(&self.hashes, number).await?.blob(kind),
        };
        blob.ok_or_else(|| FreezerError::NotSupported(format!("kind {} in its family", kind)))
    }

    async fn ancient_range(
        &self,
        kind: Kind,
        start: u64,
        count: u64,
        max_bytes: u64,
    ) -> Result<Vec<Vec<u8>>> {
        self.ensure_open()?;
        let frozen = self.frozen();
        if start >= frozen {
            return Err(FreezerError::OutOfBounds {
                number: start,
                frozen,
            });
        }

        let end = start.saturating_add(count).min(frozen);
        let mut blobs = Vec::new();
        let mut size = 0u64;
        for number in start..end {
            let blob = self.ancient(kind, number).await?;
            size += blob.len() as u64;
            if max_bytes > 0 && size > max_bytes && !blobs.is_empty() {
                break;
            }
            blobs.push(blob);
        }
        Ok(blobs)
    }

    async fn ancients(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.frozen())
    }

    async fn ancient_size(&self, kind: Kind) -> Result<u64> {
        self.ensure_open()?;
        Err(FreezerError::NotSupported(format!(
            "size of {} on an object backend",
            kind
        )))
    }

    async fn append_ancient(&self, number: u64, record: AncientRecord) -> Result<()> {
        self.ensure_writable()?;
        let _guard = self.lock.lock().await;
        self.ensure_open()?;

        let frozen = self.frozen();
        if number != frozen {
            return Err(FreezerError::OutOfOrder { number, frozen });
        }
        let (hash, block) = record.into_items()?;

        self.make_room(&self.blocks).await?;
        self.make_room(&self.hashes).await?;

        self.blocks.write.lock().await.insert(number, block.clone());
        self.blocks.read.lock().await.put(number, block);
        self.hashes.write.lock().await.insert(number, hash.clone());
        self.hashes.read.lock().await.put(number, hash);

        self.publish(number + 1);
        APPENDS_TOTAL.inc();
        tracing::trace!(number, "Appended ancient");
        Ok(())
    }

    async fn truncate_ancients(&self, items: u64) -> Result<()> {
        self.ensure_writable()?;
        let _guard = self.lock.lock().await;
        self.ensure_open()?;

        let frozen = self.frozen();
        if frozen <= items {
            return Ok(());
        }
        tracing::warn!(from = frozen, to = items, "Truncating ancients");
        self.truncations.fetch_add(1, Ordering::SeqCst);

        self.write_marker(items).await?;

        // The marker is the durability point: from here on the frontier is
        // `items` whether or not the chunk rewrite completes.
        let mut result = self.truncate_stored(&self.blocks, items).await;
        if result.is_ok() {
            result = self.truncate_stored(&self.hashes, items).await;
        }

        self.blocks.write.lock().await.truncate_from(items);
        self.blocks.read.lock().await.truncate_from(items);
        self.hashes.write.lock().await.truncate_from(items);
        self.hashes.read.lock().await.truncate_from(items);
        self.publish(items);

        TRUNCATIONS_TOTAL.inc();
        match &result {
            Ok(()) => tracing::info!(frozen = items, "Truncated ancients"),
            Err(e) => tracing::error!(frozen = items, error = %e, "Truncation left stale chunks behind"),
        }
        result
    }

    async fn sync(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        self.ensure_open()?;

        let started = Instant::now();
        let frozen = self.frozen();
        let pending = self.blocks.write.lock().await.len();

        let block_chunks = self.flush(&self.blocks, FlushMode::All).await?;
        SYNC_LATENCY
            .with_label_values(&[Family::Blocks.prefix()])
            .observe(started.elapsed().as_secs_f64());

        let hashes_started = Instant::now();
        let hash_chunks = self.flush(&self.hashes, FlushMode::All).await?;
        SYNC_LATENCY
            .with_label_values(&[Family::Hashes.prefix()])
            .observe(hashes_started.elapsed().as_secs_f64());

        self.write_marker(frozen).await?;
        SYNCS_TOTAL.inc();

        let elapsed = started.elapsed();
        tracing::info!(
            frozen,
            pending,
            block_chunks,
            hash_chunks,
            elapsed_ms = elapsed.as_millis() as u64,
            "Synced ancients"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(frozen = self.frozen(), "Closed freezer");
        }
        Ok(())
    }
}
