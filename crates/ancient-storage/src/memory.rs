//! In-process ancient store without a backend. Records live in memory only;
//! `sync` is a no-op. Used by tests and by deployments that do not need the
//! freezer to outlive the process.

use ancient_core::{AncientRecord, AncientStore, FreezerError, Kind, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<AncientRecord>,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct MemoryAncientStore {
    inner: RwLock<Inner>,
    read_only: bool,
}

impl MemoryAncientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(records: Vec<AncientRecord>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                records,
                closed: false,
            }),
            read_only: true,
        }
    }
}

fn ensure_open(inner: &Inner) -> Result<()> {
    if inner.closed {
        return Err(FreezerError::Closed);
    }
    Ok(())
}

#[async_trait]
impl AncientStore for MemoryAncientStore {
    async fn has_ancient(&self, _kind: Kind, number: u64) -> Result<bool> {
        let inner = self.inner.read().await;
        ensure_open(&inner)?;
        Ok(number < inner.records.len() as u64)
    }

    async fn ancient(&self, kind: Kind, number: u64) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        ensure_open(&inner)?;
        inner
            .records
            .get(number as usize)
            .map(|record| record.field(kind).to_vec())
            .ok_or(FreezerError::OutOfBounds {
                number,
                frozen: inner.records.len() as u64,
            })
    }

    async fn ancient_range(
        &self,
        kind: Kind,
        start: u64,
        count: u64,
        max_bytes: u64,
    ) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.read().await;
        ensure_open(&inner)?;
        let frozen = inner.records.len() as u64;
        if start >= frozen {
            return Err(FreezerError::OutOfBounds {
                number: start,
                frozen,
            });
        }

        let end = start.saturating_add(count).min(frozen);
        let mut blobs = Vec::new();
        let mut size = 0u64;
        for record in &inner.records[start as usize..end as usize] {
            let blob = record.field(kind);
            size += blob.len() as u64;
            if max_bytes > 0 && size > max_bytes && !blobs.is_empty() {
                break;
            }
            blobs.push(blob.to_vec());
        }
        Ok(blobs)
    }

    async fn ancients(&self) -> Result<u64> {
        let inner = self.inner.read().await;
        ensure_open(&inner)?;
        Ok(inner.records.len() as u64)
    }

    async fn ancient_size(&self, kind: Kind) -> Result<u64> {
        let inner = self.inner.read().await;
        ensure_open(&inner)?;
        Ok(inner
            .records
            .iter()
            .map(|record| record.field(kind).len() as u64)
            .sum())
    }

    async fn append_ancient(&self, number: u64, record: AncientRecord) -> Result<()> {
        if self.read_only {
            return Err(FreezerError::ReadOnly);
        }
        let mut inner = self.inner.write().await;
        ensure_open(&inner)?;

        let frozen = inner.records.len() as u64;
        if number != frozen {
            return Err(FreezerError::OutOfOrder { number, frozen });
        }
        // Same validation as the chunked freezer, so tests behave alike.
        record.clone().into_items()?;
        inner.records.push(record);
        Ok(())
    }

    async fn truncate_ancients(&self, items: u64) -> Result<()> {
        if self.read_only {
            return Err(FreezerError::ReadOnly);
        }
        let mut inner = self.inner.write().await;
        ensure_open(&inner)?;
        if items < inner.records.len() as u64 {
            inner.records.truncate(items as usize);
        }
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        let inner = self.inner.read().await;
        ensure_open(&inner)
    }

    async fn close(&self) -> Result<()> {
        self.inner.write().await.closed = true;
        Ok(())
    }
}
