//! DB Composer
//!
//! [`ChainDb`] puts a hot key-value store and a freezer behind one chain
//! database. Writes go to the hot store. Reads try the hot store first and
//! fall back to the freezer for blocks below its frontier.
//!
//! Opening validates that the two stores belong together:
//!
//! ```text
//! kv genesis | frozen | outcome
//! -----------+--------+---------------------------------------------------
//! none       | 0      | fresh, permit
//! none       | > 0    | permit (genesis is checked by the chain layer)
//! g          | > 0    | freezer genesis must equal g, and no gap between
//!            |        | the frontier and the kv head; a gap is repaired by
//!            |        | truncating the kv store to the frontier
//! g          | 0      | block 1 must still be in the kv store unless the
//!            |        | head is genesis, otherwise the freezer was lost
//! ```

use std::sync::Arc;

use ancient_core::{AncientStore, FreezerError, Kind};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ChainDbError, Result};
use crate::kv::{KeyValueStore, WriteBatch};
use crate::pipeline::{FreezingPipeline, PipelineConfig, PipelineHandle};
use crate::schema;

/// Which reconciliation branch admitted the store pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Both stores empty.
    Fresh,
    /// Hot store empty, freezer populated.
    FreezerOnly,
    /// Hot store populated, nothing frozen yet.
    KvOnly,
    /// Both populated and contiguous.
    Contiguous,
    /// A gap was repaired by truncating the hot store down to the frontier.
    Recovered { head: u64, frozen: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct ChainDbConfig {
    pub pipeline: PipelineConfig,
    /// Serve reads only: no pipeline is started.
    pub read_only: bool,
}

pub struct ChainDb {
    kv: Arc<dyn KeyValueStore>,
    freezer: Arc<dyn AncientStore>,
    pipeline: Mutex<Option<PipelineHandle>>,
    reconciliation: Reconciliation,
}

impl ChainDb {
    /// Validate the store pair and, unless read-only, start the freezing
    /// pipeline.
    pub async fn open(
        kv: Arc<dyn KeyValueStore>,
        freezer: Arc<dyn AncientStore>,
        config: ChainDbConfig,
    ) -> Result<Self> {
        let reconciliation = reconcile(kv.as_ref(), freezer.as_ref()).await?;
        info!(?reconciliation, "Freezer is consistent with the kv store");

        let pipeline = if config.read_only {
            None
        } else {
            let pipeline = Arc::new(FreezingPipeline::new(
                kv.clone(),
                freezer.clone(),
                config.pipeline,
            ));
            Some(pipeline.start())
        };

        Ok(Self {
            kv,
            freezer,
            pipeline: Mutex::new(pipeline),
            reconciliation,
        })
    }

    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    pub fn freezer(&self) -> &Arc<dyn AncientStore> {
        &self.freezer
    }

    pub fn reconciliation(&self) -> Reconciliation {
        self.reconciliation
    }

    /// Run one pipeline iteration now and wait for it.
    pub async fn freeze_now(&self) -> Result<()> {
        let pipeline = self.pipeline.lock().await;
        match pipeline.as_ref() {
            Some(handle) => handle.trigger().await,
            None => Err(ChainDbError::Freezer(FreezerError::ReadOnly)),
        }
    }

    /// Stop the pipeline, then close the freezer.
    pub async fn close(&self) -> Result<()> {
        if let Some(handle) = self.pipeline.lock().await.take() {
            handle.stop().await;
        }
        self.freezer.close().await?;
        Ok(())
    }

    pub async fn canonical_hash(&self, number: u64) -> Result<Option<Vec<u8>>> {
        if let Some(hash) = schema::read_canonical_hash(self.kv.as_ref(), number)? {
            return Ok(Some(hash));
        }
        self.frozen_blob(Kind::Hash, number).await
    }

    pub async fn header(&self, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
        if let Some(header) = schema::read_header(self.kv.as_ref(), hash, number)? {
            return Ok(Some(header));
        }
        self.frozen_block_blob(Kind::Header, hash, number).await
    }

    pub async fn body(&self, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
        if let Some(body) = schema::read_body(self.kv.as_ref(), hash, number)? {
            return Ok(Some(body));
        }
        self.frozen_block_blob(Kind::Body, hash, number).await
    }

    pub async fn receipts(&self, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
        if let Some(receipts) = schema::read_receipts(self.kv.as_ref(), hash, number)? {
            return Ok(Some(receipts));
        }
        self.frozen_block_blob(Kind::Receipts, hash, number).await
    }

    pub async fn td(&self, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
        if let Some(td) = schema::read_td(self.kv.as_ref(), hash, number)? {
            return Ok(Some(td));
        }
        self.frozen_block_blob(Kind::Difficulty, hash, number).await
    }

    pub fn header_number(&self, hash: &[u8]) -> Result<Option<u64>> {
        schema::read_header_number(self.kv.as_ref(), hash)
    }

    async fn frozen_blob(&self, kind: Kind, number: u64) -> Result<Option<Vec<u8>>> {
        match self.freezer.ancient(kind, number).await {
            Ok(blob) => Ok(Some(blob)),
            Err(FreezerError::OutOfBounds { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Frozen blobs are canonical only, so `hash` must be the frozen hash.
    async fn frozen_block_blob(&self, kind: Kind, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
        match self.frozen_blob(Kind::Hash, number).await? {
            Some(frozen) if frozen == hash => self.frozen_blob(kind, number).await,
            _ => Ok(None),
        }
    }
}

/// Check the hot store against the freezer, repairing a gap if possible.
pub async fn reconcile(kv: &dyn KeyValueStore, freezer: &dyn AncientStore) -> Result<Reconciliation> {
    let kv_genesis = schema::read_canonical_hash(kv, 0)?;
    let frozen = freezer.ancients().await?;

    let Some(kv_genesis) = kv_genesis else {
        return Ok(if frozen == 0 {
            Reconciliation::Fresh
        } else {
            Reconciliation::FreezerOnly
        });
    };

    if frozen == 0 {
        let head = schema::read_head_header_hash(kv)?;
        if head.as_deref() != Some(kv_genesis.as_slice())
            && schema::read_canonical_hash(kv, 1)?.is_none()
        {
            return Err(ChainDbError::AncientsLost);
        }
        return Ok(Reconciliation::KvOnly);
    }

    let freezer_genesis = freezer.ancient(Kind::Hash, 0).await?;
    if freezer_genesis != kv_genesis {
        return Err(ChainDbError::GenesisMismatch {
            kv: ancient_core::hex::encode(&kv_genesis),
            freezer: ancient_core::hex::encode(&freezer_genesis),
        });
    }

    let Some(head) = find_gap(kv, frozen)? else {
        return Ok(Reconciliation::Contiguous);
    };

    warn!(head, frozen, "Gap between freezer and kv store, truncating kv store to the freezer");
    truncate_kv_to_freezer(kv, freezer, frozen).await?;

    if let Some(head) = find_gap(kv, frozen)? {
        return Err(ChainDbError::Gap { head, frozen });
    }
    Ok(Reconciliation::Recovered { head, frozen })
}

/// The kv head number if the kv store lacks block `frozen` yet claims a head
/// above `frozen - 1`.
fn find_gap(kv: &dyn KeyValueStore, frozen: u64) -> Result<Option<u64>> {
    if schema::read_canonical_hash(kv, frozen)?.is_some() {
        return Ok(None);
    }
    let head = schema::read_head_number(kv, schema::read_head_header_hash)?.unwrap_or(0);
    Ok((head > frozen - 1).then_some(head))
}

/// Delete every kv block above the frontier and point the heads at the
/// topmost frozen block.
pub async fn truncate_kv_to_freezer(
    kv: &dyn KeyValueStore,
    freezer: &dyn AncientStore,
    frozen: u64,
) -> Result<()> {
    let head_header = schema::read_head_number(kv, schema::read_head_header_hash)?.unwrap_or(0);
    let head_fast = schema::read_head_number(kv, schema::read_head_fast_block_hash)?.unwrap_or(0);
    let head_full = schema::read_head_number(kv, schema::read_head_block_hash)?.unwrap_or(0);
    warn!(head_header, head_fast, head_full, frozen, "Truncating kv store to freezer height");

    let mut number = head_header;
    let mut removed = 0usize;
    while number > frozen.saturating_sub(1) && number != 0 {
        let mut batch = WriteBatch::new();
        for hash in schema::read_all_hashes(kv, number)? {
            schema::delete_block(&mut batch, &hash, number);
            removed += 1;
        }
        schema::delete_canonical_hash(&mut batch, number);
        kv.write(batch)?;
        number -= 1;
    }
    warn!(removed, "Finished kv truncation");

    let hash = freezer.ancient(Kind::Hash, number).await?;
    warn!(number, hash = %ancient_core::hex::encode(&hash), "Writing kv head header");
    schema::write_head_header_hash(kv, &hash)?;
    if head_fast != 0 {
        schema::write_head_fast_block_hash(kv, &hash)?;
    }
    if head_full != 0 {
        schema::write_head_block_hash(kv, &hash)?;
    }
    Ok(())
}
