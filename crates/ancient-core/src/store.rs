use async_trait::async_trait;

use crate::error::Result;
use crate::kind::Kind;
use crate::record::AncientRecord;

/// Operational contract of an ancient store.
///
/// Implemented by the object-backed freezer, the in-memory store and the
/// remote client, so callers such as the freezing pipeline do not care
/// whether the freezer lives in-process or behind an RPC transport.
///
/// Item numbers are dense: every kind holds exactly the items
/// `0..ancients()`, and all five kinds advance together.
#[async_trait]
pub trait AncientStore: Send + Sync {
    /// Whether item `number` of `kind` is stored.
    async fn has_ancient(&self, kind: Kind, number: u64) -> Result<bool>;

    /// Blob of `kind` for item `number`. `OutOfBounds` if `number` is not below
    /// the frozen count.
    async fn ancient(&self, kind: Kind, number: u64) -> Result<Vec<u8>>;

    /// Up to `count` consecutive blobs of `kind` starting at `start`.
    ///
    /// Stops early once adding another blob would exceed `max_bytes`, but
    /// always returns at least one blob. A `max_bytes` of zero means no limit.
    async fn ancient_range(
        &self,
        kind: Kind,
        start: u64,
        count: u64,
        max_bytes: u64,
    ) -> Result<Vec<Vec<u8>>>;

    /// The frozen count: one past the highest stored item number.
    async fn ancients(&self) -> Result<u64>;

    /// Total stored size of `kind` in bytes, where the store can aggregate it.
    async fn ancient_size(&self, kind: Kind) -> Result<u64>;

    /// Append the record for item `number`, which must equal the frozen count.
    async fn append_ancient(&self, number: u64, record: AncientRecord) -> Result<()>;

    /// Discard every item at or above `items`. No-op if nothing is above it.
    async fn truncate_ancients(&self, items: u64) -> Result<()>;

    /// Make every appended item durable.
    async fn sync(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
