//! Freezing Pipeline
//!
//! Background task moving immutable blocks from the hot store into the
//! freezer.
//!
//! ```text
//! loop:
//!   wait recheck interval (or a trigger), unless the last batch was full
//!   H = head block number, F = freezer.ancients()
//!   limit = min(H - threshold + 1, F + batch_limit)
//!   append canonical blocks F..limit to the freezer, sync
//!   delete promoted blocks from the hot store (never genesis)
//!   delete side-chain blocks at the promoted heights
//! ```
//!
//! Failures never stop the loop: a broken batch is retried from the
//! freezer's frontier on the next tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ancient_core::AncientStore;
use ancient_observability::metrics::{PIPELINE_BATCHES_TOTAL, PIPELINE_PROMOTED_TOTAL};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ChainDbError, Result};
use crate::kv::{KeyValueStore, WriteBatch};
use crate::schema;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wait between iterations when there is no full batch of work (default: 60s)
    pub recheck_interval: Duration,
    /// Blocks this far below the head are final (default: 90000)
    pub immutability_threshold: u64,
    /// Maximum items promoted per iteration (default: 30000)
    pub batch_limit: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recheck_interval: Duration::from_secs(60),
            immutability_threshold: 90_000,
            batch_limit: 30_000,
        }
    }
}

/// What one iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The hot store has no head block yet.
    NoHead,
    /// The chain is not yet longer than the immutability threshold.
    BelowThreshold { head: u64 },
    /// Everything final is already frozen.
    UpToDate { head: u64, frozen: u64 },
    /// Items `from..to` were promoted. `to` falls short of `limit` when a
    /// block was missing or an append failed.
    Frozen { from: u64, to: u64, limit: u64 },
}

pub struct FreezingPipeline {
    kv: Arc<dyn KeyValueStore>,
    freezer: Arc<dyn AncientStore>,
    config: PipelineConfig,
}

impl FreezingPipeline {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        freezer: Arc<dyn AncientStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            kv,
            freezer,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one iteration.
    pub async fn freeze_batch(&self) -> Result<BatchOutcome> {
        let kv = self.kv.as_ref();

        let Some(head) = schema::read_head_number(kv, schema::read_head_block_hash)? else {
            debug!("Current full block unavailable, waiting");
            return Ok(BatchOutcome::NoHead);
        };
        let threshold = self.config.immutability_threshold;
        if head < threshold {
            debug!(head, threshold, "Current full block not old enough");
            return Ok(BatchOutcome::BelowThreshold { head });
        }

        let frozen = self.freezer.ancients().await?;
        let limit = (head - threshold + 1).min(frozen.saturating_add(self.config.batch_limit));
        if limit <= frozen {
            debug!(head, frozen, "Ancient blocks frozen already");
            return Ok(BatchOutcome::UpToDate { head, frozen });
        }

        let started = Instant::now();
        let mut promoted: Vec<Vec<u8>> = Vec::with_capacity((limit - frozen) as usize);
        let mut number = frozen;
        while number < limit {
            let record = match schema::read_ancient_record(kv, number) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    error!(number, "Canonical block missing from the hot store, aborting batch");
                    break;
                }
                Err(e) => {
                    error!(number, error = %e, "Failed to read block from the hot store, aborting batch");
                    break;
                }
            };
            let hash = record.hash.clone();
            if let Err(e) = self.freezer.append_ancient(number, record).await {
                error!(number, error = %e, "Failed to append block to the freezer, aborting batch");
                break;
            }
            promoted.push(hash);
            number += 1;
        }

        // Only synced items may leave the hot store.
        self.freezer.sync().await?;

        let mut batch = WriteBatch::new();
        for (offset, hash) in promoted.iter().enumerate() {
            let n = frozen + offset as u64;
            if n == 0 {
                continue;
            }
            schema::delete_block_without_number(&mut batch, hash, n);
            schema::delete_canonical_hash(&mut batch, n);
        }
        self.kv.write(batch)?;

        let mut side = WriteBatch::new();
        let mut dangling = 0usize;
        for (offset, canonical) in promoted.iter().enumerate() {
            let n = frozen + offset as u64;
            if n == 0 {
                continue;
            }
            for hash in schema::read_all_hashes(kv, n)? {
                if &hash != canonical {
                    debug!(number = n, hash = %ancient_core::hex::encode(&hash), "Deleting side-chain block");
                    schema::delete_block(&mut side, &hash, n);
                    dangling += 1;
                }
            }
        }
        self.kv.write(side)?;

        let count = number - frozen;
        PIPELINE_PROMOTED_TOTAL.inc_by(count);
        PIPELINE_BATCHES_TOTAL
            .with_label_values(&[if number == limit { "complete" } else { "aborted" }])
            .inc();
        info!(
            blocks = count,
            from = frozen,
            to = number,
            side_chain = dangling,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Deep froze chain segment"
        );

        Ok(BatchOutcome::Frozen {
            from: frozen,
            to: number,
            limit,
        })
    }

    /// Spawn the background loop.
    pub fn start(self: Arc<Self>) -> PipelineHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<oneshot::Sender<()>>(1);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!(
                interval = ?self.config.recheck_interval,
                threshold = self.config.immutability_threshold,
                batch_limit = self.config.batch_limit,
                "Freezing pipeline started"
            );

            let mut backoff = false;
            let mut waiter: Option<oneshot::Sender<()>> = None;
            loop {
                if backoff {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.recheck_interval) => {}
                        Some(reply) = trigger_rx.recv() => {
                            waiter = Some(reply);
                        }
                        _ = &mut shutdown_rx => break,
                    }
                } else {
                    match shutdown_rx.try_recv() {
                        Err(oneshot::error::TryRecvError::Empty) => {}
                        _ => break,
                    }
                }

                backoff = match self.freeze_batch().await {
                    Ok(BatchOutcome::Frozen { from, to, .. }) => {
                        to - from < self.config.batch_limit
                    }
                    Ok(_) => true,
                    Err(e) => {
                        PIPELINE_BATCHES_TOTAL.with_label_values(&["failed"]).inc();
                        warn!(error = %e, "Freezing batch failed, retrying next tick");
                        true
                    }
                };

                if let Some(reply) = waiter.take() {
                    let _ = reply.send(());
                }
            }
            info!("Freezing pipeline stopped");
        });

        PipelineHandle {
            trigger: trigger_tx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Control handle of a running pipeline.
pub struct PipelineHandle {
    trigger: mpsc::Sender<oneshot::Sender<()>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Wake the loop and wait until the iteration it runs has finished.
    pub async fn trigger(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.trigger
            .send(reply_tx)
            .await
            .map_err(|_| ChainDbError::PipelineStopped)?;
        reply_rx.await.map_err(|_| ChainDbError::PipelineStopped)
    }

    /// Stop the loop between iterations and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "Freezing pipeline task failed");
        }
    }
}
