//! Object Backend
//!
//! Opaque byte storage under string keys inside one namespace (an S3 bucket,
//! or a directory for the local driver). The freezer depends only on the
//! [`ObjectBackend`] capability set; [`ObjectStoreBackend`] implements it on
//! top of `object_store`, which gives us the filesystem, S3-compatible and
//! in-memory drivers.
//!
//! ## Failure classification
//!
//! Every `object_store::Error` is mapped onto the freezer taxonomy at this
//! boundary:
//!
//! | object_store            | freezer        | retried |
//! |-------------------------|----------------|---------|
//! | `NotFound`              | `NotFound`     | no      |
//! | `NotSupported`, `NotImplemented` | `NotSupported` | no |
//! | `InvalidPath`, `AlreadyExists`, `Precondition`, `UnknownConfigurationKey` | `Fatal` | no |
//! | anything else           | `Transient`    | yes     |
//!
//! Transient failures are retried with exponential backoff
//! (`100ms * 2^attempt`) before being surfaced.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ancient_core::{ErrorKind, FreezerError, Result};
use ancient_observability::metrics::{BACKEND_ERRORS_TOTAL, BACKEND_LATENCY, BACKEND_REQUESTS_TOTAL};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

/// Capability set the freezer needs from object storage.
#[async_trait]
pub trait ObjectBackend: Send + Sync + fmt::Debug {
    /// Bucket or container name.
    fn namespace(&self) -> &str;

    /// Create the namespace if needed; succeeds if it exists and is usable.
    async fn ensure(&self) -> Result<()>;

    /// Overwrite `key` with `data`. Durable on return.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Contents of `key`, or `NotFound`.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Remove `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Up to `limit` keys under `prefix` that sort strictly after `cursor`,
    /// in lexicographic order.
    async fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<Vec<String>>;
}

/// Which driver backs the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendKind {
    /// Directory `<root>/<namespace>` on the local filesystem.
    Local { root: PathBuf },
    /// S3-compatible bucket named after the namespace. Credentials and
    /// region come from the standard `AWS_*` environment.
    S3 {
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        region: Option<String>,
    },
    /// Process-local, for tests and throwaway deployments.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub namespace: String,

    #[serde(flatten)]
    pub kind: BackendKind,

    /// Attempts per request before a transient failure is surfaced (default: 3)
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl BackendConfig {
    pub fn memory(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind: BackendKind::Memory,
            retries: default_retries(),
        }
    }

    pub fn local(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind: BackendKind::Local { root: root.into() },
            retries: default_retries(),
        }
    }
}

fn default_retries() -> u32 {
    3
}

/// [`ObjectBackend`] over any `object_store` implementation.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    local_dir: Option<PathBuf>,
    retries: u32,
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("store", &self.store.to_string())
            .field("namespace", &self.namespace)
            .field("retries", &self.retries)
            .finish()
    }
}

impl ObjectStoreBackend {
    /// Wrap an already scoped store.
    pub fn new(store: Arc<dyn ObjectStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            local_dir: None,
            retries: default_retries(),
        }
    }

    pub fn in_memory(namespace: impl Into<String>) -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()), namespace)
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Build the driver selected by `config`.
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        if config.namespace.is_empty() {
            return Err(FreezerError::Fatal("namespace must not be empty".to_string()));
        }

        let backend = match &config.kind {
            BackendKind::Local { root } => {
                let dir = root.join(&config.namespace);
                create_dir(&dir).await?;
                let store = object_store::local::LocalFileSystem::new_with_prefix(&dir)
                    .map_err(classify)?;
                tracing::info!(dir = %dir.display(), "Using local filesystem backend");
                Self {
                    local_dir: Some(dir),
                    ..Self::new(Arc::new(store), config.namespace.clone())
                }
            }
            BackendKind::S3 { endpoint, region } => {
                let mut builder = object_store::aws::AmazonS3Builder::from_env()
                    .with_bucket_name(&config.namespace);
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint).with_allow_http(true);
                }
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                let store = builder
                    .build()
                    .map_err(|e| FreezerError::Fatal(format!("s3 backend: {}", e)))?;
                tracing::info!(bucket = %config.namespace, "Using S3 backend");
                Self::new(Arc::new(store), config.namespace.clone())
            }
            BackendKind::Memory => {
                tracing::info!(namespace = %config.namespace, "Using in-memory backend");
                Self::in_memory(config.namespace.clone())
            }
        };
        Ok(backend.with_retries(config.retries))
    }

    async fn with_retries_for<T, F, Fut>(&self, operation: &'static str, key: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = object_store::Result<T>>,
    {
        let attempts = self.retries.max(1);
        let mut attempt = 0;
        loop {
            BACKEND_REQUESTS_TOTAL.with_label_values(&[operation]).inc();
            let start = Instant::now();

            let err = match call().await {
                Ok(value) => {
                    BACKEND_LATENCY
                        .with_label_values(&[operation])
                        .observe(start.elapsed().as_secs_f64());
                    return Ok(value);
                }
                Err(e) => classify(e),
            };

            if err.kind() == ErrorKind::NotFound {
                BACKEND_ERRORS_TOTAL
                    .with_label_values(&[operation, "not_found"])
                    .inc();
                return Err(err);
            }

            if err.is_transient() && attempt + 1 < attempts {
                BACKEND_ERRORS_TOTAL
                    .with_label_values(&[operation, "retry"])
                    .inc();
                let backoff_ms = 100 * 2_u64.pow(attempt);
                tracing::warn!(
                    operation,
                    key = %key,
                    attempt = attempt + 1,
                    backoff_ms,
                    error = %err,
                    "Object backend request failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
                continue;
            }

            BACKEND_ERRORS_TOTAL
                .with_label_values(&[operation, "failed"])
                .inc();
            tracing::error!(operation, key = %key, error = %err, "Object backend request failed");
            return Err(err);
        }
    }
}

#[async_trait]
impl ObjectBackend for ObjectStoreBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn ensure(&self) -> Result<()> {
        if let Some(dir) = &self.local_dir {
            return create_dir(dir).await;
        }
        // Object stores cannot create buckets through this API; probe that the
        // namespace is reachable instead.
        let store = &self.store;
        match self
            .with_retries_for("LIST", "", || async move {
                store.list_with_delimiter(None).await.map(|_| ())
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(FreezerError::NotFound(_)) => Err(FreezerError::Fatal(format!(
                "namespace {} does not exist",
                self.namespace
            ))),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = Path::from(key);
        let store = &self.store;
        let path = &path;
        self.with_retries_for("PUT", key, || {
            let data = data.clone();
            async move { store.put(path, data).await.map(|_| ()) }
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = Path::from(key);
        let store = &self.store;
        let path = &path;
        self.with_retries_for("GET", key, || async move {
            store.get(path).await?.bytes().await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = Path::from(key);
        let store = &self.store;
        let path = &path;
        match self
            .with_retries_for("DELETE", key, || async move { store.delete(path).await })
            .await
        {
            Ok(()) | Err(FreezerError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let prefix_path = Path::from(prefix);
        let offset = cursor.map(Path::from);
        let store = &self.store;
        let (prefix_path, offset) = (&prefix_path, &offset);
        // The local driver walks directories and lists out of order, so it
        // has to be read in full and sorted. The others list in key order
        // and stop after one page.
        let ordered = self.local_dir.is_none();

        let listed = self
            .with_retries_for("LIST", prefix, || async move {
                let stream = match offset {
                    Some(offset) => store.list_with_offset(Some(prefix_path), offset),
                    None => store.list(Some(prefix_path)),
                };
                if ordered {
                    stream.take(limit).try_collect::<Vec<_>>().await
                } else {
                    stream.try_collect::<Vec<_>>().await
                }
            })
            .await;

        let metas = match listed {
            Ok(metas) => metas,
            Err(FreezerError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut keys: Vec<String> = metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| cursor.map_or(true, |cursor| key.as_str() > cursor))
            .collect();
        keys.sort_unstable();
        keys.truncate(limit);
        Ok(keys)
    }
}

async fn create_dir(dir: &std::path::Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        FreezerError::Fatal(format!("cannot create namespace directory {}: {}", dir.display(), e))
    })
}

/// Map an `object_store` failure onto the freezer taxonomy.
pub fn classify(err: object_store::Error) -> FreezerError {
    match err {
        object_store::Error::NotFound { path, .. } => FreezerError::NotFound(path),
        object_store::Error::NotSupported { source } => FreezerError::NotSupported(source.to_string()),
        object_store::Error::NotImplemented => {
            FreezerError::NotSupported("operation not implemented by object store".to_string())
        }
        e @ (object_store::Error::InvalidPath { .. }
        | object_store::Error::AlreadyExists { .. }
        | object_store::Error::Precondition { .. }
        | object_store::Error::UnknownConfigurationKey { .. }) => FreezerError::Fatal(e.to_string()),
        e => FreezerError::Transient(e.to_string()),
    }
}
