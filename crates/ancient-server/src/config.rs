//! Server configuration: command-line flags with environment fallbacks, and an
//! optional TOML file supplying freezer defaults that flags override.

use std::path::{Path, PathBuf};

use ancient_storage::{BackendConfig, BackendKind, Encoding, FreezerConfig};
use anyhow::Context;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    Local,
    S3,
    Memory,
}

/// Where clients reach the server. Exactly one listener runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listen {
    Ipc(PathBuf),
    Http(String),
}

#[derive(Debug, Parser)]
#[command(
    name = "ancient-store",
    version,
    about = "Serve a chain freezer from an object backend over JSON-RPC"
)]
pub struct Args {
    /// Bucket or container holding the freezer objects
    #[arg(long, env = "ANCIENT_NAMESPACE")]
    pub namespace: String,

    #[arg(long, env = "ANCIENT_BACKEND", value_enum, default_value_t = BackendChoice::Local)]
    pub backend: BackendChoice,

    /// Root directory of the local backend; the namespace is a directory below it
    #[arg(long, env = "ANCIENT_LOCAL_ROOT", default_value = "./data/ancient")]
    pub local_root: PathBuf,

    /// Custom S3-compatible endpoint URL
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    pub s3_region: Option<String>,

    /// Serve over a Unix socket at this path instead of HTTP
    #[arg(long, env = "ANCIENT_IPC_PATH")]
    pub ipc: Option<PathBuf>,

    #[arg(long, env = "ANCIENT_HTTP_ADDR", default_value = "localhost")]
    pub http_addr: String,

    #[arg(long, env = "ANCIENT_RPC_PORT", default_value_t = 9797)]
    pub rpcport: u16,

    #[arg(long, env = "ANCIENT_BLOCK_GROUP_SIZE")]
    pub block_group_size: Option<u64>,

    #[arg(long, env = "ANCIENT_HASH_GROUP_SIZE")]
    pub hash_group_size: Option<u64>,

    /// Chunk encoding, `.json` or `.json.gz`
    #[arg(long, env = "ANCIENT_ENCODING")]
    pub encoding: Option<Encoding>,

    /// Reject appends and truncations
    #[arg(long, env = "ANCIENT_READ_ONLY")]
    pub read_only: bool,

    /// Attempts per backend request before a transient failure surfaces
    #[arg(long, env = "ANCIENT_BACKEND_RETRIES")]
    pub retries: Option<u32>,

    /// TOML file with freezer settings
    #[arg(long, env = "ANCIENT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "ANCIENT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn listen(&self) -> Listen {
        match &self.ipc {
            Some(path) => Listen::Ipc(path.clone()),
            None => Listen::Http(format!("{}:{}", self.http_addr, self.rpcport)),
        }
    }

    pub fn backend_config(&self) -> BackendConfig {
        let mut config = match self.backend {
            BackendChoice::Local => BackendConfig::local(&self.local_root, &self.namespace),
            BackendChoice::Memory => BackendConfig::memory(&self.namespace),
            BackendChoice::S3 => BackendConfig {
                kind: BackendKind::S3 {
                    endpoint: self.s3_endpoint.clone(),
                    region: self.s3_region.clone(),
                },
                ..BackendConfig::memory(&self.namespace)
            },
        };
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        config
    }

    /// Freezer settings: file values (or defaults), then flag overrides.
    pub fn freezer_config(&self) -> anyhow::Result<FreezerConfig> {
        let mut config = match &self.config {
            Some(path) => load_file(path)?,
            None => FreezerConfig::default(),
        };
        if let Some(size) = self.block_group_size {
            config.block_group_size = size;
        }
        if let Some(size) = self.hash_group_size {
            config.hash_group_size = size;
        }
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        if self.read_only {
            config.read_only = true;
        }
        config.validate().context("invalid freezer configuration")?;
        Ok(config)
    }
}

pub fn load_file(path: &Path) -> anyhow::Result<FreezerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["ancient-store"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_listen_on_http() {
        let args = parse(&["--namespace", "mainnet"]);
        assert_eq!(args.listen(), Listen::Http("localhost:9797".to_string()));
        assert_eq!(args.backend, BackendChoice::Local);

        let config = args.freezer_config().unwrap();
        assert_eq!(config.block_group_size, 1024);
        assert_eq!(config.hash_group_size, 32768);
        assert_eq!(config.encoding, Encoding::JsonGz);
        assert!(!config.read_only);
    }

    #[test]
    fn test_ipc_replaces_http() {
        let args = parse(&["--namespace", "mainnet", "--ipc", "/tmp/freezer.ipc"]);
        assert_eq!(args.listen(), Listen::Ipc(PathBuf::from("/tmp/freezer.ipc")));
    }

    #[test]
    fn test_namespace_is_required() {
        if std::env::var_os("ANCIENT_NAMESPACE").is_none() {
            assert!(Args::try_parse_from(["ancient-store"]).is_err());
        }
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freezer.toml");
        std::fs::write(
            &path,
            "block_group_size = 64\nhash_group_size = 128\nencoding = \".json\"\n",
        )
        .unwrap();

        let args = parse(&[
            "--namespace",
            "mainnet",
            "--config",
            path.to_str().unwrap(),
            "--hash-group-size",
            "256",
            "--read-only",
        ]);
        let config = args.freezer_config().unwrap();
        assert_eq!(config.block_group_size, 64);
        assert_eq!(config.hash_group_size, 256);
        assert_eq!(config.encoding, Encoding::Json);
        assert!(config.read_only);
    }

    #[test]
    fn test_backend_selection() {
        let args = parse(&[
            "--namespace",
            "mainnet",
            "--backend",
            "s3",
            "--s3-endpoint",
            "http://localhost:9000",
            "--retries",
            "5",
        ]);
        let config = args.backend_config();
        assert_eq!(config.namespace, "mainnet");
        assert_eq!(config.retries, 5);
        assert!(matches!(
            config.kind,
            BackendKind::S3 { endpoint: Some(ref e), .. } if e == "http://localhost:9000"
        ));

        let args = parse(&["--namespace", "n", "--backend", "memory"]);
        assert!(matches!(args.backend_config().kind, BackendKind::Memory));
    }

    #[test]
    fn test_zero_group_size_rejected() {
        let args = parse(&["--namespace", "n", "--block-group-size", "0"]);
        assert!(args.freezer_config().is_err());
    }
}
