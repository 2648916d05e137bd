//! Output rendering for ancientctl
//!
//! Blobs are printed as `0x`-prefixed hex, one per line in text mode, or as
//! JSON strings in json mode.

use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// The result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Count(u64),
    Flag(bool),
    Blob(Vec<u8>),
    Blobs(Vec<Vec<u8>>),
    Done(String),
}

impl Reply {
    pub fn write_to(&self, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
        match format {
            OutputFormat::Text => self.write_text(out),
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, &self.to_json())?;
                writeln!(out)?;
                Ok(())
            }
        }
    }

    fn write_text(&self, out: &mut dyn Write) -> Result<()> {
        match self {
            Reply::Count(n) => writeln!(out, "{}", n)?,
            Reply::Flag(flag) => writeln!(out, "{}", flag)?,
            Reply::Blob(blob) => writeln!(out, "{}", ancient_core::hex::encode(blob))?,
            Reply::Blobs(blobs) => {
                for blob in blobs {
                    writeln!(out, "{}", ancient_core::hex::encode(blob))?;
                }
            }
            Reply::Done(message) => writeln!(out, "✅ {}", message)?,
        }
        Ok(())
    }

    fn to_json(&self) -> Value {
        match self {
            Reply::Count(n) => json!(n),
            Reply::Flag(flag) => json!(flag),
            Reply::Blob(blob) => json!(ancient_core::hex::encode(blob)),
            Reply::Blobs(blobs) => Value::Array(
                blobs
                    .iter()
                    .map(|blob| json!(ancient_core::hex::encode(blob)))
                    .collect(),
            ),
            Reply::Done(message) => json!({ "status": "ok", "message": message }),
        }
    }
}
