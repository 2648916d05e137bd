use ancient_core::FreezerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainDbError>;

#[derive(Debug, Error)]
pub enum ChainDbError {
    #[error("genesis mismatch: {kv} (kv store) != {freezer} (ancients)")]
    GenesisMismatch { kv: String, freezer: String },

    #[error("gap (kv head #{head}, frozen #{frozen}) in the chain between ancients and kv store")]
    Gap { head: u64, frozen: u64 },

    #[error("ancient chain segments already extracted from the kv store, but the freezer is empty")]
    AncientsLost,

    #[error("kv store error: {0}")]
    Kv(String),

    #[error("pipeline is not running")]
    PipelineStopped,

    #[error(transparent)]
    Freezer(#[from] FreezerError),
}
