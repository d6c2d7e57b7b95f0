//! k-mer 信号模型：每个 k-mer 的高斯电流参数、邻接表、信号归一化与事件打分。

pub mod event;
pub mod kmer;
pub mod norm;
pub mod reference;

use std::path::PathBuf;

use thiserror::Error;

pub use event::Event;
pub use kmer::{KmerModel, KmerParams};
pub use norm::NormParams;
pub use reference::{ForwardKmers, KmerIter, ReverseKmers};

/// 支持的最大 k；id 需能放入 `u16`。
pub const MAX_K: u8 = 8;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cannot open model file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("model parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("k-mer id {id} out of range (model has {count} k-mers)")]
    InvalidKmerId { id: u16, count: u32 },

    #[error("invalid base '{}' at position {position}", .base.escape_ascii())]
    InvalidBase { base: u8, position: usize },

    #[error("base index {index} out of range for {k}-mers")]
    BaseIndexOutOfRange { index: u8, k: u8 },

    #[error("k-mer of length {k} at offset {offset} runs past sequence of length {len}")]
    KmerTooShort { k: u8, offset: usize, len: usize },
}
