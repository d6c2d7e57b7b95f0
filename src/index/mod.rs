//! FM 索引：加载预构建的 BWT / 采样后缀数组 / contig 注释，并提供反向扩展与位置换算查询。

pub mod files;
pub mod fm;
pub mod interval;

use std::path::PathBuf;

use thiserror::Error;

pub use files::{AnnFile, BwtFile, Contig, IndexMeta, SaFile};
pub use fm::{ContigLocation, FmIndex};
pub use interval::Interval;

/// 加载或查询 FM 索引时的错误。
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index file I/O failed for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode/decode index file '{}': {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    /// 文件可解码，但内容不一致。
    #[error("corrupt {what}: {reason}")]
    Corrupt { what: &'static str, reason: String },

    #[error("suffix-array slot {slot} out of range (index size {size})")]
    IndexOutOfRange { slot: u64, size: u64 },
}
