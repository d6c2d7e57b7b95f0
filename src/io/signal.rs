//! 原始信号源。容器格式解析不在本 crate 内，宿主通过
//! [`SignalOpener`] / [`SignalSource`] 接入自己的读取器。

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("'{}' is not a valid signal file", .0.display())]
    Invalid(PathBuf),

    #[error("cannot open '{}': {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("malformed signal source: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 一个已打开的原始信号容器，内含单条读段。
pub trait SignalSource {
    fn read_id(&self) -> Result<String, SourceError>;

    fn raw_samples(&mut self) -> Result<Vec<f32>, SourceError>;

    fn close(self)
    where
        Self: Sized,
    {
    }
}

pub trait SignalOpener {
    type Source: SignalSource;

    fn is_valid(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Self::Source, SourceError>;
}

/// 交给 worker 的读段：id 与采样值。
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRead {
    pub read_id: String,
    pub samples: Vec<f32>,
}

/// 按 `is_valid` → `open` → `read_id` → `raw_samples` → `close` 顺序读取。
/// 读取失败时同样会关闭信号源。
pub fn read_signal<O: SignalOpener>(opener: &O, path: &Path) -> Result<SignalRead, SourceError> {
    if !opener.is_valid(path) {
        return Err(SourceError::Invalid(path.to_path_buf()));
    }
    let mut src = opener.open(path)?;
    let read = match src.read_id() {
        Ok(read_id) => src.raw_samples().map(|samples| SignalRead { read_id, samples }),
        Err(e) => Err(e),
    };
    src.close();
    read
}
