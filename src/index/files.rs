//! 预构建索引的磁盘格式：`{prefix}.bwt`、`{prefix}.sa`、`{prefix}.ann`，
//! 各自为带 magic 与格式版本号的 bincode 序列化结构。

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::IndexError;

pub const FORMAT_VERSION: u32 = 1;

const BWT_MAGIC: [u8; 4] = *b"RMBW";
const SA_MAGIC: [u8; 4] = *b"RMSA";
const ANN_MAGIC: [u8; 4] = *b"RMAN";

/// BWT 文件：符号取值 0..=3 为碱基，4 为哨兵 $，全文恰好一个哨兵。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BwtFile {
    magic: [u8; 4],
    version: u32,
    pub bwt: Vec<u8>,
}

/// 采样后缀数组：`samples[j] = SA[j * interval]`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaFile {
    magic: [u8; 4],
    version: u32,
    pub interval: u64,
    pub samples: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contig {
    pub name: String,
    /// 在拼接文本中的起始偏移
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub built_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnFile {
    magic: [u8; 4],
    version: u32,
    pub contigs: Vec<Contig>,
    pub meta: IndexMeta,
}

impl BwtFile {
    pub fn new(bwt: Vec<u8>) -> Self {
        Self { magic: BWT_MAGIC, version: FORMAT_VERSION, bwt }
    }

    pub fn read(path: &Path) -> Result<Self, IndexError> {
        let f: Self = read_bincode(path)?;
        check_header("BWT", f.magic, BWT_MAGIC, f.version)?;
        Ok(f)
    }

    pub fn write(&self, path: &Path) -> Result<(), IndexError> {
        write_bincode(path, self)
    }
}

impl SaFile {
    pub fn new(interval: u64, samples: Vec<u64>) -> Self {
        Self { magic: SA_MAGIC, version: FORMAT_VERSION, interval, samples }
    }

    /// 从完整后缀数组中每隔 `interval` 行取一个样本。
    pub fn from_full(sa: &[u64], interval: u64) -> Self {
        let step = interval.max(1) as usize;
        Self::new(interval, sa.iter().step_by(step).copied().collect())
    }

    pub fn read(path: &Path) -> Result<Self, IndexError> {
        let f: Self = read_bincode(path)?;
        check_header("suffix array", f.magic, SA_MAGIC, f.version)?;
        Ok(f)
    }

    pub fn write(&self, path: &Path) -> Result<(), IndexError> {
        write_bincode(path, self)
    }
}

impl AnnFile {
    pub fn new(contigs: Vec<Contig>, meta: IndexMeta) -> Self {
        Self { magic: ANN_MAGIC, version: FORMAT_VERSION, contigs, meta }
    }

    pub fn read(path: &Path) -> Result<Self, IndexError> {
        let f: Self = read_bincode(path)?;
        check_header("annotation", f.magic, ANN_MAGIC, f.version)?;
        Ok(f)
    }

    pub fn write(&self, path: &Path) -> Result<(), IndexError> {
        write_bincode(path, self)
    }
}

pub fn bwt_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".bwt")
}

pub fn sa_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".sa")
}

pub fn ann_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".ann")
}

/// 在 `prefix` 下写出完整的三件套索引文件。
pub fn write_all(prefix: &Path, bwt: &BwtFile, sa: &SaFile, ann: &AnnFile) -> Result<(), IndexError> {
    bwt.write(&bwt_path(prefix))?;
    sa.write(&sa_path(prefix))?;
    ann.write(&ann_path(prefix))
}

// "ref.fa" + ".bwt" -> "ref.fa.bwt"；Path::with_extension 会替换掉 ".fa"
fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn check_header(what: &'static str, magic: [u8; 4], expected: [u8; 4], version: u32) -> Result<(), IndexError> {
    if magic != expected {
        return Err(IndexError::Corrupt { what, reason: format!("bad magic {:?}", magic) });
    }
    if version != FORMAT_VERSION {
        return Err(IndexError::Corrupt {
            what,
            reason: format!("unsupported format version {} (expected {})", version, FORMAT_VERSION),
        });
    }
    Ok(())
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let f = File::open(path).map_err(|source| IndexError::Io { path: path.to_path_buf(), source })?;
    bincode::deserialize_from(BufReader::new(f))
        .map_err(|source| IndexError::Codec { path: path.to_path_buf(), source })
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let f = File::create(path).map_err(|source| IndexError::Io { path: path.to_path_buf(), source })?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value).map_err(|source| IndexError::Codec { path: path.to_path_buf(), source })?;
    w.flush().map_err(|source| IndexError::Io { path: path.to_path_buf(), source })
}
