//! 比对器接口：worker 驱动的对象及其输出。
//!
//! 种子扩展 / 判定算法由宿主实现。实现通常在 `Params` 中持有
//! `Arc<FmIndex>` 与 `Arc<KmerModel>`，并克隆到每个实例中。

use std::fmt;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapStatus {
    Mapped { confidence: f64 },
    Unmapped,
    /// 比对器在该读段上返回错误或发生恐慌。
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationResult {
    pub read_id: String,
    pub contig: Option<String>,
    pub offset: u64,
    pub strand: Strand,
    pub status: MapStatus,
}

impl LocationResult {
    pub fn mapped(read_id: impl Into<String>, contig: impl Into<String>, offset: u64, strand: Strand, confidence: f64) -> Self {
        Self {
            read_id: read_id.into(),
            contig: Some(contig.into()),
            offset,
            strand,
            status: MapStatus::Mapped { confidence },
        }
    }

    pub fn unmapped(read_id: impl Into<String>) -> Self {
        Self { read_id: read_id.into(), contig: None, offset: 0, strand: Strand::Forward, status: MapStatus::Unmapped }
    }

    pub fn failed(read_id: impl Into<String>) -> Self {
        Self { status: MapStatus::Failed, ..Self::unmapped(read_id) }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.status, MapStatus::Mapped { .. })
    }
}

/// 制表符分隔：`read_id contig offset strand status`。
impl fmt::Display for LocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strand = match self.strand {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        };
        write!(f, "{}\t{}\t{}\t{}\t", self.read_id, self.contig.as_deref().unwrap_or("*"), self.offset, strand)?;
        match self.status {
            MapStatus::Mapped { confidence } => write!(f, "mapped:{:.3}", confidence),
            MapStatus::Unmapped => write!(f, "unmapped"),
            MapStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 单个比对器实例，只归属一个 worker 线程。
pub trait Aligner: Send + 'static {
    type Params;

    fn from_params(params: &Self::Params) -> Self;

    /// 重置单条读段的状态。
    fn new_read(&mut self, read_id: &str);

    fn add_samples(&mut self, samples: &[f32]) -> Result<LocationResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_tab_separated() {
        let m = LocationResult::mapped("r1", "chr2", 1234, Strand::Reverse, 0.98765);
        assert_eq!(m.to_string(), "r1\tchr2\t1234\t-\tmapped:0.988");
        assert!(m.is_mapped());
        assert_eq!(LocationResult::unmapped("r2").to_string(), "r2\t*\t0\t+\tunmapped");
        let f = LocationResult::failed("r3");
        assert_eq!(f.status, MapStatus::Failed);
        assert!(!f.is_mapped());
    }
}
