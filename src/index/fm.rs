use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use super::files::{self, AnnFile, BwtFile, Contig, IndexMeta, SaFile};
use super::{IndexError, Interval};
use crate::util::dna::{BASES, SENTINEL};

/// Occ 检查点间隔（BWT 符号数）。块内顺扫补偿。
pub const OCC_INTERVAL: usize = 64;

/// 换算后的参考坐标。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContigLocation<'a> {
    pub name: &'a str,
    pub offset: u64,
    /// 所在 contig 的总长度
    pub len: u64,
}

/// 只读 FM 索引：
/// - 文本字母表为 {A,C,G,T} + 哨兵 $，$ 字典序最小，因此 SA 第 0 行恒为 "$"。
/// - `l2[b]` 为文本中小于 b 的非哨兵符号数（BWA 约定）；含哨兵的 C 表为 `l2[b] + 1`。
/// - Occ 每 `OCC_INTERVAL` 个符号存一次累计计数。
/// - 后缀数组按 `sa_interval` 采样，其余位置通过 LF 映射回溯求得。
///
/// 加载后不可变，可通过 `Arc` 在线程间共享。
#[derive(Debug)]
pub struct FmIndex {
    bwt: Vec<u8>,
    l2: [u64; BASES + 1],
    /// occ_samples[i][c] = BWT[0..i*OCC_INTERVAL) 中 c 的数量
    occ_samples: Vec<[u64; BASES]>,
    sa_interval: u64,
    sa_samples: Vec<u64>,
    contigs: Vec<Contig>,
    meta: IndexMeta,
}

impl FmIndex {
    /// 依次加载 `{prefix}.bwt`、`{prefix}.sa`、`{prefix}.ann`。
    pub fn load(prefix: impl AsRef<Path>) -> Result<Self, IndexError> {
        let prefix = prefix.as_ref();
        let t0 = Instant::now();

        let bwt = BwtFile::read(&files::bwt_path(prefix))?;
        let sa = SaFile::read(&files::sa_path(prefix))?;
        let ann = AnnFile::read(&files::ann_path(prefix))?;
        let index = Self::from_parts(bwt, sa, ann)?;

        info!(
            prefix = %prefix.display(),
            size = index.size(),
            contigs = index.contigs.len(),
            sa_interval = index.sa_interval,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "loaded FM index"
        );
        Ok(index)
    }

    /// 由已解码的各部分组装索引，并校验其一致性。
    pub fn from_parts(bwt: BwtFile, sa: SaFile, ann: AnnFile) -> Result<Self, IndexError> {
        let bwt = bwt.bwt;
        let n = bwt.len() as u64;
        let corrupt = |what: &'static str, reason: String| IndexError::Corrupt { what, reason };

        // C 表：直接从 BWT 本身统计，保证与 Occ 同源
        let mut freq = [0u64; BASES];
        let mut sentinels = 0u64;
        for (i, &ch) in bwt.iter().enumerate() {
            match ch {
                c if (c as usize) < BASES => freq[c as usize] += 1,
                SENTINEL => sentinels += 1,
                other => return Err(corrupt("BWT", format!("symbol {} at position {}", other, i))),
            }
        }
        if sentinels != 1 {
            return Err(corrupt("BWT", format!("expected exactly one sentinel, found {}", sentinels)));
        }
        let mut l2 = [0u64; BASES + 1];
        for b in 0..BASES {
            l2[b + 1] = l2[b] + freq[b];
        }

        if sa.interval == 0 {
            return Err(corrupt("suffix array", "sampling interval is zero".to_string()));
        }
        let expected = n.div_ceil(sa.interval);
        if sa.samples.len() as u64 != expected {
            return Err(corrupt(
                "suffix array",
                format!("{} samples for size {} at interval {} (expected {})", sa.samples.len(), n, sa.interval, expected),
            ));
        }
        if let Some(&bad) = sa.samples.iter().find(|&&p| p >= n) {
            return Err(corrupt("suffix array", format!("sample {} beyond text length {}", bad, n)));
        }

        validate_contigs(&ann.contigs, n).map_err(|reason| corrupt("annotation", reason))?;

        let occ_samples = occ_checkpoints(&bwt);
        debug!(checkpoints = occ_samples.len(), "built occ checkpoints");

        Ok(Self {
            bwt,
            l2,
            occ_samples,
            sa_interval: sa.interval,
            sa_samples: sa.samples,
            contigs: ann.contigs,
            meta: ann.meta,
        })
    }

    /// 文本长度（含哨兵）。
    #[inline]
    pub fn size(&self) -> u64 {
        self.bwt.len() as u64
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// 返回 BWT[0..pos) 中 base 的出现次数；pos 超出时截断到文本长度。
    #[inline]
    pub fn occ(&self, base: u8, pos: u64) -> u64 {
        let pos = (pos as usize).min(self.bwt.len());
        let bi = pos / OCC_INTERVAL;
        let start = bi * OCC_INTERVAL;
        let add = self.bwt[start..pos].iter().filter(|&&ch| ch == base).count() as u64;
        self.occ_samples[bi][base as usize] + add
    }

    /// 以 `base` 开头的全部后缀所在的 SA 区间。
    #[inline]
    pub fn full_range(&self, base: u8) -> Interval {
        let b = base as usize;
        if b >= BASES {
            return Interval::EMPTY;
        }
        Interval::new(self.l2[b] + 1, self.l2[b + 1])
    }

    /// 反向扩展一步：由 s 的区间求 base+s 的区间。
    ///
    /// 闭区间 rank 写法为 `[l2 + occ(lo-1) + 1, l2 + occ(hi)]`；这里 `occ` 取半开前缀，
    /// 所以对应 `occ(lo)` 与 `occ(hi+1)`，避免 lo = 0 时的负下标。
    /// 结果为空表示参考中不存在该串，属于正常剪枝。
    #[inline]
    pub fn extend(&self, range: Interval, base: u8) -> Interval {
        let b = base as usize;
        if range.is_empty() || b >= BASES {
            return Interval::EMPTY;
        }
        let occ_lo = self.occ(base, range.lo);
        let occ_hi = self.occ(base, range.hi + 1);
        Interval::new(self.l2[b] + occ_lo + 1, self.l2[b] + occ_hi)
    }

    /// 反向搜索精确匹配；pattern 为 2-bit 编码。空模式返回整个 SA。
    pub fn backward_search(&self, pattern: &[u8]) -> Interval {
        let mut range = Interval::new(0, self.size() - 1);
        for &b in pattern.iter().rev() {
            range = self.extend(range, b);
            if range.is_empty() {
                break;
            }
        }
        range
    }

    /// SA 第 `slot` 行对应后缀的文本偏移。
    pub fn suffix_position(&self, slot: u64) -> Result<u64, IndexError> {
        let size = self.size();
        if slot >= size {
            return Err(IndexError::IndexOutOfRange { slot, size });
        }
        let mut k = slot;
        let mut steps = 0u64;
        // LF 回溯直到采样行：SA[k] = SA[LF(k)] + 1
        while k % self.sa_interval != 0 {
            let c = self.bwt[k as usize];
            if c == SENTINEL {
                return Ok(steps);
            }
            k = self.l2[c as usize] + self.occ(c, k + 1);
            steps += 1;
            // 合法 BWT 的 LF 映射为单一环，步数不会超过文本长度
            if steps >= size {
                return Err(IndexError::Corrupt {
                    what: "BWT",
                    reason: format!("LF walk from slot {} does not reach a sampled row", slot),
                });
            }
        }
        Ok(self.sa_samples[(k / self.sa_interval) as usize] + steps)
    }

    /// 取出区间内全部 SA 位置（按 slot 顺序）。
    pub fn interval_positions(&self, range: Interval) -> Result<Vec<u64>, IndexError> {
        range.slots().map(|slot| self.suffix_position(slot)).collect()
    }

    /// 将文本位置映射到所在 contig。落在间隙、哨兵或越界时返回 None。
    pub fn translate_position(&self, pos: u64) -> Option<ContigLocation<'_>> {
        if pos >= self.size() {
            return None;
        }
        let mut lo = 0usize;
        let mut hi = self.contigs.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let c = &self.contigs[mid];
            if pos < c.offset {
                hi = mid;
            } else if pos >= c.offset + c.len {
                lo = mid + 1;
            } else {
                return Some(ContigLocation { name: &c.name, offset: pos - c.offset, len: c.len });
            }
        }
        None
    }
}

fn occ_checkpoints(bwt: &[u8]) -> Vec<[u64; BASES]> {
    let mut samples = Vec::with_capacity(bwt.len() / OCC_INTERVAL + 1);
    let mut running = [0u64; BASES];
    for (i, &ch) in bwt.iter().enumerate() {
        if i % OCC_INTERVAL == 0 {
            samples.push(running);
        }
        if (ch as usize) < BASES {
            running[ch as usize] += 1;
        }
    }
    if bwt.len() % OCC_INTERVAL == 0 {
        samples.push(running);
    }
    samples
}

fn validate_contigs(contigs: &[Contig], size: u64) -> Result<(), String> {
    let mut prev_end = 0u64;
    for (i, c) in contigs.iter().enumerate() {
        if c.offset < prev_end {
            return Err(format!("contig '{}' (#{}) overlaps or is out of order", c.name, i));
        }
        let end = c.offset.checked_add(c.len).ok_or_else(|| format!("contig '{}' length overflows", c.name))?;
        if end > size {
            return Err(format!("contig '{}' ends at {} beyond index size {}", c.name, end, size));
        }
        prev_end = end;
    }
    Ok(())
}
