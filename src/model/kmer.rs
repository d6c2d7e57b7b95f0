use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use super::{Event, ModelError, MAX_K};
use crate::util::dna::{self, BASES};

/// [`KmerModel::stay_prob`] 中合并方差的下限。
pub const MIN_STAY_VARIANCE: f64 = 1e-2;

/// k-mer 之后必需的数值列：
/// `level_mean level_stdv sd_mean sd_stdv ig_lambda`
const NUM_FIELDS: usize = 5;

/// 模型中单个 k-mer 的参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmerParams {
    pub level_mean: f64,
    /// `2 * level_stdv^2`
    pub level_var_x2: f64,
    /// `ln(sqrt(pi * level_var_x2))`
    pub lognorm_denom: f64,
    pub sd_mean: f64,
    pub sd_stdv: f64,
}

/// 孔电流 k-mer 模型。
///
/// k-mer id 为大端 4 进制编码（首个碱基位于最高位），取值 `[0, 4^k)`。
/// 方差以 `2σ²` 形式、对数归一化分母在加载时预先算好，
/// 使得热路径上每次 (event, k-mer) 打分只需常数次浮点运算。
#[derive(Debug)]
pub struct KmerModel {
    k: u8,
    kmer_count: u32,
    kmer_mask: u32,
    complement: bool,

    lv_means: Vec<f64>,
    lv_vars_x2: Vec<f64>,
    lognorm_denoms: Vec<f64>,
    sd_means: Vec<f64>,
    sd_stdvs: Vec<f64>,

    lambda: f64,
    model_mean: f64,
    model_stdv: f64,
    /// `event_valid` 的电流接受窗口
    level_bounds: (f64, f64),

    neighbors: Vec<[u16; BASES]>,
}

impl KmerModel {
    /// 加载模型表。`complement` 为真时，每行存放在其逐位互补 k-mer 的 id 下
    /// （即互补链模型表）。
    pub fn load(path: impl AsRef<Path>, complement: bool) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|source| ModelError::Open { path: path.to_path_buf(), source })?;
        let model = Self::from_reader(BufReader::new(f), complement)?;
        info!(
            path = %path.display(),
            k = model.k,
            kmers = model.kmer_count,
            complement,
            model_mean = model.model_mean,
            model_stdv = model.model_stdv,
            "loaded k-mer model"
        );
        Ok(model)
    }

    /// 解析空白分隔的模型表。忽略空行与 `#` 注释，跳过以 `kmer` 开头的表头，
    /// `ig_lambda` 之后的多余列忽略。
    pub fn from_reader<R: BufRead>(reader: R, complement: bool) -> Result<Self, ModelError> {
        let mut k: u8 = 0;
        let mut slots: Vec<Option<[f64; NUM_FIELDS]>> = Vec::new();
        let mut lambda: Option<f64> = None;
        let mut last_line = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = idx + 1;
            last_line = lineno;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut cols = trimmed.split_whitespace();
            let kmer = cols.next().unwrap_or_default();
            if kmer.eq_ignore_ascii_case("kmer") {
                continue;
            }
            let parse_err = |reason: String| ModelError::Parse { line: lineno, reason };

            if k == 0 {
                if kmer.is_empty() || kmer.len() > MAX_K as usize {
                    return Err(parse_err(format!("k-mer length {} not in 1..={}", kmer.len(), MAX_K)));
                }
                k = kmer.len() as u8;
                slots = vec![None; 1usize << (2 * k as usize)];
            } else if kmer.len() != k as usize {
                return Err(parse_err(format!("k-mer '{}' has length {}, expected {}", kmer, kmer.len(), k)));
            }

            let mut id = 0u32;
            for &b in kmer.as_bytes() {
                let code = dna::to_code(b).ok_or_else(|| parse_err(format!("invalid base in k-mer '{}'", kmer)))?;
                id = (id << 2) | code as u32;
            }
            if complement {
                // 逐位互补不反向：2-bit 编码下即与全 1 掩码异或
                id ^= (slots.len() - 1) as u32;
            }

            let mut vals = [0f64; NUM_FIELDS];
            for (i, v) in vals.iter_mut().enumerate() {
                let tok = cols.next().ok_or_else(|| parse_err(format!("expected {} numeric columns, found {}", NUM_FIELDS, i)))?;
                *v = tok
                    .parse::<f64>()
                    .ok()
                    .filter(|x| x.is_finite())
                    .ok_or_else(|| parse_err(format!("'{}' is not a finite number", tok)))?;
            }
            let [_, lv_stdv, _, sd_stdv, row_lambda] = vals;
            if lv_stdv <= 0.0 {
                return Err(parse_err(format!("level stdv must be positive, got {}", lv_stdv)));
            }
            if sd_stdv < 0.0 {
                return Err(parse_err(format!("sd stdv must be non-negative, got {}", sd_stdv)));
            }
            if row_lambda <= 0.0 {
                return Err(parse_err(format!("lambda must be positive, got {}", row_lambda)));
            }
            match lambda {
                None => lambda = Some(row_lambda),
                Some(l) if (l - row_lambda).abs() > 1e-9 * l.abs().max(1.0) => {
                    return Err(parse_err(format!("lambda {} differs from {}", row_lambda, l)));
                }
                Some(_) => {}
            }

            let slot = &mut slots[id as usize];
            if slot.is_some() {
                return Err(parse_err(format!("duplicate k-mer '{}'", kmer)));
            }
            *slot = Some(vals);
        }

        let lambda = lambda.ok_or_else(|| ModelError::Parse { line: last_line, reason: "model table is empty".to_string() })?;
        let missing = slots.iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            return Err(ModelError::Parse {
                line: last_line,
                reason: format!("{} of {} k-mers missing", missing, slots.len()),
            });
        }

        let rows: Vec<[f64; NUM_FIELDS]> = slots.into_iter().flatten().collect();
        let model = Self::from_rows(k, &rows, lambda, complement);
        // 全部电流均值相同时无法做矩估计归一化
        if !(model.model_stdv > 0.0 && model.model_stdv.is_finite()) {
            return Err(ModelError::Parse {
                line: last_line,
                reason: format!("level means have no spread (model stdv {})", model.model_stdv),
            });
        }
        Ok(model)
    }

    fn from_rows(k: u8, rows: &[[f64; NUM_FIELDS]], lambda: f64, complement: bool) -> Self {
        let kmer_count = rows.len() as u32;
        let lv_means: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        let lv_vars_x2: Vec<f64> = rows.iter().map(|r| 2.0 * r[1] * r[1]).collect();
        let lognorm_denoms = lv_vars_x2.iter().map(|&v| (PI * v).sqrt().ln()).collect();
        let sd_means = rows.iter().map(|r| r[2]).collect();
        let sd_stdvs = rows.iter().map(|r| r[3]).collect();

        let n = kmer_count as f64;
        let model_mean = lv_means.iter().sum::<f64>() / n;
        let model_stdv = (lv_means.iter().map(|&m| (m - model_mean).powi(2)).sum::<f64>() / n).sqrt();

        let max_stdv = rows.iter().map(|r| r[1]).fold(0.0, f64::max);
        let lo = lv_means.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = lv_means.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut model = Self {
            k,
            kmer_count,
            kmer_mask: kmer_count - 1,
            complement,
            lv_means,
            lv_vars_x2,
            lognorm_denoms,
            sd_means,
            sd_stdvs,
            lambda,
            model_mean,
            model_stdv,
            level_bounds: (lo - 3.0 * max_stdv, hi + 3.0 * max_stdv),
            neighbors: Vec::new(),
        };
        model.neighbors = (0..kmer_count)
            .map(|id| {
                let mut next = [0u16; BASES];
                for (b, slot) in next.iter_mut().enumerate() {
                    *slot = model.neighbor(id as u16, b as u8);
                }
                next
            })
            .collect();
        debug!(k, kmer_count, "precomputed neighbor table");
        model
    }

    #[inline]
    pub fn kmer_len(&self) -> u8 {
        self.k
    }

    #[inline]
    pub fn kmer_count(&self) -> u32 {
        self.kmer_count
    }

    pub fn model_mean(&self) -> f64 {
        self.model_mean
    }

    pub fn model_stdv(&self) -> f64 {
        self.model_stdv
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn is_complement(&self) -> bool {
        self.complement
    }

    #[inline]
    fn check_id(&self, id: u16) -> Result<usize, ModelError> {
        if (id as u32) < self.kmer_count {
            Ok(id as usize)
        } else {
            Err(ModelError::InvalidKmerId { id, count: self.kmer_count })
        }
    }

    pub fn kmer_params(&self, id: u16) -> Result<KmerParams, ModelError> {
        let i = self.check_id(id)?;
        Ok(KmerParams {
            level_mean: self.lv_means[i],
            level_var_x2: self.lv_vars_x2[i],
            lognorm_denom: self.lognorm_denoms[i],
            sd_mean: self.sd_means[i],
            sd_stdv: self.sd_stdvs[i],
        })
    }

    /// 电流 `level` 在 k-mer `id` 下的高斯对数密度。
    #[inline]
    pub fn level_match_prob(&self, level: f64, id: u16) -> Result<f64, ModelError> {
        let i = self.check_id(id)?;
        let d = level - self.lv_means[i];
        Ok(-(d * d) / self.lv_vars_x2[i] - self.lognorm_denoms[i])
    }

    /// 事件 `evt` 由 k-mer `id` 产生的对数概率。
    #[inline]
    pub fn event_match_prob(&self, evt: &Event, id: u16) -> Result<f64, ModelError> {
        self.level_match_prob(evt.mean, id)
    }

    /// `e2` 与 `e1` 停留在同一 k-mer 上的对数概率。
    ///
    /// 电流项：均值差在合并标准误方差下的高斯对数密度。
    /// 时长项：均值为 `lambda` 个采样的指数驻留分布在合并事件长度上的生存概率。
    pub fn stay_prob(&self, e1: &Event, e2: &Event) -> f64 {
        let n1 = e1.length.max(1) as f64;
        let n2 = e2.length.max(1) as f64;
        let var = (e1.stdv * e1.stdv / n1 + e2.stdv * e2.stdv / n2).max(MIN_STAY_VARIANCE);
        let d = e1.mean - e2.mean;
        let level = -(d * d) / (2.0 * var) - 0.5 * (2.0 * PI * var).ln();
        let duration = -(n1 + n2) / self.lambda;
        level + duration
    }

    /// 归一化后的事件在该模型下是否合理。
    pub fn event_valid(&self, evt: &Event) -> bool {
        let (lo, hi) = self.level_bounds;
        evt.length > 0
            && evt.stdv.is_finite()
            && evt.stdv >= 0.0
            && evt.mean.is_finite()
            && evt.mean >= lo
            && evt.mean <= hi
    }

    /// 将 `seq[offset..offset + k]` 编码为 k-mer id。
    pub fn kmer_to_id(&self, seq: &[u8], offset: usize) -> Result<u16, ModelError> {
        let k = self.k as usize;
        let end = offset
            .checked_add(k)
            .filter(|&e| e <= seq.len())
            .ok_or(ModelError::KmerTooShort { k: self.k, offset, len: seq.len() })?;
        let mut id = 0u32;
        for (i, &b) in seq[offset..end].iter().enumerate() {
            let code = dna::to_code(b).ok_or(ModelError::InvalidBase { base: b, position: offset + i })?;
            id = (id << 2) | code as u32;
        }
        Ok(id as u16)
    }

    /// k-mer `id` 第 `i` 位（0 为首碱基）的碱基编码；`i >= k` 时报错。
    #[inline]
    pub fn id_to_base(&self, id: u16, i: u8) -> Result<u8, ModelError> {
        if i >= self.k {
            return Err(ModelError::BaseIndexOutOfRange { index: i, k: self.k });
        }
        Ok(self.base_at(id, i))
    }

    // 调用方保证 i < k
    #[inline]
    fn base_at(&self, id: u16, i: u8) -> u8 {
        let shift = 2 * (self.k - 1 - i) as u32;
        ((id as u32 >> shift) & 3) as u8
    }

    #[inline]
    pub fn first_base(&self, id: u16) -> u8 {
        self.base_at(id, 0)
    }

    #[inline]
    pub fn last_base(&self, id: u16) -> u8 {
        (id & 3) as u8
    }

    pub fn id_to_kmer(&self, id: u16) -> String {
        (0..self.k).map(|i| dna::from_code(self.base_at(id, i)) as char).collect()
    }

    /// 反向互补 k-mer 的 id（纯函数，自反）。
    pub fn complement_id(&self, id: u16) -> u16 {
        let mut src = id as u32 & self.kmer_mask;
        let mut out = 0u32;
        for _ in 0..self.k {
            out = (out << 2) | (3 - (src & 3));
            src >>= 2;
        }
        out as u16
    }

    /// 在 3' 端移入 `base` 后得到的 k-mer。
    #[inline]
    pub fn neighbor(&self, id: u16, base: u8) -> u16 {
        (((id as u32) << 2 & self.kmer_mask) | (base as u32 & 3)) as u16
    }

    /// 预计算的 `id` 邻接 k-mer，按 A、C、G、T 顺序。
    #[inline]
    pub fn neighbors(&self, id: u16) -> Result<&[u16], ModelError> {
        let i = self.check_id(id)?;
        Ok(&self.neighbors[i])
    }
}
