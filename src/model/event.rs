/// 事件：一段连续原始采样的统计摘要。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Event {
    /// 首个采样在读段中的下标
    pub start: u64,
    /// 采样数
    pub length: u32,
    pub mean: f64,
    pub stdv: f64,
}

impl Event {
    pub fn new(start: u64, length: u32, mean: f64, stdv: f64) -> Self {
        Self { start, length, mean, stdv }
    }

    /// 汇总 `samples[start..start + len]`；区间为空或越界时返回 `None`。
    pub fn from_samples(samples: &[f32], start: usize, len: usize) -> Option<Self> {
        let span = samples.get(start..start.checked_add(len)?)?;
        if span.is_empty() {
            return None;
        }
        let n = span.len() as f64;
        let mean = span.iter().map(|&x| x as f64).sum::<f64>() / n;
        let var = span.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n;
        Some(Self::new(start as u64, span.len() as u32, mean, var.sqrt()))
    }
}
