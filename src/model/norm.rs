//! 矩估计归一化：把信号的均值/标准差对齐到模型的全局均值/标准差。
//!
//! 变换为 `x' = scale * (x - shift)`，其中
//! `scale = model_stdv / s`，`shift = m - model_mean / scale`（m、s 为样本均值与总体标准差）。

use super::{Event, KmerModel};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormParams {
    pub shift: f64,
    pub scale: f64,
}

impl NormParams {
    pub const IDENTITY: NormParams = NormParams { shift: 0.0, scale: 1.0 };

    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        self.scale * (x - self.shift)
    }
}

impl Default for NormParams {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 单遍（Welford）计算均值与总体标准差。
pub fn moments(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let mut n = 0u64;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for x in values {
        n += 1;
        let d = x - mean;
        mean += d / n as f64;
        m2 += d * (x - mean);
    }
    (n > 0).then(|| (mean, (m2 / n as f64).sqrt()))
}

impl KmerModel {
    fn params_from_moments(&self, stats: Option<(f64, f64)>) -> NormParams {
        match stats {
            None => NormParams::IDENTITY,
            Some((m, s)) if s > 0.0 && s.is_finite() => {
                let scale = self.model_stdv() / s;
                NormParams { shift: m - self.model_mean() / scale, scale }
            }
            // 零方差：只平移到模型均值
            Some((m, _)) => NormParams { shift: m - self.model_mean(), scale: 1.0 },
        }
    }

    pub fn raw_norm_params(&self, raw: &[f32]) -> NormParams {
        self.params_from_moments(moments(raw.iter().map(|&x| x as f64)))
    }

    pub fn event_norm_params(&self, events: &[Event]) -> NormParams {
        self.params_from_moments(moments(events.iter().map(|e| e.mean)))
    }

    /// 原地归一化原始采样；`None` 时先估计参数。
    /// 返回实际使用的参数。
    pub fn normalize_raw(&self, raw: &mut [f32], params: Option<NormParams>) -> NormParams {
        let p = params.unwrap_or_else(|| self.raw_norm_params(raw));
        for x in raw.iter_mut() {
            *x = p.apply(*x as f64) as f32;
        }
        p
    }

    /// 原地归一化事件电流均值，标准差同步缩放。
    pub fn normalize_events(&self, events: &mut [Event], params: Option<NormParams>) -> NormParams {
        let p = params.unwrap_or_else(|| self.event_norm_params(events));
        for e in events.iter_mut() {
            e.mean = p.apply(e.mean);
            e.stdv *= p.scale.abs();
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kmer::tests::synthetic_model;

    fn signal(n: usize) -> Vec<f32> {
        // 非平凡分布：锯齿 + 偏移，量纲接近原始 ADC 值
        (0..n).map(|i| 400.0 + ((i * 37) % 101) as f32 * 2.5 + (i % 7) as f32).collect()
    }

    #[test]
    fn moments_match_two_pass() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let (m, s) = moments(xs).unwrap();
        assert!((m - 5.0).abs() < 1e-12);
        assert!((s - 2.0).abs() < 1e-12);
        assert!(moments(std::iter::empty()).is_none());
    }

    #[test]
    fn raw_round_trip_hits_model_moments() {
        let model = synthetic_model(3);
        let mut raw = signal(5000);
        let before = raw.clone();
        let params = model.raw_norm_params(&raw);
        assert_eq!(raw, before, "computing params must not mutate input");

        let applied = model.normalize_raw(&mut raw, None);
        assert_eq!(applied, params);
        let (m, s) = moments(raw.iter().map(|&x| x as f64)).unwrap();
        assert!((m - model.model_mean()).abs() < 1e-3, "mean {} vs {}", m, model.model_mean());
        assert!((s - model.model_stdv()).abs() < 1e-3, "stdv {} vs {}", s, model.model_stdv());
    }

    #[test]
    fn event_round_trip_hits_model_moments() {
        let model = synthetic_model(2);
        let mut events: Vec<Event> = signal(300)
            .iter()
            .enumerate()
            .map(|(i, &x)| Event::new(i as u64 * 5, 5, x as f64, 3.0))
            .collect();
        let p = model.normalize_events(&mut events, None);
        let (m, s) = moments(events.iter().map(|e| e.mean)).unwrap();
        assert!((m - model.model_mean()).abs() < 1e-9);
        assert!((s - model.model_stdv()).abs() < 1e-9);
        assert!((events[0].stdv - 3.0 * p.scale).abs() < 1e-12);
    }

    #[test]
    fn explicit_params_are_used_verbatim() {
        let model = synthetic_model(2);
        let mut raw = vec![10.0f32, 20.0];
        let p = NormParams { shift: 10.0, scale: 0.5 };
        model.normalize_raw(&mut raw, Some(p));
        assert_eq!(raw, vec![0.0, 5.0]);

        let mut raw = vec![10.0f32, 20.0];
        model.normalize_raw(&mut raw, Some(NormParams::IDENTITY));
        assert_eq!(raw, vec![10.0, 20.0]);
    }

    #[test]
    fn degenerate_inputs() {
        let model = synthetic_model(2);
        assert_eq!(model.raw_norm_params(&[]), NormParams::IDENTITY);

        let mut flat = vec![7.0f32; 10];
        let p = model.normalize_raw(&mut flat, None);
        assert_eq!(p.scale, 1.0);
        for x in flat {
            assert!((x as f64 - model.model_mean()).abs() < 1e-4);
        }
    }
}
