//! 延迟蓄水池采样模块
//! 固定容量、随机替换的样本缓冲，用于在有界内存下计算延迟分位数

use parking_lot::Mutex;
use rand::prelude::*;
use rand::rngs::SmallRng;

/// 固定容量的蓄水池采样器
///
/// 容量填满后，第 `n` 个样本以 `capacity / n` 的概率替换一个随机槽位，
/// 因此已见过的每个样本被保留的概率相同。
#[derive(Debug, Clone)]
pub struct LatencyReservoir {
    samples: Vec<f64>,
    capacity: usize,
    seen: u64,
    rng: SmallRng,
}

impl LatencyReservoir {
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, SmallRng::from_seed(rand::random()))
    }

    /// 使用指定随机源构造，便于复现
    pub fn with_rng(capacity: usize, rng: SmallRng) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity.min(1024)),
            capacity,
            seen: 0,
            rng,
        }
    }

    #[inline]
    pub fn add_sample(&mut self, value: f64) {
        self.seen += 1;
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            let slot = self.rng.random_range(0..self.seen);
            if slot < self.capacity as u64 {
                self.samples[slot as usize] = value;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 自上次清空以来提供过的样本数
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn max(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    pub fn median(&self) -> f64 {
        self.percentile(0.5)
    }

    /// `p` 取值 `[0, 1]`，索引为 `floor(p * (n - 1))`
    pub fn percentile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable_by(f64::total_cmp);
        percentile_of_sorted(&sorted, p)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.seen = 0;
    }

    /// 一次排序后计算常用统计量
    pub fn summary(&self) -> LatencySummary {
        if self.samples.is_empty() {
            return LatencySummary::default();
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable_by(f64::total_cmp);
        LatencySummary {
            count: self.seen,
            mean: self.mean(),
            median: percentile_of_sorted(&sorted, 0.5),
            p5: percentile_of_sorted(&sorted, 0.05),
            p90: percentile_of_sorted(&sorted, 0.90),
            p95: percentile_of_sorted(&sorted, 0.95),
            p98: percentile_of_sorted(&sorted, 0.98),
            max: sorted[sorted.len() - 1],
        }
    }
}

fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    let last = sorted.len() - 1;
    let idx = (p.clamp(0.0, 1.0) * last as f64).floor() as usize;
    sorted[idx.min(last)]
}

/// 单个延迟类别的统计快照，单位与样本一致（秒）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub mean: f64,
    pub median: f64,
    pub p5: f64,
    pub p90: f64,
    pub p95: f64,
    pub p98: f64,
    pub max: f64,
}

/// 可被多个 worker 同时写入的蓄水池
#[derive(Debug)]
pub struct SharedReservoir {
    inner: Mutex<LatencyReservoir>,
}

impl SharedReservoir {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LatencyReservoir::new(capacity)),
        }
    }

    #[inline]
    pub fn add_sample(&self, value: f64) {
        self.inner.lock().add_sample(value);
    }

    pub fn summary(&self) -> LatencySummary {
        self.inner.lock().summary()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// 取出当前统计并清空
    pub fn drain(&self) -> LatencySummary {
        let mut guard = self.inner.lock();
        let summary = guard.summary();
        guard.clear();
        summary
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn seeded(capacity: usize) -> LatencyReservoir {
        LatencyReservoir::with_rng(capacity, SmallRng::seed_from_u64(42))
    }

    #[test]
    fn keeps_everything_below_capacity() {
        let mut r = seeded(100);
        let input: Vec<f64> = (0..100).map(|i| i as f64 * 0.5).collect();
        for v in &input {
            r.add_sample(*v);
        }
        assert_eq!(r.samples(), input.as_slice());
    }

    #[test]
    fn stays_at_capacity_and_keeps_a_subset() {
        let mut r = seeded(64);
        let input: HashSet<u64> = (0..10_000).collect();
        for v in 0..10_000u64 {
            r.add_sample(v as f64);
        }
        assert_eq!(r.len(), 64);
        assert_eq!(r.seen(), 10_000);
        for s in r.samples() {
            assert!(input.contains(&(*s as u64)));
        }
    }

    #[test]
    fn replacement_is_roughly_uniform() {
        // 每轮 200 个样本、容量 20，后一半样本被保留的比例应接近 1/2
        let mut late = 0usize;
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..500 {
            let mut r = LatencyReservoir::with_rng(20, SmallRng::seed_from_u64(rng.random()));
            for v in 0..200 {
                r.add_sample(v as f64);
            }
            late += r.samples().iter().filter(|v| **v >= 100.0).count();
        }
        let share = late as f64 / (500.0 * 20.0);
        assert!((share - 0.5).abs() < 0.05, "share of late samples {}", share);
    }

    #[test]
    fn percentiles_use_floor_index() {
        let mut r = seeded(16);
        for v in [5.0, 1.0, 4.0, 2.0, 3.0] {
            r.add_sample(v);
        }
        assert_eq!(r.percentile(0.0), 1.0);
        assert_eq!(r.median(), 3.0);
        assert_eq!(r.percentile(0.9), 4.0);
        assert_eq!(r.percentile(1.0), 5.0);
        assert_eq!(r.percentile(7.0), 5.0);
        assert_eq!(r.mean(), 3.0);
        assert_eq!(r.max(), 5.0);
    }

    #[test]
    fn clear_restores_empty_defaults() {
        let mut r = seeded(8);
        for v in 0..50 {
            r.add_sample(v as f64 + 1.0);
        }
        r.clear();
        assert_eq!(r.seen(), 0);
        assert_eq!(r.mean(), 0.0);
        assert_eq!(r.percentile(0.5), 0.0);
        assert_eq!(r.max(), 0.0);
        assert_eq!(r.summary(), LatencySummary::default());
    }

    #[test]
    fn shared_drain_clears() {
        let r = SharedReservoir::new(10);
        r.add_sample(0.002);
        r.add_sample(0.004);
        let s = r.drain();
        assert_eq!(s.count, 2);
        assert!((s.mean - 0.003).abs() < 1e-12);
        assert!(r.is_empty());
    }
}
