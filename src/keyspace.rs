//! 键空间模块
//! 逻辑索引到存储键的单调映射，以及冷热键的选择

use crate::config::{HotKeyLayout, INDEX_HEX_DIGITS, MONOTONIC_CHECK_PAIRS, WorkloadConfig};
use crate::error::{AppError, Result};
use crate::store::Key;
use rand::prelude::*;

/// 键空间模型
///
/// `key_for_index` 在 `[0, node_count)` 上严格单调，范围读和相邻读写都依赖这一点。
#[derive(Debug, Clone)]
pub struct KeyspaceModel {
    node_count: u64,
    key_len: usize,
    node_prefix: Option<u64>,
    hot_key_fraction: f64,
    force_hot_probability: f64,
    layout: HotKeyLayout,
}

impl KeyspaceModel {
    /// 构造并执行单调性自检
    pub fn new(config: &WorkloadConfig) -> Result<Self> {
        let model = Self {
            node_count: config.node_count,
            key_len: config.key_len(),
            node_prefix: config.node_prefix,
            hot_key_fraction: config.hot_key_fraction,
            force_hot_probability: config.force_hot_probability(),
            layout: config.hot_key_layout,
        };
        model.check_monotonic(&mut rand::rng(), MONOTONIC_CHECK_PAIRS)?;
        Ok(model)
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn force_hot_probability(&self) -> f64 {
        self.force_hot_probability
    }

    /// 索引编码为定长十六进制，`absent` 变体多一个填充字节，
    /// 因此不会与已写入的键重合
    pub fn key_for_index(&self, index: u64, absent: bool) -> Key {
        let len = if absent { self.key_len + 1 } else { self.key_len };
        let mut key = Vec::with_capacity(len);
        if let Some(prefix) = self.node_prefix {
            key.extend_from_slice(hex_digits(prefix).as_bytes());
        }
        key.extend_from_slice(hex_digits(index).as_bytes());
        key.resize(len, b'.');
        key
    }

    /// 在 `[0, n)` 中抽取一个索引，按配置把一部分流量导向热点键
    pub fn random_index<R: Rng + ?Sized>(&self, rng: &mut R, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        if self.force_hot_probability > 0.0 && rng.random::<f64>() < self.force_hot_probability {
            let hot = rng.random_range(0..self.hot_span(n));
            return self.place_hot(hot, n);
        }
        rng.random_range(0..n)
    }

    /// 索引是否属于 `[0, n)` 上的热点集合
    pub fn is_hot(&self, index: u64, n: u64) -> bool {
        if self.hot_key_fraction <= 0.0 || index >= n {
            return false;
        }
        let span = self.hot_span(n);
        match self.layout {
            HotKeyLayout::Contiguous => index < span,
            HotKeyLayout::Spread => {
                let base = (index as f64 * self.hot_key_fraction) as u64;
                (base.saturating_sub(1)..=base + 1)
                    .any(|hot| hot < span && self.place_hot(hot, n) == index)
            }
        }
    }

    fn hot_span(&self, n: u64) -> u64 {
        ((n as f64 * self.hot_key_fraction) as u64).clamp(1, n)
    }

    fn place_hot(&self, hot: u64, n: u64) -> u64 {
        match self.layout {
            HotKeyLayout::Spread => ((hot as f64 / self.hot_key_fraction) as u64).min(n - 1),
            HotKeyLayout::Contiguous => hot,
        }
    }

    /// 抽样检查 `a <= b` 时 `key_for_index(a) <= key_for_index(b)`
    pub fn check_monotonic<R: Rng + ?Sized>(&self, rng: &mut R, pairs: usize) -> Result<()> {
        for _ in 0..pairs {
            let mut a = rng.random_range(0..self.node_count);
            let mut b = rng.random_range(0..self.node_count);
            if a > b {
                std::mem::swap(&mut a, &mut b);
            }
            for absent in [false, true] {
                if self.key_for_index(a, absent) > self.key_for_index(b, absent) {
                    return Err(AppError::Keyspace(format!(
                        "key for index {} sorts after key for index {}",
                        a, b
                    )));
                }
            }
        }
        Ok(())
    }
}

/// 定长小写十六进制
fn hex_digits(v: u64) -> String {
    format!("{:0width$x}", v, width = INDEX_HEX_DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use rand::rngs::SmallRng;

    fn model(options: Options) -> KeyspaceModel {
        KeyspaceModel::new(&WorkloadConfig::from_options(&options).unwrap()).unwrap()
    }

    #[test]
    fn keys_are_fixed_width_and_ordered() {
        let m = model(Options::new().with("nodeCount", 1000).with("keyBytes", 20));
        assert_eq!(m.key_for_index(0, false), b"0000000000000000....".to_vec());
        assert_eq!(m.key_for_index(255, false), b"00000000000000ff....".to_vec());
        assert_eq!(m.key_for_index(255, true).len(), 21);
        assert!(m.key_for_index(9, false) < m.key_for_index(10, false));
        assert!(m.key_for_index(15, false) < m.key_for_index(16, false));
    }

    #[test]
    fn node_prefix_precedes_index() {
        let m = model(Options::new().with("nodeCount", 1000).with("nodePrefix", 0xab));
        let key = m.key_for_index(0x1f, false);
        assert_eq!(key.len(), 32);
        assert_eq!(key, b"00000000000000ab000000000000001f".to_vec());
        assert_eq!(m.key_for_index(0x1f, true), [key, b".".to_vec()].concat());
    }

    #[test]
    fn randomized_pairs_are_monotonic() {
        let m = model(Options::new().with("nodeCount", 1_000_000).with("nodePrefix", 12));
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..5_000 {
            let a = rng.random_range(0..1_000_000u64);
            let b = rng.random_range(a..1_000_000u64);
            assert!(m.key_for_index(a, false) <= m.key_for_index(b, false));
        }
        assert!(m.check_monotonic(&mut rng, 1_000).is_ok());
    }

    #[test]
    fn zero_hot_fraction_is_uniform() {
        let m = model(Options::new().with("nodeCount", 100));
        assert_eq!(m.force_hot_probability(), 0.0);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut counts = [0u32; 100];
        for _ in 0..100_000 {
            counts[m.random_index(&mut rng, 100) as usize] += 1;
        }
        assert!(counts.iter().all(|c| (700..1300).contains(c)));
        assert!(!m.is_hot(0, 100));
    }

    #[test]
    fn spread_hot_keys_receive_target_traffic() {
        let n = 10_000;
        let m = model(
            Options::new()
                .with("nodeCount", n)
                .with("hotKeyFraction", 0.1)
                .with("hotTrafficFraction", 0.5),
        );
        let hot_keys = (0..n).filter(|i| m.is_hot(*i, n)).count();
        assert_eq!(hot_keys, 1_000);

        let mut rng = SmallRng::seed_from_u64(11);
        let draws = 100_000;
        let hits = (0..draws)
            .filter(|_| m.is_hot(m.random_index(&mut rng, n), n))
            .count();
        let share = hits as f64 / draws as f64;
        assert!((share - 0.5).abs() < 0.01, "hot share {}", share);
    }

    #[test]
    fn contiguous_hot_keys_receive_target_traffic() {
        let n = 10_000;
        let m = model(
            Options::new()
                .with("nodeCount", n)
                .with("hotKeyFraction", 0.1)
                .with("hotTrafficFraction", 0.5)
                .with("spreadHotKeys", false),
        );
        let mut rng = SmallRng::seed_from_u64(5);
        let draws = 100_000;
        let hits = (0..draws)
            .filter(|_| m.random_index(&mut rng, n) < n / 10)
            .count();
        let share = hits as f64 / draws as f64;
        assert!((share - 0.5).abs() < 0.01, "hot share {}", share);
    }

    #[test]
    fn indexes_stay_in_range() {
        let m = model(
            Options::new()
                .with("nodeCount", 7)
                .with("hotKeyFraction", 0.3)
                .with("hotTrafficFraction", 0.9),
        );
        let mut rng = SmallRng::seed_from_u64(9);
        for n in 1..=7 {
            for _ in 0..1_000 {
                assert!(m.random_index(&mut rng, n) < n);
            }
        }
        assert_eq!(m.random_index(&mut rng, 0), 0);
    }
}
