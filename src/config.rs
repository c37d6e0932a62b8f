//! 配置模块
//! 定义所有默认值常量、扁平选项表以及校验后的负载配置

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 延迟蓄水池容量
pub const SAMPLE_SIZE: usize = 10_000;

/// 范围读取的行数上限
pub const RANGE_READ_LIMIT: usize = 80_000;

/// 构造时单调性自检抽样的索引对数量
pub const MONOTONIC_CHECK_PAIRS: usize = 30;

/// 索引在键中占用的十六进制位数
pub const INDEX_HEX_DIGITS: usize = 16;

/// 各选项的默认值
pub mod defaults {
    /// 测试时长（秒）
    pub const TEST_DURATION_SECS: f64 = 10.0;

    /// 所有客户端合计的目标事务速率
    pub const TRANSACTIONS_PER_SECOND: f64 = 5000.0;

    /// 用于推算并发 worker 数量的可接受延迟（秒）
    pub const ALLOWED_LATENCY_SECS: f64 = 0.250;

    pub const READS_PER_TRANSACTION_A: u64 = 10;
    pub const WRITES_PER_TRANSACTION_A: u64 = 0;
    pub const READS_PER_TRANSACTION_B: u64 = 1;
    pub const WRITES_PER_TRANSACTION_B: u64 = 9;

    /// 选择 A 类事务的概率
    pub const ALPHA: f64 = 0.1;

    /// 逻辑键空间大小
    pub const NODE_COUNT: u64 = 100_000;

    pub const KEY_BYTES: u64 = 16;
    pub const VALUE_BYTES: u64 = 96;

    /// 周期日志间隔（秒）
    pub const PERIODIC_LOGGING_INTERVAL_SECS: f64 = 5.0;

    pub const RAMP_SWEEP_COUNT: u64 = 1;
}

/// 错误消息常量
pub mod messages {
    pub const INVALID_OPTIONS: &str = "Invalid workload options";
    pub const KEYSPACE_CHECK_FAILED: &str = "Keyspace self-check failed";
    pub const PACER_CREATE_FAILED: &str = "Failed to create pacing distribution";
    pub const WARMUP_FAILED: &str = "Warm-up read failed";
    pub const WORKER_FAILED: &str = "Worker failed";
    pub const RUNTIME_CREATE_FAILED: &str = "Failed to create Compio runtime";
}

/// 基准测试配置
pub mod bench {
    pub const SEED: u64 = 42;
    pub const SAMPLE_SIZE: usize = 10;
    pub const MEASUREMENT_TIME_SECS: u64 = 10;
    /// 单次迭代写入蓄水池的样本数
    pub const RESERVOIR_SAMPLES: usize = 100_000;
    /// 单次迭代构造的事务数
    pub const ATTEMPTS: usize = 10_000;
    pub const RUN_DURATION_SECS: f64 = 0.5;
    pub const RUN_TRANSACTIONS_PER_SECOND: f64 = 2000.0;
}

/// 单个选项的取值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

macro_rules! option_value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for OptionValue {
            fn from(v: $t) -> Self {
                OptionValue::Int(v as i64)
            }
        })*
    };
}

option_value_from_int!(i32, i64, u32, u64, usize);

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

/// 扁平的选项表：选项名 -> 取值
///
/// 未识别的选项会被忽略，缺失的选项使用默认值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, OptionValue>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式设置选项
    pub fn with(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<OptionValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get_f64(&self, name: &str, default: f64) -> Result<f64> {
        match self.0.get(name) {
            None => Ok(default),
            Some(OptionValue::Float(v)) => Ok(*v),
            Some(OptionValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(type_mismatch(name, "a number", other)),
        }
    }

    pub fn get_i64(&self, name: &str, default: i64) -> Result<i64> {
        match self.0.get(name) {
            None => Ok(default),
            Some(OptionValue::Int(v)) => Ok(*v),
            Some(OptionValue::Float(v)) if v.fract() == 0.0 => Ok(*v as i64),
            Some(other) => Err(type_mismatch(name, "an integer", other)),
        }
    }

    pub fn get_u64(&self, name: &str, default: u64) -> Result<u64> {
        let v = self.get_i64(name, default as i64)?;
        u64::try_from(v).map_err(|_| {
            AppError::Config(format!("option {} must not be negative, got {}", name, v))
        })
    }

    /// 计数类选项，超出目标整数类型时报错而不是截断
    pub fn get_usize(&self, name: &str, default: usize) -> Result<usize> {
        let v = self.get_u64(name, default as u64)?;
        usize::try_from(v).map_err(|_| out_of_range(name, v))
    }

    pub fn get_u32(&self, name: &str, default: u32) -> Result<u32> {
        let v = self.get_u64(name, u64::from(default))?;
        u32::try_from(v).map_err(|_| out_of_range(name, v))
    }

    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.0.get(name) {
            None => Ok(default),
            Some(OptionValue::Bool(v)) => Ok(*v),
            Some(OptionValue::Int(0)) => Ok(false),
            Some(OptionValue::Int(1)) => Ok(true),
            Some(OptionValue::Text(s)) if s == "true" => Ok(true),
            Some(OptionValue::Text(s)) if s == "false" => Ok(false),
            Some(other) => Err(type_mismatch(name, "a boolean", other)),
        }
    }

    fn get_secs(&self, name: &str, default: f64) -> Result<Duration> {
        let v = self.get_f64(name, default)?;
        Duration::try_from_secs_f64(v).map_err(|_| {
            AppError::Config(format!("option {} must be a non-negative duration, got {}", name, v))
        })
    }
}

fn out_of_range(name: &str, v: u64) -> AppError {
    AppError::Config(format!("option {} is out of range, got {}", name, v))
}

fn type_mismatch(name: &str, expected: &str, got: &OptionValue) -> AppError {
    AppError::Config(format!("option {} expects {}, got {:?}", name, expected, got))
}

/// 热点键在键空间中的布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotKeyLayout {
    /// 热点索引除以 hotKeyFraction 后散布在整个键空间
    Spread,
    /// 热点索引就是 `[0, nodeCount * hotKeyFraction)` 这一段前缀
    Contiguous,
}

/// 校验后的负载配置，构造完成后只读
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub test_duration: Duration,
    /// 本客户端的目标事务速率（总速率除以 client_count）
    pub transactions_per_second: f64,
    /// 本客户端的并发 worker 数量
    pub actor_count: usize,

    pub reads_per_transaction_a: usize,
    pub writes_per_transaction_a: usize,
    pub reads_per_transaction_b: usize,
    pub writes_per_transaction_b: usize,
    pub alpha: f64,
    pub extra_read_conflict_ranges: usize,
    pub extra_write_conflict_ranges: usize,

    pub node_count: u64,
    pub key_bytes: usize,
    pub node_prefix: Option<u64>,
    pub min_value_bytes: usize,
    pub max_value_bytes: usize,
    pub hot_key_fraction: f64,
    pub hot_traffic_fraction: f64,
    pub hot_key_layout: HotKeyLayout,

    pub ramp_up_load: bool,
    pub ramp_transaction_type: bool,
    pub ramp_up_concurrency: bool,
    pub ramp_sweep_count: u32,

    /// 未经 discard_edge_measurements 调整的原始窗口
    pub metrics_start: Duration,
    pub metrics_duration: Duration,
    pub discard_edge_measurements: bool,

    pub dependent_reads: bool,
    pub range_reads: bool,
    pub adjacent_reads: bool,
    pub adjacent_writes: bool,
    pub inconsistent_reads: bool,
    pub use_ryw: bool,

    pub debug_time: Duration,
    pub debug_interval: Duration,
    pub enable_read_latency_logging: bool,
    pub periodic_logging_interval: Duration,
    pub cancel_workers_at_duration: bool,
    pub warm_up: bool,

    pub client_id: usize,
    pub client_count: usize,
    pub sample_size: usize,
    /// 固定种子时每个 worker 的随机流可复现
    pub seed: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        let test_duration = Duration::from_secs_f64(defaults::TEST_DURATION_SECS);
        let tps = defaults::TRANSACTIONS_PER_SECOND;
        Self {
            test_duration,
            transactions_per_second: tps,
            actor_count: default_actor_count(tps, defaults::ALLOWED_LATENCY_SECS),
            reads_per_transaction_a: defaults::READS_PER_TRANSACTION_A as usize,
            writes_per_transaction_a: defaults::WRITES_PER_TRANSACTION_A as usize,
            reads_per_transaction_b: defaults::READS_PER_TRANSACTION_B as usize,
            writes_per_transaction_b: defaults::WRITES_PER_TRANSACTION_B as usize,
            alpha: defaults::ALPHA,
            extra_read_conflict_ranges: 0,
            extra_write_conflict_ranges: 0,
            node_count: defaults::NODE_COUNT,
            key_bytes: defaults::KEY_BYTES as usize,
            node_prefix: None,
            min_value_bytes: defaults::VALUE_BYTES as usize,
            max_value_bytes: defaults::VALUE_BYTES as usize,
            hot_key_fraction: 0.0,
            hot_traffic_fraction: 0.0,
            hot_key_layout: HotKeyLayout::Spread,
            ramp_up_load: false,
            ramp_transaction_type: false,
            ramp_up_concurrency: false,
            ramp_sweep_count: defaults::RAMP_SWEEP_COUNT as u32,
            metrics_start: Duration::ZERO,
            metrics_duration: test_duration,
            discard_edge_measurements: true,
            dependent_reads: false,
            range_reads: false,
            adjacent_reads: false,
            adjacent_writes: false,
            inconsistent_reads: false,
            use_ryw: false,
            debug_time: Duration::ZERO,
            debug_interval: Duration::ZERO,
            enable_read_latency_logging: false,
            periodic_logging_interval: Duration::from_secs_f64(
                defaults::PERIODIC_LOGGING_INTERVAL_SECS,
            ),
            cancel_workers_at_duration: true,
            warm_up: true,
            client_id: 0,
            client_count: 1,
            sample_size: SAMPLE_SIZE,
            seed: None,
        }
    }
}

fn default_actor_count(tps: f64, allowed_latency: f64) -> usize {
    ((tps * allowed_latency).ceil() as usize).max(1)
}

impl WorkloadConfig {
    /// 从扁平选项表构造并校验配置
    pub fn from_options(options: &Options) -> Result<Self> {
        let d = Self::default();

        let client_count = options.get_usize("clientCount", 1)?;
        let client_id = options.get_usize("clientId", 0)?;
        let test_duration = options.get_secs("testDuration", defaults::TEST_DURATION_SECS)?;
        if client_count == 0 {
            return Err(AppError::Config("clientCount must be at least 1".into()));
        }
        let transactions_per_second = options
            .get_f64("transactionsPerSecond", defaults::TRANSACTIONS_PER_SECOND)?
            / client_count as f64;
        let allowed_latency = options.get_f64("allowedLatency", defaults::ALLOWED_LATENCY_SECS)?;
        let actor_count = options.get_usize(
            "actorCountPerTester",
            default_actor_count(transactions_per_second, allowed_latency),
        )?;

        let max_value_bytes = options.get_usize("valueBytes", defaults::VALUE_BYTES as usize)?;
        let min_value_bytes = options.get_usize("minValueBytes", max_value_bytes)?;
        let node_prefix = match options.get_i64("nodePrefix", -1)? {
            p if p < 0 => None,
            p => Some(p as u64),
        };

        let config = Self {
            test_duration,
            transactions_per_second,
            actor_count,
            reads_per_transaction_a: options
                .get_usize("readsPerTransactionA", defaults::READS_PER_TRANSACTION_A as usize)?,
            writes_per_transaction_a: options
                .get_usize("writesPerTransactionA", defaults::WRITES_PER_TRANSACTION_A as usize)?,
            reads_per_transaction_b: options
                .get_usize("readsPerTransactionB", defaults::READS_PER_TRANSACTION_B as usize)?,
            writes_per_transaction_b: options
                .get_usize("writesPerTransactionB", defaults::WRITES_PER_TRANSACTION_B as usize)?,
            alpha: options.get_f64("alpha", defaults::ALPHA)?,
            extra_read_conflict_ranges: options.get_usize("extraReadConflictRangesPerTransaction", 0)?,
            extra_write_conflict_ranges: options.get_usize("extraWriteConflictRangesPerTransaction", 0)?,
            node_count: options.get_u64("nodeCount", defaults::NODE_COUNT)?,
            key_bytes: options.get_usize("keyBytes", defaults::KEY_BYTES as usize)?,
            node_prefix,
            min_value_bytes,
            max_value_bytes,
            hot_key_fraction: options.get_f64("hotKeyFraction", 0.0)?,
            hot_traffic_fraction: options.get_f64("hotTrafficFraction", 0.0)?,
            hot_key_layout: if options.get_bool("spreadHotKeys", true)? {
                HotKeyLayout::Spread
            } else {
                HotKeyLayout::Contiguous
            },
            ramp_up_load: options.get_bool("rampUpLoad", d.ramp_up_load)?,
            ramp_transaction_type: options
                .get_bool("rampTransactionType", d.ramp_transaction_type)?,
            ramp_up_concurrency: options.get_bool("rampUpConcurrency", d.ramp_up_concurrency)?,
            ramp_sweep_count: options.get_u32("rampSweepCount", defaults::RAMP_SWEEP_COUNT as u32)?,
            metrics_start: options.get_secs("metricsStart", 0.0)?,
            metrics_duration: options
                .get_secs("metricsDuration", test_duration.as_secs_f64())?,
            discard_edge_measurements: options
                .get_bool("discardEdgeMeasurements", d.discard_edge_measurements)?,
            dependent_reads: options.get_bool("dependentReads", d.dependent_reads)?,
            range_reads: options.get_bool("rangeReads", d.range_reads)?,
            adjacent_reads: options.get_bool("adjacentReads", d.adjacent_reads)?,
            adjacent_writes: options.get_bool("adjacentWrites", d.adjacent_writes)?,
            inconsistent_reads: options.get_bool("inconsistentReads", d.inconsistent_reads)?,
            use_ryw: options.get_bool("useRYW", d.use_ryw)?,
            debug_time: options.get_secs("debugTime", 0.0)?,
            debug_interval: options.get_secs("debugInterval", 0.0)?,
            enable_read_latency_logging: options
                .get_bool("enableReadLatencyLogging", d.enable_read_latency_logging)?,
            periodic_logging_interval: options.get_secs(
                "periodicLoggingInterval",
                defaults::PERIODIC_LOGGING_INTERVAL_SECS,
            )?,
            cancel_workers_at_duration: options
                .get_bool("cancelWorkersAtDuration", d.cancel_workers_at_duration)?,
            warm_up: options.get_bool("warmUp", d.warm_up)?,
            client_id,
            client_count,
            sample_size: options.get_usize("sampleSize", SAMPLE_SIZE)?,
            seed: if options.contains("seed") {
                Some(options.get_u64("seed", 0)?)
            } else {
                None
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 检查配置约束，违反任何一条都是致命错误
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(AppError::Config(msg));

        if self.test_duration.is_zero() {
            return fail("testDuration must be positive".into());
        }
        if !(self.transactions_per_second > 0.0) {
            return fail(format!(
                "transactionsPerSecond must be positive, got {}",
                self.transactions_per_second
            ));
        }
        if self.actor_count == 0 {
            return fail("actorCountPerTester must be at least 1".into());
        }
        self.worker_delay()?;
        if !(0.0..=1.0).contains(&self.alpha) {
            return fail(format!("alpha must be within [0, 1], got {}", self.alpha));
        }
        if self.node_count == 0 {
            return fail("nodeCount must be positive".into());
        }
        if self.min_value_bytes > self.max_value_bytes {
            return fail(format!(
                "minValueBytes ({}) exceeds valueBytes ({})",
                self.min_value_bytes, self.max_value_bytes
            ));
        }
        if self.key_bytes < INDEX_HEX_DIGITS {
            return fail(format!(
                "keyBytes must be at least {}, got {}",
                INDEX_HEX_DIGITS, self.key_bytes
            ));
        }
        if !(0.0..=1.0).contains(&self.hot_key_fraction)
            || !(0.0..=1.0).contains(&self.hot_traffic_fraction)
        {
            return fail(format!(
                "hot fractions must be within [0, 1], got hotKeyFraction={} hotTrafficFraction={}",
                self.hot_key_fraction, self.hot_traffic_fraction
            ));
        }
        if self.hot_key_fraction > self.hot_traffic_fraction {
            return fail(format!(
                "hotKeyFraction ({}) must not exceed hotTrafficFraction ({})",
                self.hot_key_fraction, self.hot_traffic_fraction
            ));
        }
        if self.ramp_sweep_count == 0 {
            return fail("rampSweepCount must be at least 1".into());
        }
        if self.ramp_up_concurrency && self.ramp_sweep_count != 2 {
            return fail(format!(
                "rampUpConcurrency only supports rampSweepCount == 2, got {}",
                self.ramp_sweep_count
            ));
        }
        if self.client_id >= self.client_count {
            return fail(format!(
                "clientId ({}) must be below clientCount ({})",
                self.client_id, self.client_count
            ));
        }
        if self.sample_size == 0 {
            return fail("sampleSize must be positive".into());
        }
        if self.enable_read_latency_logging && self.periodic_logging_interval.is_zero() {
            return fail("periodicLoggingInterval must be positive".into());
        }
        Ok(())
    }

    /// 单个 worker 的平均请求间隔，必须能表示为 `Duration`
    pub fn worker_delay(&self) -> Result<Duration> {
        let secs = self.actor_count as f64 / self.transactions_per_second;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            AppError::Config(format!(
                "transactionsPerSecond {} is too low for {} workers",
                self.transactions_per_second, self.actor_count
            ))
        })
    }

    /// 热点流量中需要强制落到热点键上的概率
    ///
    /// 冷键概率 `(1 - p) * (1 - hkf)` 应等于 `1 - htf`，解出 p。
    pub fn force_hot_probability(&self) -> f64 {
        if self.hot_key_fraction <= 0.0 || self.hot_key_fraction >= 1.0 {
            return 0.0;
        }
        (self.hot_traffic_fraction - self.hot_key_fraction) / (1.0 - self.hot_key_fraction)
    }

    /// 实际键长（包含节点前缀）
    pub fn key_len(&self) -> usize {
        if self.node_prefix.is_some() {
            self.key_bytes + INDEX_HEX_DIGITS
        } else {
            self.key_bytes
        }
    }

    pub fn reads_for(&self, a_transaction: bool) -> usize {
        if a_transaction {
            self.reads_per_transaction_a
        } else {
            self.reads_per_transaction_b
        }
    }

    pub fn writes_for(&self, a_transaction: bool) -> usize {
        if a_transaction {
            self.writes_per_transaction_a
        } else {
            self.writes_per_transaction_b
        }
    }

    /// 平均每行的字节数，用于估算吞吐字节
    pub fn mean_row_bytes(&self) -> f64 {
        self.key_len() as f64 + (self.min_value_bytes + self.max_value_bytes) as f64 * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_empty_options() {
        let config = WorkloadConfig::from_options(&Options::new()).unwrap();
        assert_eq!(config.test_duration, Duration::from_secs(10));
        assert_eq!(config.reads_per_transaction_a, 10);
        assert_eq!(config.writes_per_transaction_b, 9);
        assert_eq!(config.actor_count, 1250);
        assert_eq!(config.metrics_duration, config.test_duration);
        assert!(config.discard_edge_measurements);
        assert!(config.cancel_workers_at_duration);
        assert_eq!(config.force_hot_probability(), 0.0);
    }

    #[test]
    fn rate_is_split_across_clients() {
        let options = Options::new()
            .with("transactionsPerSecond", 1000.0)
            .with("clientCount", 4)
            .with("clientId", 3);
        let config = WorkloadConfig::from_options(&options).unwrap();
        assert_eq!(config.transactions_per_second, 250.0);
        assert_eq!(config.actor_count, 63);
        assert_eq!(
            config.worker_delay().unwrap(),
            Duration::from_secs_f64(63.0 / 250.0)
        );
    }

    #[test]
    fn hot_fraction_bounds_are_enforced() {
        let options = Options::new()
            .with("hotKeyFraction", 0.5)
            .with("hotTrafficFraction", 0.2);
        assert!(matches!(
            WorkloadConfig::from_options(&options),
            Err(AppError::Config(_))
        ));

        let options = Options::new().with("hotTrafficFraction", 1.5);
        assert!(WorkloadConfig::from_options(&options).is_err());
    }

    #[test]
    fn concurrency_ramp_requires_two_sweeps() {
        let options = Options::new().with("rampUpConcurrency", true);
        assert!(WorkloadConfig::from_options(&options).is_err());

        let options = options.with("rampSweepCount", 2);
        assert!(WorkloadConfig::from_options(&options).is_ok());
    }

    #[test]
    fn oversized_counts_are_not_truncated() {
        let options = Options::new()
            .with("rampUpConcurrency", true)
            .with("rampSweepCount", (1u64 << 32) + 2);
        let err = WorkloadConfig::from_options(&options).unwrap_err();
        assert!(err.to_string().contains("rampSweepCount"), "{}", err);

        let options = Options::new().with("rampSweepCount", u64::from(u32::MAX) + 1);
        assert!(WorkloadConfig::from_options(&options).is_err());
    }

    #[test]
    fn unrepresentable_worker_delay_is_rejected() {
        let options = Options::new()
            .with("transactionsPerSecond", 1e-18)
            .with("actorCountPerTester", 100);
        let err = WorkloadConfig::from_options(&options).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("too low"), "{}", err);
    }

    #[test]
    fn force_hot_probability_solves_for_traffic_share() {
        let options = Options::new()
            .with("hotKeyFraction", 0.1)
            .with("hotTrafficFraction", 0.5);
        let config = WorkloadConfig::from_options(&options).unwrap();
        let p = config.force_hot_probability();
        assert!((p - 0.4 / 0.9).abs() < 1e-12);
        // 冷键概率应为 1 - htf
        assert!(((1.0 - p) * 0.9 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn wrong_types_are_rejected_and_unknown_ignored() {
        let options = Options::new()
            .with("alpha", "high")
            .with("someOtherWorkloadOption", 3);
        let err = WorkloadConfig::from_options(&options).unwrap_err();
        assert!(err.to_string().contains("alpha"));

        let options = Options::new().with("someOtherWorkloadOption", 3);
        assert!(WorkloadConfig::from_options(&options).is_ok());
    }

    #[test]
    fn options_deserialize_from_json() {
        let options: Options = serde_json::from_str(
            r#"{"testDuration": 2.5, "nodeCount": 500, "rangeReads": true, "seed": 7}"#,
        )
        .unwrap();
        let config = WorkloadConfig::from_options(&options).unwrap();
        assert_eq!(config.test_duration, Duration::from_millis(2500));
        assert_eq!(config.node_count, 500);
        assert!(config.range_reads);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn node_prefix_extends_key() {
        let options = Options::new().with("nodePrefix", 3);
        let config = WorkloadConfig::from_options(&options).unwrap();
        assert_eq!(config.key_len(), 32);
        assert_eq!(config.mean_row_bytes(), 32.0 + 96.0);
    }
}
