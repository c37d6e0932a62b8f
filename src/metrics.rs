//! 指标聚合模块
//! 共享计数器、各延迟类别的蓄水池、记录窗口以及周期快照

use crate::config::WorkloadConfig;
use crate::report::PerfMetric;
use crate::reservoir::{LatencySummary, SharedReservoir};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// 延迟类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatencyClass {
    /// 整个事务（含重试）
    Total,
    /// 单次读取
    RowRead,
    /// 一个事务的全部读取
    FullRead,
    /// 获取读版本
    ReadVersion,
    Commit,
}

impl LatencyClass {
    pub const ALL: [LatencyClass; 5] = [
        LatencyClass::Total,
        LatencyClass::RowRead,
        LatencyClass::FullRead,
        LatencyClass::ReadVersion,
        LatencyClass::Commit,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// 报告中使用的名称
    pub fn label(self) -> &'static str {
        match self {
            LatencyClass::Total => "Latency",
            LatencyClass::RowRead => "Row Read Latency",
            LatencyClass::FullRead => "Total Read Latency",
            LatencyClass::ReadVersion => "GRV Latency",
            LatencyClass::Commit => "Commit Latency",
        }
    }

    /// 周期日志中的事件名
    pub fn event(self) -> &'static str {
        match self {
            LatencyClass::Total => "RW_TotalLatency",
            LatencyClass::RowRead => "RW_RowReadLatency",
            LatencyClass::FullRead => "RW_FullReadLatency",
            LatencyClass::ReadVersion => "RW_GRVLatency",
            LatencyClass::Commit => "RW_CommitLatency",
        }
    }
}

/// 单调递增的共享计数器
#[derive(Debug, Default)]
pub struct RunningCounters {
    a_transactions: AtomicU64,
    b_transactions: AtomicU64,
    /// 记录窗口内的重试
    retries: AtomicU64,
    total_retries: AtomicU64,
    total_reads: AtomicU64,
}

impl RunningCounters {
    pub fn record_success(&self, a_transaction: bool) {
        let counter = if a_transaction {
            &self.a_transactions
        } else {
            &self.b_transactions
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self, in_window: bool) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
        if in_window {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_read(&self) {
        self.total_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            a_transactions: self.a_transactions.load(Ordering::Relaxed),
            b_transactions: self.b_transactions.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            total_reads: self.total_reads.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub a_transactions: u64,
    pub b_transactions: u64,
    pub retries: u64,
    pub total_retries: u64,
    pub total_reads: u64,
}

impl CounterSnapshot {
    pub fn transactions(&self) -> u64 {
        self.a_transactions + self.b_transactions
    }

    /// 成功事务对应的读行数
    pub fn reads(&self, config: &WorkloadConfig) -> u64 {
        self.a_transactions * config.reads_per_transaction_a as u64
            + self.b_transactions * config.reads_per_transaction_b as u64
    }

    pub fn writes(&self, config: &WorkloadConfig) -> u64 {
        self.a_transactions * config.writes_per_transaction_a as u64
            + self.b_transactions * config.writes_per_transaction_b as u64
    }

    pub fn operations(&self, config: &WorkloadConfig) -> u64 {
        self.reads(config) + self.writes(config)
    }
}

/// 引擎持有的全部可变聚合
#[derive(Debug)]
pub struct WorkloadMetrics {
    reservoirs: [SharedReservoir; 5],
    pub counters: RunningCounters,
    periodic: Mutex<Vec<PerfMetric>>,
}

impl WorkloadMetrics {
    pub fn new(sample_size: usize) -> Self {
        Self {
            reservoirs: std::array::from_fn(|_| SharedReservoir::new(sample_size)),
            counters: RunningCounters::default(),
            periodic: Mutex::new(Vec::new()),
        }
    }

    /// 记录一个以秒为单位的延迟样本
    #[inline]
    pub fn record(&self, class: LatencyClass, latency: Duration) {
        self.reservoirs[class.index()].add_sample(latency.as_secs_f64());
    }

    pub fn reservoir(&self, class: LatencyClass) -> &SharedReservoir {
        &self.reservoirs[class.index()]
    }

    pub fn summaries(&self) -> Vec<(LatencyClass, LatencySummary)> {
        LatencyClass::ALL
            .iter()
            .map(|c| (*c, self.reservoir(*c).summary()))
            .collect()
    }

    /// 取出所有类别的统计并清空蓄水池，计数器不受影响
    pub fn drain_summaries(&self) -> Vec<(LatencyClass, LatencySummary)> {
        LatencyClass::ALL
            .iter()
            .map(|c| (*c, self.reservoir(*c).drain()))
            .collect()
    }

    pub fn push_periodic(&self, metrics: impl IntoIterator<Item = PerfMetric>) {
        self.periodic.lock().extend(metrics);
    }

    pub fn periodic(&self) -> Vec<PerfMetric> {
        self.periodic.lock().clone()
    }
}

/// 样本记录窗口，相对客户端开始时刻
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsWindow {
    start: Duration,
    duration: Duration,
}

impl MetricsWindow {
    pub fn new(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }

    /// discardEdgeMeasurements 时只保留测试中间 3/4
    pub fn from_config(config: &WorkloadConfig) -> Self {
        let mut start = config.metrics_start;
        let mut duration = config.metrics_duration;
        if config.discard_edge_measurements {
            start += config.test_duration.mul_f64(0.125);
            duration = duration.mul_f64(0.75);
        }
        Self::new(start, duration)
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    #[inline]
    pub fn should_record(&self, elapsed: Duration) -> bool {
        elapsed >= self.start && elapsed < self.end()
    }

    /// 周期结算：写日志、清空蓄水池；区间首尾都在窗口内时返回快照
    pub fn drain(
        &self,
        metrics: &WorkloadMetrics,
        elapsed: Duration,
        interval: Duration,
        operations: u64,
        last_operations: u64,
    ) -> Option<WindowSnapshot> {
        let latencies = metrics.drain_summaries();
        for (class, s) in &latencies {
            info!(
                metric = class.event(),
                mean = s.mean,
                median = s.median,
                p5 = s.p5,
                p95 = s.p95,
                count = s.count,
                elapsed = elapsed.as_secs_f64(),
                "periodic latency"
            );
        }

        let record_begin = self.should_record(elapsed.saturating_sub(interval));
        let record_end = self.should_record(elapsed);
        if !(record_begin && record_end) {
            return None;
        }
        let secs = interval.as_secs_f64();
        Some(WindowSnapshot {
            elapsed,
            ops_per_sec: if secs > 0.0 {
                operations.saturating_sub(last_operations) as f64 / secs
            } else {
                0.0
            },
            latencies,
        })
    }
}

/// 一个周期的统计快照
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub elapsed: Duration,
    pub ops_per_sec: f64,
    pub latencies: Vec<(LatencyClass, LatencySummary)>,
}

impl WindowSnapshot {
    /// 名称带 `T=0005s:` 形式的时间前缀
    pub fn to_perf_metrics(&self) -> Vec<PerfMetric> {
        let ts = format!("T={:04.0}s:", self.elapsed.as_secs_f64());
        let mut out = vec![PerfMetric::new(
            format!("{}Operations/sec", ts),
            self.ops_per_sec,
            false,
        )];
        for (class, s) in &self.latencies {
            let label = class.label();
            out.push(PerfMetric::ms(format!("{}Mean {} (ms)", ts, label), s.mean));
            out.push(PerfMetric::ms(
                format!("{}Median {} (ms, averaged)", ts, label),
                s.median,
            ));
            out.push(PerfMetric::ms(format!("{}5% {} (ms, averaged)", ts, label), s.p5));
            out.push(PerfMetric::ms(format!("{}95% {} (ms, averaged)", ts, label), s.p95));
            out.push(PerfMetric::ms(format!("{}Max {} (ms, averaged)", ts, label), s.max));
        }
        out
    }
}
