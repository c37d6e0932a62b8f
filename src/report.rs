//! 报告模块
//! 把运行结果整理成具名数值指标序列

use crate::config::WorkloadConfig;
use crate::metrics::{CounterSnapshot, LatencyClass};
use crate::reservoir::LatencySummary;
use serde::Serialize;
use std::time::Duration;

/// 单个具名指标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfMetric {
    pub name: String,
    pub value: f64,
    /// 多个客户端汇总时取平均而不是求和
    pub averaged: bool,
}

impl PerfMetric {
    pub fn new(name: impl Into<String>, value: f64, averaged: bool) -> Self {
        Self {
            name: name.into(),
            value,
            averaged,
        }
    }

    /// 秒转毫秒的延迟指标
    pub fn ms(name: impl Into<String>, secs: f64) -> Self {
        Self::new(name, secs * 1000.0, true)
    }
}

/// 一次运行的最终结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub measured_duration: Duration,
    pub counters: CounterSnapshot,
    pub latencies: Vec<(LatencyClass, LatencySummary)>,
    pub periodic: Vec<PerfMetric>,
}

impl RunReport {
    pub fn latency(&self, class: LatencyClass) -> LatencySummary {
        self.latencies
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    pub fn perf_metrics(&self, config: &WorkloadConfig) -> Vec<PerfMetric> {
        let duration = self.measured_duration.as_secs_f64();
        let per_sec = |v: f64| if duration > 0.0 { v / duration } else { 0.0 };
        let c = &self.counters;
        let reads = c.reads(config) as f64;
        let writes = c.writes(config) as f64;
        let row_bytes = config.mean_row_bytes();

        let mut m = vec![
            PerfMetric::new("Measured Duration", duration, true),
            PerfMetric::new("Transactions/sec", per_sec(c.transactions() as f64), false),
            PerfMetric::new("Operations/sec", per_sec(reads + writes), false),
            PerfMetric::new("A Transactions", c.a_transactions as f64, false),
            PerfMetric::new("B Transactions", c.b_transactions as f64, false),
            PerfMetric::new("Retries", c.retries as f64, false),
            PerfMetric::new("Read rows", reads, false),
            PerfMetric::new("Write rows", writes, false),
        ];

        // 负载爬坡时整体延迟没有意义，只看周期指标
        if !config.ramp_up_load {
            for (class, s) in &self.latencies {
                let label = class.label();
                m.push(PerfMetric::ms(format!("Mean {} (ms)", label), s.mean));
                m.push(PerfMetric::ms(format!("Median {} (ms, averaged)", label), s.median));
                m.push(PerfMetric::ms(format!("90% {} (ms, averaged)", label), s.p90));
                m.push(PerfMetric::ms(format!("98% {} (ms, averaged)", label), s.p98));
                m.push(PerfMetric::ms(format!("Max {} (ms, averaged)", label), s.max));
            }
        }

        m.push(PerfMetric::new("Read rows/sec", per_sec(reads), false));
        m.push(PerfMetric::new("Write rows/sec", per_sec(writes), false));
        m.push(PerfMetric::new("Bytes read/sec", per_sec(reads * row_bytes), false));
        m.push(PerfMetric::new("Bytes written/sec", per_sec(writes * row_bytes), false));
        m.extend(self.periodic.iter().cloned());
        m
    }
}
