//! 负载爬坡模块
//! 根据测试已运行时间计算三角波形的 alpha，以及并发爬坡时每个 worker 的启停时刻

use std::time::Duration;

/// 三角波爬坡控制器，纯函数
#[derive(Debug, Clone, Copy)]
pub struct RampController {
    test_duration: Duration,
    sweep_count: u32,
}

impl RampController {
    pub fn new(test_duration: Duration, sweep_count: u32) -> Self {
        Self {
            test_duration,
            sweep_count: sweep_count.max(1),
        }
    }

    /// 一个上升或下降段的时长
    pub fn sweep_duration(&self) -> Duration {
        self.test_duration / self.sweep_count
    }

    /// 偶数段线性上升，奇数段线性下降，取值 `[0, 1]`
    pub fn alpha(&self, elapsed: Duration) -> f64 {
        let sweep = self.sweep_duration().as_secs_f64();
        if sweep <= 0.0 {
            return 0.0;
        }
        let position = elapsed.as_secs_f64() / sweep;
        let current_sweep = position.floor();
        let fractional = position - current_sweep;
        let alpha = if current_sweep as u64 % 2 == 1 {
            1.0 - fractional
        } else {
            fractional
        };
        alpha.clamp(0.0, 1.0)
    }

    /// 并发爬坡：第 `worker` 个 worker 的活跃区间
    ///
    /// `f = k/W + pid/(P*W)`，在 `T/2 * f` 启动，在 `T/2 * (2 - f)` 停止。
    pub fn worker_window(
        &self,
        worker: usize,
        worker_count: usize,
        client_id: usize,
        client_count: usize,
    ) -> WorkerWindow {
        let workers = worker_count.max(1) as f64;
        let clients = client_count.max(1) as f64;
        let f = worker as f64 / workers + client_id as f64 / (clients * workers);
        let half = self.test_duration.as_secs_f64() / 2.0;
        WorkerWindow {
            start: Duration::from_secs_f64(half * f),
            stop: Duration::from_secs_f64(half * (2.0 - f)),
        }
    }
}

/// 单个 worker 在并发爬坡下的活跃区间，相对 worker 启动时刻
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerWindow {
    pub start: Duration,
    pub stop: Duration,
}

impl WorkerWindow {
    pub fn is_active(&self, elapsed: Duration) -> bool {
        elapsed >= self.start && elapsed < self.stop
    }
}
