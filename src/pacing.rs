//! 请求节奏模块
//! 泊松过程：上次触发时刻加上指数分布的间隔，长期速率收敛到目标值

use crate::config::messages;
use crate::error::{AppError, Result};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// 单个 worker 的泊松节奏器
#[derive(Debug, Clone)]
pub struct Pacer {
    last: Instant,
    interval: Option<Exp<f64>>,
}

impl Pacer {
    /// `mean_interval` 为零时不等待
    pub fn new(start: Instant, mean_interval: Duration) -> Result<Self> {
        let interval = if mean_interval.is_zero() {
            None
        } else {
            let rate = 1.0 / mean_interval.as_secs_f64();
            Some(Exp::new(rate).map_err(|e| {
                AppError::Distribution(format!("{}: {}", messages::PACER_CREATE_FAILED, e))
            })?)
        };
        Ok(Self {
            last: start,
            interval,
        })
    }

    /// 推进到下一次触发时刻；落后时不补睡，直接追赶
    ///
    /// 间隔无法表示为 `Instant` 时返回 `None`，此时节奏器不再前进。
    pub fn next_fire<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Instant> {
        if let Some(exp) = &self.interval {
            let gap = Duration::try_from_secs_f64(exp.sample(rng)).ok()?;
            self.last = self.last.checked_add(gap)?;
        }
        Some(self.last)
    }

    /// 落后于计划时也让出一次，单线程运行时上的其它任务才能推进
    pub async fn wait<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        match self.next_fire(rng) {
            Some(fire) if fire > Instant::now() => compio::time::sleep_until(fire).await,
            Some(_) => YieldNow(false).await,
            None => std::future::pending::<()>().await,
        }
    }
}

struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
