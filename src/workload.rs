//! 负载引擎
//! 持有配置、键空间、指标和共享读版本缓存，驱动全部 worker 并产出报告

use crate::config::{Options, WorkloadConfig, messages};
use crate::error::{AppError, ErrorContext, Result};
use crate::keyspace::KeyspaceModel;
use crate::metrics::{MetricsWindow, WorkloadMetrics};
use crate::ramp::RampController;
use crate::report::RunReport;
use crate::runner::TransactionRunner;
use crate::store::{Database, ReadYourWrites, Transaction};
use crate::version_cache::SharedVersionCache;
use futures_util::future::{Either, select, try_join_all};
use std::cell::Cell;
use std::convert::Infallible;
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// 一个客户端上的读写负载
pub struct Workload<D> {
    db: D,
    config: WorkloadConfig,
    keyspace: KeyspaceModel,
    ramp: RampController,
    window: MetricsWindow,
    metrics: Arc<WorkloadMetrics>,
    versions: SharedVersionCache<D>,
    seed: u64,
}

impl<D> Workload<D>
where
    D: Database + Clone + 'static,
    D::Transaction: 'static,
{
    pub fn new(db: D, config: WorkloadConfig) -> Result<Self> {
        config.validate().with_context(messages::INVALID_OPTIONS)?;
        let keyspace =
            KeyspaceModel::new(&config).with_context(messages::KEYSPACE_CHECK_FAILED)?;
        let ramp = RampController::new(config.test_duration, config.ramp_sweep_count);
        let window = MetricsWindow::from_config(&config);
        let metrics = Arc::new(WorkloadMetrics::new(config.sample_size));
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(Self {
            versions: SharedVersionCache::new(db.clone()),
            db,
            config,
            keyspace,
            ramp,
            window,
            metrics,
            seed,
        })
    }

    pub fn from_options(db: D, options: &Options) -> Result<Self> {
        let config = WorkloadConfig::from_options(options).with_context(messages::INVALID_OPTIONS)?;
        Self::new(db, config)
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn keyspace(&self) -> &KeyspaceModel {
        &self.keyspace
    }

    pub fn ramp(&self) -> &RampController {
        &self.ramp
    }

    pub fn window(&self) -> &MetricsWindow {
        &self.window
    }

    pub fn metrics(&self) -> &Arc<WorkloadMetrics> {
        &self.metrics
    }

    pub fn versions(&self) -> &SharedVersionCache<D> {
        &self.versions
    }

    /// 第 `index` 个 worker
    pub fn runner<'a>(
        &'a self,
        index: usize,
        begin: Instant,
        stop: &'a Cell<bool>,
    ) -> TransactionRunner<'a, D> {
        TransactionRunner::new(self, index, begin, stop, self.seed)
    }

    /// 读一个随机键让连接就绪，然后等待剩余的稳定时间
    pub async fn warm_up(&self) -> Result<()> {
        let started = Instant::now();
        let index = self
            .keyspace
            .random_index(&mut rand::rng(), self.keyspace.node_count());
        let key = self.keyspace.key_for_index(index, false);

        let mut tr = self.db.create_transaction();
        loop {
            match tr.get(&key).await {
                Ok(_) => break,
                Err(e) => tr
                    .on_error(e)
                    .await
                    .map_err(AppError::Store)
                    .with_context(messages::WARMUP_FAILED)?,
            }
        }

        let settle = Duration::from_secs(1)
            .saturating_sub(started.elapsed())
            .max(Duration::from_millis(100));
        compio::time::sleep(settle).await;
        Ok(())
    }

    /// 运行到 testDuration 结束，返回最终报告
    pub async fn run(&self) -> Result<RunReport> {
        if self.config.warm_up {
            self.warm_up().await?;
        }

        let begin = Instant::now();
        let stop = Cell::new(false);
        info!(
            client = self.config.client_id,
            workers = self.config.actor_count,
            tps = self.config.transactions_per_second,
            duration = self.config.test_duration.as_secs_f64(),
            "workload starting"
        );

        let use_ryw = self.config.use_ryw;
        let workers = try_join_all((0..self.config.actor_count).map(|index| {
            let runner = self.runner(index, begin, &stop);
            async move {
                if use_ryw {
                    runner
                        .run(|db: &D| ReadYourWrites::new(db.create_transaction()))
                        .await
                } else {
                    runner.run(|db: &D| db.create_transaction()).await
                }
            }
        }));

        let driven = async {
            let workers = pin!(workers);
            let deadline = pin!(compio::time::sleep(self.config.test_duration));
            match select(workers, deadline).await {
                Either::Left((result, _)) => result.map(|_| ()),
                Either::Right((_, workers)) => {
                    if self.config.cancel_workers_at_duration {
                        return Ok(());
                    }
                    stop.set(true);
                    workers.await.map(|_| ())
                }
            }
        };

        let logger = async {
            if self.config.enable_read_latency_logging {
                self.log_periodically(begin).await
            } else {
                std::future::pending::<Infallible>().await
            }
        };

        let result = match select(pin!(driven), pin!(logger)).await {
            Either::Left((result, _)) => result,
            Either::Right((never, _)) => match never {},
        };
        result.with_context(messages::WORKER_FAILED)?;

        let elapsed = begin.elapsed();
        let mut measured_duration = self.window.duration();
        if elapsed < self.window.end() {
            measured_duration = elapsed.saturating_sub(self.window.start());
        }

        let counters = self.metrics.counters.snapshot();
        info!(
            client = self.config.client_id,
            a_transactions = counters.a_transactions,
            b_transactions = counters.b_transactions,
            retries = counters.retries,
            total_retries = counters.total_retries,
            measured = measured_duration.as_secs_f64(),
            "workload finished"
        );

        Ok(RunReport {
            measured_duration,
            counters,
            latencies: self.metrics.summaries(),
            periodic: self.metrics.periodic(),
        })
    }

    async fn log_periodically(&self, begin: Instant) -> Infallible {
        let interval = self.config.periodic_logging_interval;
        let mut elapsed = Duration::ZERO;
        let mut last_operations = 0;
        loop {
            elapsed += interval;
            compio::time::sleep_until(begin + elapsed).await;
            let operations = self.metrics.counters.snapshot().operations(&self.config);
            if let Some(snapshot) =
                self.window
                    .drain(&self.metrics, elapsed, interval, operations, last_operations)
            {
                self.metrics.push_periodic(snapshot.to_perf_metrics());
            }
            last_operations = operations;
        }
    }
}

impl<D> std::fmt::Debug for Workload<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workload")
            .field("config", &self.config)
            .field("window", &self.window)
            .finish()
    }
}
