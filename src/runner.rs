//! 事务执行模块
//! 每个 worker 的循环：节奏控制、构造事务、执行、冲突重试、记录延迟

use crate::config::RANGE_READ_LIMIT;
use crate::error::{AppError, Result, StoreResult};
use crate::metrics::LatencyClass;
use crate::pacing::Pacer;
use crate::store::{Database, Key, KeyRange, Transaction, Value};
use crate::workload::Workload;
use futures_util::future::try_join_all;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::cell::Cell;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 一次事务尝试，归构造它的 worker 独占
#[derive(Debug, Clone)]
pub struct TransactionAttempt {
    pub a_transaction: bool,
    pub read_indices: Vec<u64>,
    pub writes: Vec<(Key, Value)>,
    pub extra_read_ranges: Vec<KeyRange>,
    pub extra_write_ranges: Vec<KeyRange>,
    pub start: Instant,
    pub retries: u32,
    pub debug_id: Option<u128>,
}

#[derive(Debug, Default)]
struct AttemptTimings {
    read_version: Duration,
    commit: Option<Duration>,
}

/// 单个 worker
pub struct TransactionRunner<'a, D> {
    workload: &'a Workload<D>,
    index: usize,
    /// 客户端开始时刻，记录窗口和调试窗口都相对它
    begin: Instant,
    /// worker 启动时刻，爬坡相对它
    started: Instant,
    stop: &'a Cell<bool>,
    rng: ChaCha8Rng,
}

impl<'a, D> TransactionRunner<'a, D>
where
    D: Database + Clone + 'static,
    D::Transaction: 'static,
{
    pub fn new(
        workload: &'a Workload<D>,
        index: usize,
        begin: Instant,
        stop: &'a Cell<bool>,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(index as u64);
        Self {
            workload,
            index,
            begin,
            started: Instant::now(),
            stop,
            rng,
        }
    }

    fn should_record(&self) -> bool {
        self.workload.window().should_record(self.begin.elapsed())
    }

    /// worker 主循环；`new_transaction` 决定使用哪种事务实现
    pub async fn run<T, F>(mut self, new_transaction: F) -> Result<()>
    where
        T: Transaction,
        F: Fn(&D) -> T,
    {
        let workload = self.workload;
        let config = workload.config();

        let window = config.ramp_up_concurrency.then(|| {
            workload.ramp().worker_window(
                self.index,
                config.actor_count,
                config.client_id,
                config.client_count,
            )
        });
        if let Some(window) = window {
            compio::time::sleep_until(self.started + window.start).await;
            info!(
                worker = self.index,
                client = config.client_id,
                active = self.index * config.client_count + config.client_id + 1,
                "worker starting"
            );
        }

        let mut pacer = Pacer::new(Instant::now(), config.worker_delay()?)?;
        loop {
            pacer.wait(&mut self.rng).await;
            if self.stop.get() {
                return Ok(());
            }

            let now = Instant::now();
            let elapsed = now.saturating_duration_since(self.started);
            if let Some(window) = window {
                if elapsed >= window.stop {
                    info!(
                        worker = self.index,
                        client = config.client_id,
                        active = self.index * config.client_count + config.client_id,
                        "worker stopping"
                    );
                    return Ok(());
                }
            }

            if config.ramp_up_load && self.rng.random::<f64>() >= workload.ramp().alpha(elapsed) {
                continue;
            }

            let attempt = self.build_attempt(now);
            self.execute(new_transaction(workload.database()), attempt)
                .await?;
        }
    }

    /// 按当前爬坡状态随机构造一个事务
    pub fn build_attempt(&mut self, now: Instant) -> TransactionAttempt {
        let workload = self.workload;
        let config = workload.config();
        let keyspace = workload.keyspace();

        let alpha = if config.ramp_transaction_type {
            workload
                .ramp()
                .alpha(now.saturating_duration_since(self.started))
        } else {
            config.alpha
        };
        let a_transaction = self.rng.random::<f64>() < alpha;
        let reads = config.reads_for(a_transaction);
        let writes = config.writes_for(a_transaction);
        let (extra_reads, extra_writes) = if writes > 0 {
            (
                config.extra_read_conflict_ranges,
                config.extra_write_conflict_ranges,
            )
        } else {
            (0, 0)
        };

        let read_indices = self.pick_indices(reads, config.adjacent_reads);
        let writes = self
            .pick_indices(writes, config.adjacent_writes)
            .into_iter()
            .map(|i| (keyspace.key_for_index(i, false), self.random_value()))
            .collect();
        let extra_read_ranges = (0..extra_reads).map(|_| self.unique_range()).collect();
        let extra_write_ranges = (0..extra_writes).map(|_| self.unique_range()).collect();

        let since_begin = now.saturating_duration_since(self.begin);
        let debug_id = (since_begin > config.debug_time
            && since_begin <= config.debug_time + config.debug_interval)
            .then(|| self.rng.random::<u128>());

        TransactionAttempt {
            a_transaction,
            read_indices,
            writes,
            extra_read_ranges,
            extra_write_ranges,
            start: now,
            retries: 0,
            debug_id,
        }
    }

    fn pick_indices(&mut self, count: usize, adjacent: bool) -> Vec<u64> {
        let keyspace = self.workload.keyspace();
        let n = keyspace.node_count();
        if adjacent {
            let first = keyspace.random_index(&mut self.rng, n.saturating_sub(count as u64));
            (0..count as u64).map(|op| (first + op).min(n - 1)).collect()
        } else {
            (0..count)
                .map(|_| keyspace.random_index(&mut self.rng, n))
                .collect()
        }
    }

    fn random_value(&mut self) -> Value {
        let config = self.workload.config();
        let len = self
            .rng
            .random_range(config.min_value_bytes..=config.max_value_bytes);
        vec![b'.'; len]
    }

    /// 全局唯一的单键区间，作为额外冲突区间
    fn unique_range(&mut self) -> KeyRange {
        let id = format!("{:032x}", self.rng.random::<u128>());
        KeyRange::single_key(id.as_bytes())
    }

    /// 执行事务直到成功；可重试错误经 `on_error` 退避后从获取读版本重新开始
    pub async fn execute<T: Transaction>(
        &self,
        mut tr: T,
        mut attempt: TransactionAttempt,
    ) -> Result<()> {
        let metrics = self.workload.metrics();

        if let Some(id) = attempt.debug_id {
            tr.debug_transaction(id);
            debug!(
                debug_id = %format!("{:032x}", id),
                location = "ReadWrite.randomReadWriteClient.Before",
                "transaction debug"
            );
        }

        let timings = loop {
            match self.attempt_once(&mut tr, &attempt).await {
                Ok(timings) => break timings,
                Err(error) => {
                    debug!(
                        worker = self.index,
                        code = error.code(),
                        %error,
                        retries = attempt.retries,
                        "transaction attempt failed"
                    );
                    if let Err(fatal) = tr.on_error(error).await {
                        warn!(worker = self.index, error = %fatal, "transaction failed");
                        return Err(AppError::Store(fatal));
                    }
                    attempt.retries += 1;
                    metrics.counters.record_retry(self.should_record());
                }
            }
        };

        if let Some(id) = attempt.debug_id {
            debug!(
                debug_id = %format!("{:032x}", id),
                location = "ReadWrite.randomReadWriteClient.After",
                "transaction debug"
            );
        }

        let latency = attempt.start.elapsed();
        trace!(
            worker = self.index,
            total_latency_ns = latency.as_nanos() as u64,
            start_latency_ns = timings.read_version.as_nanos() as u64,
            commit_latency_ns = timings.commit.map_or(-1, |c| c.as_nanos() as i64),
            retries = attempt.retries,
            "transaction succeeded"
        );

        if self.should_record() {
            metrics.counters.record_success(attempt.a_transaction);
            metrics.record(LatencyClass::Total, latency);
        }
        Ok(())
    }

    async fn attempt_once<T: Transaction>(
        &self,
        tr: &mut T,
        attempt: &TransactionAttempt,
    ) -> StoreResult<AttemptTimings> {
        let workload = self.workload;
        let config = workload.config();
        let metrics = workload.metrics();

        let grv_start = Instant::now();
        if config.inconsistent_reads {
            let version = workload.versions().read_version().await?;
            tr.set_version(version);
        } else {
            tr.get_read_version().await?;
        }
        let read_version = grv_start.elapsed();
        if self.should_record() {
            metrics.record(LatencyClass::ReadVersion, read_version);
        }

        let read_start = Instant::now();
        self.read_op(&*tr, &attempt.read_indices, self.should_record())
            .await?;
        if self.should_record() {
            metrics.record(LatencyClass::FullRead, read_start.elapsed());
        }

        if attempt.writes.is_empty() {
            return Ok(AttemptTimings {
                read_version,
                commit: None,
            });
        }

        for (key, value) in &attempt.writes {
            tr.set(key, value);
        }
        for range in &attempt.extra_read_ranges {
            tr.add_read_conflict_range(range.clone());
        }
        for range in &attempt.extra_write_ranges {
            tr.add_write_conflict_range(range.clone());
        }

        let commit_start = Instant::now();
        tr.commit().await?;
        let commit = commit_start.elapsed();
        if self.should_record() {
            metrics.record(LatencyClass::Commit, commit);
        }

        Ok(AttemptTimings {
            read_version,
            commit: Some(commit),
        })
    }

    /// 并行读取时任一失败即整体失败；依赖读取逐个串行
    async fn read_op<T: Transaction>(
        &self,
        tr: &T,
        indices: &[u64],
        record: bool,
    ) -> StoreResult<()> {
        if indices.is_empty() {
            return Ok(());
        }
        let keyspace = self.workload.keyspace();
        let keys: Vec<Key> = indices
            .iter()
            .map(|i| keyspace.key_for_index(*i, false))
            .collect();

        if self.workload.config().dependent_reads {
            for key in &keys {
                self.timed_read(tr, key, record).await?;
            }
        } else {
            try_join_all(keys.iter().map(|key| self.timed_read(tr, key, record))).await?;
        }
        Ok(())
    }

    async fn timed_read<T: Transaction>(
        &self,
        tr: &T,
        key: &[u8],
        record: bool,
    ) -> StoreResult<()> {
        let workload = self.workload;
        workload.metrics().counters.record_read();

        let start = Instant::now();
        if workload.config().range_reads {
            tr.get_range(&KeyRange::prefix(key), RANGE_READ_LIMIT)
                .await?;
        } else {
            tr.get(key).await?;
        }
        if record {
            workload
                .metrics()
                .record(LatencyClass::RowRead, start.elapsed());
        }
        Ok(())
    }
}

impl<D> std::fmt::Debug for TransactionRunner<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRunner")
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Options, WorkloadConfig};
    use crate::error::StoreError;
    use crate::store::{MemoryDatabase, ReadYourWrites};

    fn workload(db: &MemoryDatabase, options: Options) -> Workload<MemoryDatabase> {
        let options = options
            .with("discardEdgeMeasurements", false)
            .with("testDuration", 60.0)
            .with("nodeCount", 1000)
            .with("seed", 17);
        let config = WorkloadConfig::from_options(&options).unwrap();
        Workload::new(db.clone(), config).unwrap()
    }

    #[test]
    fn type_mix_follows_alpha() {
        let db = MemoryDatabase::new();
        let w = workload(&db, Options::new());
        let stop = Cell::new(false);
        let mut runner = TransactionRunner::new(&w, 0, Instant::now(), &stop, 1);

        let total = 20_000;
        let mut a = 0;
        for _ in 0..total {
            let attempt = runner.build_attempt(Instant::now());
            if attempt.a_transaction {
                a += 1;
                assert_eq!(attempt.read_indices.len(), 10);
                assert!(attempt.writes.is_empty());
            } else {
                assert_eq!(attempt.read_indices.len(), 1);
                assert_eq!(attempt.writes.len(), 9);
            }
            assert!(attempt.extra_read_ranges.is_empty());
            assert!(attempt.debug_id.is_none());
        }
        let share = a as f64 / total as f64;
        assert!((share - 0.1).abs() < 0.01, "A share {}", share);
    }

    #[test]
    fn adjacent_reads_and_writes_are_contiguous() {
        let db = MemoryDatabase::new();
        let w = workload(
            &db,
            Options::new()
                .with("adjacentReads", true)
                .with("adjacentWrites", true)
                .with("readsPerTransactionA", 5)
                .with("writesPerTransactionA", 4)
                .with("alpha", 1.0),
        );
        let stop = Cell::new(false);
        let mut runner = TransactionRunner::new(&w, 0, Instant::now(), &stop, 2);
        for _ in 0..200 {
            let attempt = runner.build_attempt(Instant::now());
            let first = attempt.read_indices[0];
            assert_eq!(attempt.read_indices, (first..first + 5).collect::<Vec<_>>());
            assert!(attempt.read_indices[4] < 1000);
            let keys: Vec<&Key> = attempt.writes.iter().map(|(k, _)| k).collect();
            assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn conflict_ranges_only_with_writes() {
        let db = MemoryDatabase::new();
        let w = workload(
            &db,
            Options::new()
                .with("extraReadConflictRangesPerTransaction", 2)
                .with("extraWriteConflictRangesPerTransaction", 3)
                .with("minValueBytes", 8)
                .with("valueBytes", 16),
        );
        let stop = Cell::new(false);
        let mut runner = TransactionRunner::new(&w, 0, Instant::now(), &stop, 3);
        for _ in 0..500 {
            let attempt = runner.build_attempt(Instant::now());
            if attempt.writes.is_empty() {
                assert!(attempt.extra_read_ranges.is_empty());
                assert!(attempt.extra_write_ranges.is_empty());
            } else {
                assert_eq!(attempt.extra_read_ranges.len(), 2);
                assert_eq!(attempt.extra_write_ranges.len(), 3);
                assert_ne!(attempt.extra_read_ranges[0], attempt.extra_read_ranges[1]);
                assert!(attempt
                    .writes
                    .iter()
                    .all(|(_, v)| (8..=16).contains(&v.len())));
            }
        }
    }

    #[test]
    fn debug_window_tags_attempts() {
        let db = MemoryDatabase::new();
        let w = workload(
            &db,
            Options::new()
                .with("debugTime", 1.0)
                .with("debugInterval", 2.0),
        );
        let stop = Cell::new(false);
        let begin = Instant::now();
        let mut runner = TransactionRunner::new(&w, 0, begin, &stop, 4);
        let at = |s: f64| begin + Duration::from_secs_f64(s);
        assert!(runner.build_attempt(at(0.5)).debug_id.is_none());
        assert!(runner.build_attempt(at(2.0)).debug_id.is_some());
        assert!(runner.build_attempt(at(3.5)).debug_id.is_none());
    }

    #[compio::test]
    async fn commit_conflict_is_retried_once() {
        let db = MemoryDatabase::new();
        let w = workload(&db, Options::new().with("alpha", 0.0));
        let stop = Cell::new(false);
        let mut runner = TransactionRunner::new(&w, 0, Instant::now(), &stop, 5);

        db.fail_next_commits([StoreError::NotCommitted]);
        let attempt = runner.build_attempt(Instant::now());
        assert!(!attempt.a_transaction);
        runner
            .execute(db.create_transaction(), attempt)
            .await
            .unwrap();

        let counters = w.metrics().counters.snapshot();
        assert_eq!(counters.retries, 1);
        assert_eq!(counters.b_transactions, 1);
        assert_eq!(counters.a_transactions, 0);
        assert_eq!(w.metrics().reservoir(LatencyClass::Commit).len(), 1);
        assert_eq!(w.metrics().reservoir(LatencyClass::Total).len(), 1);
        assert_eq!(db.commits(), 1);
    }

    #[compio::test]
    async fn failed_parallel_read_retries_whole_transaction() {
        let db = MemoryDatabase::new();
        let w = workload(&db, Options::new().with("alpha", 1.0));
        let stop = Cell::new(false);
        let mut runner = TransactionRunner::new(&w, 0, Instant::now(), &stop, 6);

        db.fail_next_reads([StoreError::TimedOut]);
        let attempt = runner.build_attempt(Instant::now());
        runner
            .execute(ReadYourWrites::new(db.create_transaction()), attempt)
            .await
            .unwrap();

        let metrics = w.metrics();
        assert_eq!(metrics.counters.snapshot().retries, 1);
        assert_eq!(metrics.counters.snapshot().a_transactions, 1);
        assert_eq!(metrics.reservoir(LatencyClass::FullRead).len(), 1);
        assert_eq!(metrics.reservoir(LatencyClass::ReadVersion).len(), 2);
        assert!(metrics.reservoir(LatencyClass::RowRead).len() >= 10);
        assert!(metrics.reservoir(LatencyClass::Commit).is_empty());
    }

    #[compio::test]
    async fn dependent_range_reads_succeed() {
        let db = MemoryDatabase::new();
        let w = workload(
            &db,
            Options::new()
                .with("alpha", 1.0)
                .with("dependentReads", true)
                .with("rangeReads", true),
        );
        for i in 0..1000 {
            db.insert(w.keyspace().key_for_index(i, false), b"v".to_vec());
        }
        let stop = Cell::new(false);
        let mut runner = TransactionRunner::new(&w, 0, Instant::now(), &stop, 7);
        let attempt = runner.build_attempt(Instant::now());
        runner
            .execute(db.create_transaction(), attempt)
            .await
            .unwrap();
        let counters = w.metrics().counters.snapshot();
        assert_eq!(counters.total_reads, 10);
        assert_eq!(w.metrics().reservoir(LatencyClass::RowRead).len(), 10);
    }

    #[compio::test]
    async fn fatal_errors_propagate() {
        let db = MemoryDatabase::new();
        let w = workload(&db, Options::new().with("alpha", 0.0));
        let stop = Cell::new(false);
        let mut runner = TransactionRunner::new(&w, 0, Instant::now(), &stop, 8);

        db.fail_next_commits([StoreError::Fatal("disk full".into())]);
        let attempt = runner.build_attempt(Instant::now());
        let err = runner
            .execute(db.create_transaction(), attempt)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::Fatal(_))));
        assert_eq!(w.metrics().counters.snapshot().transactions(), 0);
    }

    #[compio::test]
    async fn inconsistent_reads_use_the_shared_cache() {
        let db = MemoryDatabase::new();
        let w = workload(
            &db,
            Options::new().with("alpha", 0.0).with("inconsistentReads", true),
        );
        let stop = Cell::new(false);
        let mut runner = TransactionRunner::new(&w, 0, Instant::now(), &stop, 9);
        for _ in 0..3 {
            let attempt = runner.build_attempt(Instant::now());
            runner
                .execute(db.create_transaction(), attempt)
                .await
                .unwrap();
        }
        assert_eq!(w.metrics().counters.snapshot().b_transactions, 3);
        assert!(w.versions().refreshes() >= 1);
    }
}
