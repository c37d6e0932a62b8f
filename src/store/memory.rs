//! 进程内存储
//! 带乐观冲突检测的简单键值存储，供测试和基准使用

use super::{Database, Key, KeyRange, KeyValue, Transaction, Value, Version};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use rand::prelude::*;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 内存存储的行为参数
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// 每次操作的模拟延迟范围
    pub min_latency: Duration,
    pub max_latency: Duration,
    /// 冲突检测保留的提交记录数，更旧的读版本会得到 TransactionTooOld
    pub history_limit: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            history_limit: 10_000,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Default)]
struct StoreState {
    data: BTreeMap<Key, Value>,
    version: Version,
    /// 被淘汰的最新提交版本，比它更旧的读版本无法校验
    horizon: Version,
    history: VecDeque<(Version, Vec<KeyRange>)>,
}

#[derive(Default)]
struct Faults {
    commits: VecDeque<StoreError>,
    reads: VecDeque<StoreError>,
}

struct Shared {
    state: Mutex<StoreState>,
    faults: Mutex<Faults>,
    options: MemoryOptions,
    commits: AtomicU64,
    conflicts: AtomicU64,
    read_version_requests: AtomicU64,
}

/// 内存存储句柄，克隆后共享同一份数据
#[derive(Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_options(MemoryOptions::default())
    }

    pub fn with_options(options: MemoryOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState::default()),
                faults: Mutex::new(Faults::default()),
                options,
                commits: AtomicU64::new(0),
                conflicts: AtomicU64::new(0),
                read_version_requests: AtomicU64::new(0),
            }),
        }
    }

    /// 直接写入，不经过事务
    pub fn insert(&self, key: Key, value: Value) {
        self.shared.state.lock().data.insert(key, value);
    }

    pub fn read(&self, key: &[u8]) -> Option<Value> {
        self.shared.state.lock().data.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> Version {
        self.shared.state.lock().version
    }

    /// 接下来的提交依次返回这些错误
    pub fn fail_next_commits(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.shared.faults.lock().commits.extend(errors);
    }

    /// 接下来的读取依次返回这些错误
    pub fn fail_next_reads(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.shared.faults.lock().reads.extend(errors);
    }

    pub fn commits(&self) -> u64 {
        self.shared.commits.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.shared.conflicts.load(Ordering::Relaxed)
    }

    pub fn read_version_requests(&self) -> u64 {
        self.shared.read_version_requests.load(Ordering::Relaxed)
    }

    fn current_version(&self) -> Version {
        self.shared.read_version_requests.fetch_add(1, Ordering::Relaxed);
        self.shared.state.lock().version
    }

    fn next_read_fault(&self) -> Option<StoreError> {
        self.shared.faults.lock().reads.pop_front()
    }

    fn next_commit_fault(&self) -> Option<StoreError> {
        self.shared.faults.lock().commits.pop_front()
    }
}

impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;

    fn create_transaction(&self) -> MemoryTransaction {
        MemoryTransaction {
            backoff: self.shared.options.initial_backoff,
            db: self.clone(),
            read_version: Cell::new(None),
            reads: RefCell::new(Vec::new()),
            read_conflicts: Vec::new(),
            write_conflicts: Vec::new(),
            writes: BTreeMap::new(),
            debug_id: None,
        }
    }
}

/// 模拟后端延迟
async fn simulate_backend_latency(options: &MemoryOptions) {
    if options.max_latency.is_zero() {
        return;
    }
    let min = options.min_latency.as_nanos() as u64;
    let max = (options.max_latency.as_nanos() as u64).max(min);
    let delay_ns = rand::rng().random_range(min..=max);
    compio::time::sleep(Duration::from_nanos(delay_ns)).await;
}

/// 内存存储上的事务
pub struct MemoryTransaction {
    db: MemoryDatabase,
    read_version: Cell<Option<Version>>,
    reads: RefCell<Vec<KeyRange>>,
    read_conflicts: Vec<KeyRange>,
    write_conflicts: Vec<KeyRange>,
    writes: BTreeMap<Key, Value>,
    backoff: Duration,
    debug_id: Option<u128>,
}

impl MemoryTransaction {
    pub fn debug_id(&self) -> Option<u128> {
        self.debug_id
    }

    /// 第一次读取时隐式获取读版本
    fn snapshot_version(&self) -> StoreResult<Version> {
        let version = match self.read_version.get() {
            Some(v) => v,
            None => {
                let v = self.db.current_version();
                self.read_version.set(Some(v));
                v
            }
        };
        if version < self.db.shared.state.lock().horizon {
            return Err(StoreError::TransactionTooOld);
        }
        Ok(version)
    }

    fn reset(&mut self) {
        self.read_version.set(None);
        self.reads.get_mut().clear();
        self.read_conflicts.clear();
        self.write_conflicts.clear();
        self.writes.clear();
    }

    fn try_commit(&mut self) -> StoreResult<()> {
        if self.writes.is_empty() && self.write_conflicts.is_empty() {
            return Ok(());
        }
        let read_version = self.snapshot_version()?;
        let options = &self.db.shared.options;
        let mut state = self.db.shared.state.lock();
        if read_version < state.horizon {
            return Err(StoreError::TransactionTooOld);
        }

        let reads = self.reads.get_mut();
        let conflicted = state
            .history
            .iter()
            .filter(|(version, _)| *version > read_version)
            .flat_map(|(_, written)| written.iter())
            .any(|w| {
                reads.iter().any(|r| r.intersects(w))
                    || self.read_conflicts.iter().any(|r| r.intersects(w))
            });
        if conflicted {
            self.db.shared.conflicts.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::NotCommitted);
        }

        let mut written: Vec<KeyRange> = self
            .writes
            .keys()
            .map(|k| KeyRange::single_key(k))
            .collect();
        written.append(&mut self.write_conflicts);
        for (key, value) in std::mem::take(&mut self.writes) {
            state.data.insert(key, value);
        }
        state.version += 1;
        let version = state.version;
        state.history.push_back((version, written));
        while state.history.len() > options.history_limit {
            if let Some((evicted, _)) = state.history.pop_front() {
                state.horizon = evicted;
            }
        }
        self.db.shared.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    async fn get_read_version(&mut self) -> StoreResult<Version> {
        simulate_backend_latency(&self.db.shared.options).await;
        if let Some(v) = self.read_version.get() {
            return Ok(v);
        }
        let v = self.db.current_version();
        self.read_version.set(Some(v));
        Ok(v)
    }

    fn set_version(&mut self, version: Version) {
        self.read_version.set(Some(version));
    }

    async fn get(&self, key: &[u8]) -> StoreResult<Option<Value>> {
        simulate_backend_latency(&self.db.shared.options).await;
        if let Some(err) = self.db.next_read_fault() {
            return Err(err);
        }
        self.snapshot_version()?;
        self.reads.borrow_mut().push(KeyRange::single_key(key));
        Ok(self.db.read(key))
    }

    async fn get_range(&self, range: &KeyRange, limit: usize) -> StoreResult<Vec<KeyValue>> {
        simulate_backend_latency(&self.db.shared.options).await;
        if let Some(err) = self.db.next_read_fault() {
            return Err(err);
        }
        self.snapshot_version()?;
        self.reads.borrow_mut().push(range.clone());
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.db.shared.state.lock();
        Ok(state
            .data
            .range(range.begin.clone()..range.end.clone())
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), value.to_vec());
    }

    fn add_read_conflict_range(&mut self, range: KeyRange) {
        self.read_conflicts.push(range);
    }

    fn add_write_conflict_range(&mut self, range: KeyRange) {
        self.write_conflicts.push(range);
    }

    async fn commit(&mut self) -> StoreResult<()> {
        simulate_backend_latency(&self.db.shared.options).await;
        if let Some(err) = self.db.next_commit_fault() {
            return Err(err);
        }
        self.try_commit()
    }

    async fn on_error(&mut self, error: StoreError) -> StoreResult<()> {
        if !error.is_retryable() {
            return Err(error);
        }
        compio::time::sleep(self.backoff).await;
        self.backoff = (self.backoff * 2).min(self.db.shared.options.max_backoff);
        self.reset();
        Ok(())
    }

    fn debug_transaction(&mut self, debug_id: u128) {
        self.debug_id = Some(debug_id);
    }
}
