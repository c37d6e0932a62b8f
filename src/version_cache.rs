//! 共享读版本缓存
//! inconsistentReads 模式下所有 worker 共用一个可能略旧的读版本

use crate::error::StoreResult;
use crate::store::{Database, Transaction, Version};
use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Shared};
use std::cell::RefCell;

type Refresh = Shared<LocalBoxFuture<'static, StoreResult<Version>>>;

#[derive(Default)]
struct CacheState {
    last: Option<Version>,
    refresh: Option<Refresh>,
    refreshes: u64,
}

/// 有界陈旧的读版本缓存
///
/// 同一时刻最多只有一个刷新在进行。刷新进行中时请求直接拿到上一次缓存的版本，
/// 只有还没有任何缓存版本时才会等待刷新完成。
/// 刷新由运行时上的独立任务驱动，缓存本身只属于一个运行时线程。
pub struct SharedVersionCache<D> {
    db: D,
    state: RefCell<CacheState>,
}

impl<D> SharedVersionCache<D>
where
    D: Database + Clone + 'static,
    D::Transaction: 'static,
{
    pub fn new(db: D) -> Self {
        Self {
            db,
            state: RefCell::new(CacheState::default()),
        }
    }

    /// 已发起的刷新次数
    pub fn refreshes(&self) -> u64 {
        self.state.borrow().refreshes
    }

    pub async fn read_version(&self) -> StoreResult<Version> {
        let pending = {
            let mut state = self.state.borrow_mut();
            let completed = state.refresh.as_ref().map(|r| r.peek().cloned());
            let start_refresh = match completed {
                None => true,
                Some(None) => false,
                Some(Some(Ok(version))) => {
                    state.last = Some(state.last.map_or(version, |last| last.max(version)));
                    true
                }
                Some(Some(Err(_))) => true,
            };
            let refresh = match state.refresh.clone() {
                Some(refresh) if !start_refresh => refresh,
                _ => {
                    let refresh = fetch_read_version(self.db.clone()).boxed_local().shared();
                    compio::runtime::spawn(refresh.clone()).detach();
                    state.refresh = Some(refresh.clone());
                    state.refreshes += 1;
                    refresh
                }
            };
            if let Some(version) = state.last {
                return Ok(version);
            }
            refresh
        };
        pending.await
    }
}

async fn fetch_read_version<D: Database>(db: D) -> StoreResult<Version> {
    let mut tr = db.create_transaction();
    loop {
        match tr.get_read_version().await {
            Ok(version) => return Ok(version),
            Err(e) => tr.on_error(e).await?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryDatabase, MemoryOptions};
    use futures_util::future::join_all;
    use std::time::Duration;

    fn slow_db() -> MemoryDatabase {
        MemoryDatabase::with_options(MemoryOptions {
            min_latency: Duration::from_millis(5),
            max_latency: Duration::from_millis(5),
            ..MemoryOptions::default()
        })
    }

    #[compio::test]
    async fn first_callers_share_one_refresh() {
        let db = slow_db();
        let cache = SharedVersionCache::new(db.clone());
        let versions = join_all((0..50).map(|_| cache.read_version())).await;
        assert!(versions.iter().all(|v| *v == Ok(0)));
        assert_eq!(cache.refreshes(), 1);
        assert_eq!(db.read_version_requests(), 1);
    }

    #[compio::test]
    async fn stale_version_is_served_during_refresh() {
        let db = slow_db();
        let cache = SharedVersionCache::new(db.clone());
        assert_eq!(cache.read_version().await, Ok(0));

        let mut tr = db.create_transaction();
        tr.set(b"k", b"v");
        tr.commit().await.unwrap();
        assert_eq!(db.version(), 1);

        // 上一次刷新已完成：缓存 0 并发起新的刷新
        assert_eq!(cache.read_version().await, Ok(0));
        assert_eq!(cache.refreshes(), 2);
        // 刷新进行中，不会再发起
        assert_eq!(cache.read_version().await, Ok(0));
        assert_eq!(cache.refreshes(), 2);

        compio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.read_version().await, Ok(1));
        assert_eq!(cache.refreshes(), 3);
    }
}
