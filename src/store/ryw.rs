//! 读自己写的事务包装
//! 在任意事务之上缓存本事务的写入和已读快照

use super::{Key, KeyRange, KeyValue, Transaction, Value, Version};
use crate::error::{StoreError, StoreResult};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// 读自己写（read-your-writes）事务
///
/// 读取先查本地写缓冲，再查已读快照缓存，最后才访问底层事务。
pub struct ReadYourWrites<T> {
    inner: T,
    writes: BTreeMap<Key, Value>,
    snapshot: RefCell<BTreeMap<Key, Option<Value>>>,
}

impl<T: Transaction> ReadYourWrites<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            writes: BTreeMap::new(),
            snapshot: RefCell::new(BTreeMap::new()),
        }
    }

    fn forget(&mut self) {
        self.writes.clear();
        self.snapshot.get_mut().clear();
    }
}

impl<T: Transaction> Transaction for ReadYourWrites<T> {
    async fn get_read_version(&mut self) -> StoreResult<Version> {
        self.inner.get_read_version().await
    }

    fn set_version(&mut self, version: Version) {
        self.inner.set_version(version);
    }

    async fn get(&self, key: &[u8]) -> StoreResult<Option<Value>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.clone()));
        }
        let cached = self.snapshot.borrow().get(key).cloned();
        if let Some(value) = cached {
            return Ok(value);
        }
        let value = self.inner.get(key).await?;
        self.snapshot.borrow_mut().insert(key.to_vec(), value.clone());
        Ok(value)
    }

    async fn get_range(&self, range: &KeyRange, limit: usize) -> StoreResult<Vec<KeyValue>> {
        let mut rows: BTreeMap<Key, Value> =
            self.inner.get_range(range, limit).await?.into_iter().collect();
        if !range.is_empty() {
            for (key, value) in self.writes.range(range.begin.clone()..range.end.clone()) {
                rows.insert(key.clone(), value.clone());
            }
        }
        Ok(rows.into_iter().take(limit).collect())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), value.to_vec());
        self.inner.set(key, value);
    }

    fn add_read_conflict_range(&mut self, range: KeyRange) {
        self.inner.add_read_conflict_range(range);
    }

    fn add_write_conflict_range(&mut self, range: KeyRange) {
        self.inner.add_write_conflict_range(range);
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn on_error(&mut self, error: StoreError) -> StoreResult<()> {
        self.inner.on_error(error).await?;
        self.forget();
        Ok(())
    }

    fn debug_transaction(&mut self, debug_id: u128) {
        self.inner.debug_transaction(debug_id);
    }
}
