//! 存储接口模块
//! 负载引擎只通过这里的事务接口与外部键值存储交互

pub mod memory;
pub mod ryw;

use crate::error::{StoreError, StoreResult};
use std::future::Future;

pub use memory::{MemoryDatabase, MemoryOptions, MemoryTransaction};
pub use ryw::ReadYourWrites;

pub type Key = Vec<u8>;
pub type Value = Vec<u8>;
pub type KeyValue = (Key, Value);

/// 快照版本号
pub type Version = u64;

/// 半开区间 `[begin, end)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyRange {
    pub begin: Key,
    pub end: Key,
}

impl KeyRange {
    pub fn new(begin: Key, end: Key) -> Self {
        Self { begin, end }
    }

    /// 只包含一个键的区间
    pub fn single_key(key: &[u8]) -> Self {
        let mut end = Vec::with_capacity(key.len() + 1);
        end.extend_from_slice(key);
        end.push(0);
        Self {
            begin: key.to_vec(),
            end,
        }
    }

    /// 以 `key` 为前缀的所有键
    pub fn prefix(key: &[u8]) -> Self {
        match strinc(key) {
            Some(end) => Self {
                begin: key.to_vec(),
                end,
            },
            None => Self::single_key(key),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.begin.as_slice() <= key && key < self.end.as_slice()
    }

    pub fn intersects(&self, other: &KeyRange) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

/// 大于所有以 `key` 为前缀的键的最小键；全是 0xff 时返回 None
pub fn strinc(key: &[u8]) -> Option<Key> {
    let last = key.iter().rposition(|b| *b != 0xff)?;
    let mut out = key[..=last].to_vec();
    out[last] += 1;
    Some(out)
}

/// 单个事务的操作接口
///
/// 所有可能挂起的操作都返回 future。`on_error` 实现存储自己的退避重试约定：
/// 可重试的错误在等待后返回 `Ok(())` 并把事务重置为初始状态，
/// 不可重试的错误原样返回。
pub trait Transaction {
    fn get_read_version(&mut self) -> impl Future<Output = StoreResult<Version>>;

    fn set_version(&mut self, version: Version);

    fn get(&self, key: &[u8]) -> impl Future<Output = StoreResult<Option<Value>>>;

    fn get_range(
        &self,
        range: &KeyRange,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<KeyValue>>>;

    fn set(&mut self, key: &[u8], value: &[u8]);

    fn add_read_conflict_range(&mut self, range: KeyRange);

    fn add_write_conflict_range(&mut self, range: KeyRange);

    fn commit(&mut self) -> impl Future<Output = StoreResult<()>>;

    fn on_error(&mut self, error: StoreError) -> impl Future<Output = StoreResult<()>>;

    /// 为外部逐步追踪打标记，默认忽略
    fn debug_transaction(&mut self, _debug_id: u128) {}
}

/// 可以创建事务的存储句柄
pub trait Database {
    type Transaction: Transaction;

    fn create_transaction(&self) -> Self::Transaction;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strinc_skips_trailing_ff() {
        assert_eq!(strinc(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(strinc(&[0x01, 0xff, 0xff]), Some(vec![0x02]));
        assert_eq!(strinc(&[0xff, 0xff]), None);
    }

    #[test]
    fn ranges() {
        let single = KeyRange::single_key(b"k");
        assert!(single.contains(b"k"));
        assert!(!single.contains(b"k\x00"));
        let prefix = KeyRange::prefix(b"k");
        assert!(prefix.contains(b"k\x00"));
        assert!(prefix.contains(b"kzz"));
        assert!(!prefix.contains(b"l"));
        assert!(single.intersects(&prefix));
        assert!(!single.intersects(&KeyRange::single_key(b"j")));
        assert!(KeyRange::new(b"b".to_vec(), b"a".to_vec()).is_empty());
    }
}
