//! 错误处理模块
//! 定义了负载引擎和存储接口的错误类型

use std::fmt;

/// 存储事务接口返回的错误
///
/// 大部分错误是可重试的，由 `Transaction::on_error` 等待退避后重试；
/// 只有 `Fatal` 会一路传播到调用方。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 提交时检测到读写冲突
    NotCommitted,
    /// 读版本已经过旧，无法再读取
    TransactionTooOld,
    /// 操作超时
    TimedOut,
    /// 存储暂时不可用
    Unavailable,
    /// 不可重试的错误
    Fatal(String),
}

impl StoreError {
    /// 错误码，仅用于日志
    pub fn code(&self) -> u32 {
        match self {
            StoreError::NotCommitted => 1020,
            StoreError::TransactionTooOld => 1007,
            StoreError::TimedOut => 1031,
            StoreError::Unavailable => 1037,
            StoreError::Fatal(_) => 4000,
        }
    }

    /// 是否可以通过 `on_error` 恢复
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::Fatal(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotCommitted => write!(f, "transaction not committed due to conflict"),
            StoreError::TransactionTooOld => write!(f, "transaction is too old to perform reads"),
            StoreError::TimedOut => write!(f, "operation timed out"),
            StoreError::Unavailable => write!(f, "store unavailable"),
            StoreError::Fatal(msg) => write!(f, "fatal store error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// 存储操作结果类型别名
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 应用主错误类型
#[derive(Debug, Clone)]
pub enum AppError {
    /// 配置不满足约束
    Config(String),
    /// 键空间映射不单调
    Keyspace(String),
    /// 随机分布创建错误
    Distribution(String),
    /// 不可重试的存储错误
    Store(StoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Keyspace(msg) => write!(f, "Keyspace error: {}", msg),
            AppError::Distribution(msg) => write!(f, "Distribution create error: {}", msg),
            AppError::Store(err) => write!(f, "Store error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Store(err) => Some(err),
            _ => None,
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

/// 错误上下文扩展trait
pub trait ErrorContext<T> {
    /// 添加上下文信息
    fn with_context(self, context: &str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn with_context(self, context: &str) -> Result<T> {
        self.map_err(|e| match e {
            AppError::Config(msg) => AppError::Config(format!("{}: {}", context, msg)),
            AppError::Keyspace(msg) => AppError::Keyspace(format!("{}: {}", context, msg)),
            AppError::Distribution(msg) => AppError::Distribution(format!("{}: {}", context, msg)),
            AppError::Store(StoreError::Fatal(msg)) => {
                AppError::Store(StoreError::Fatal(format!("{}: {}", context, msg)))
            }
            AppError::Store(err) => AppError::Store(err),
        })
    }
}
