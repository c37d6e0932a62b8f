//! 读写事务负载生成库
//!
//! 这个项目在事务型键值存储上生成可配置的读写混合负载，
//! 并统计吞吐和各阶段延迟。
//!
//! 特性：
//! - 使用Compio异步运行时，单线程协作调度大量 worker
//! - 泊松到达的请求节奏
//! - 热点键和三角波爬坡（负载、事务类型、并发）
//! - 蓄水池采样的延迟分布
//! - 冲突重试和共享读版本缓存

pub mod config;
pub mod error;
pub mod keyspace;
pub mod metrics;
pub mod pacing;
pub mod ramp;
pub mod report;
pub mod reservoir;
pub mod runner;
pub mod store;
pub mod version_cache;
pub mod workload;

pub use config::{Options, WorkloadConfig};
pub use error::{AppError, Result, StoreError};
pub use report::{PerfMetric, RunReport};
pub use workload::Workload;
