//! 传输引擎核心
//!
//! - `range`: 区间切分与运行期分片队列
//! - `limiter`: 进程级共享限速器
//! - `backend`: 可插拔传输后端与进度持久化
//! - `task`: 单任务 actor、阶段状态机、worker 池
//! - `manager`: 全局执行器 actor（并发预算、整任务重试、失败收集）

pub mod backend;
pub mod error;
pub mod limiter;
pub mod manager;
pub mod range;
pub mod retry;
pub mod status;
pub mod task;

#[cfg(test)]
pub mod testkit;

pub use backend::{Backend, CancelFlag, JsonFileStateStore, MemoryStateStore, StateStore, TransferPlan};
pub use error::{ErrorKind, TransferError, TransferResult};
pub use limiter::RateLimiter;
pub use manager::TransferManagerActor;
pub use range::{ChunkingMode, InstanceState, Range, WorkQueue};
pub use retry::{RetryContext, RetryStrategy};
pub use status::{StatusSnapshot, TransferStatus};
pub use task::{TaskStatus, TransferPhase, TransferTaskActor};
