//! `task` 模块包含与单个文件传输相关的所有逻辑
//!
//! 主要包括：
//! - `actor`: `TransferTaskActor` 的定义
//! - `state`: 任务状态与阶段状态机
//! - `messages`: Actor 之间传递的消息
//! - `handlers`: 消息处理器
//! - `controller`: 阶段状态机的驱动（准备/传输/提交）
//! - `worker`: 分片 worker 池
//! - `retry`: 重试逻辑（见 `core::retry`）

pub mod actor;
pub mod controller;
pub mod handlers;
pub mod messages;
pub mod state;
pub mod worker;

pub use actor::TransferTaskActor;
pub use messages::{CancelTransfer, QuerySnapshot, QueryStatus, StartTransfer};
pub use state::{TaskStatus, TransferPhase};
