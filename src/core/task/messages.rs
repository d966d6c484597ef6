use actix::{Addr, Message};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

use crate::core::error::TransferError;
use crate::core::manager::TransferManagerActor;
use crate::core::range::WorkQueue;
use crate::core::status::StatusSnapshot;
use super::state::{TaskStatus, TransferPhase};

/// 启动（或重试启动）传输
///
/// `permit` 是执行器并发预算的所有权凭证，任务终止时随 drop 归还；
/// 两个字段在嵌入式/测试场景下都可以为 None。
pub struct StartTransfer {
    pub manager_addr: Option<Addr<TransferManagerActor>>,
    pub permit: Option<OwnedSemaphorePermit>,
}
impl Message for StartTransfer { type Result = (); }

/// 协作式取消传输
pub struct CancelTransfer;
impl Message for CancelTransfer { type Result = (); }

/// 控制器完成准备阶段，分片队列就绪
pub struct StatePrepared {
    pub queue: Arc<WorkQueue>,
    pub resumed: bool,
}
impl Message for StatePrepared { type Result = (); }

/// 控制器阶段迁移
pub struct SetPhase(pub TransferPhase);
impl Message for SetPhase { type Result = (); }

/// 标记任务为完成
pub struct MarkCompleted;
impl Message for MarkCompleted { type Result = (); }

/// 标记任务为失败
pub struct MarkFailed {
    pub error: TransferError,
}
impl Message for MarkFailed { type Result = (); }

/// 标记任务为已取消（进度已持久化，可恢复）
pub struct MarkCancelled;
impl Message for MarkCancelled { type Result = (); }

/// 查询任务状态
pub struct QueryStatus;
impl Message for QueryStatus { type Result = TaskStatus; }

/// 查询统计快照
pub struct QuerySnapshot;
impl Message for QuerySnapshot { type Result = StatusSnapshot; }
