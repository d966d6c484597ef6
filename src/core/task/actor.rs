use actix::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OwnedSemaphorePermit;
use uuid::Uuid;

use crate::config::Config;
use crate::core::backend::{Backend, CancelFlag, StateStore};
use crate::core::error::TransferError;
use crate::core::limiter::RateLimiter;
use crate::core::range::WorkQueue;
use crate::core::status::TransferStatus;
use super::state::{TaskStatus, TransferPhase};

/// 单任务 Actor：一次文件传输的控制面
///
/// 实际的搬字节工作在控制器驱动（[`super::controller`]）和 worker 池里，
/// actor 只持有共享状态、处理控制消息、按固定节奏上报进度和持久化。
pub struct TransferTaskActor {
    pub id: Uuid,
    pub label: String,
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub store: Arc<dyn StateStore>,
    pub limiter: Arc<RateLimiter>,
    pub status: Arc<TransferStatus>,
    pub cancel: CancelFlag,
    pub dirty: Arc<AtomicBool>,
    pub phase: TransferPhase,
    pub last_error: Option<String>,
    pub queue: Option<Arc<WorkQueue>>,
    pub permit: Option<OwnedSemaphorePermit>,
    pub manager_addr: Option<Addr<crate::core::manager::TransferManagerActor>>,
    pub(super) tick_handle: Option<SpawnHandle>,
}

impl Actor for TransferTaskActor {
    type Context = Context<Self>;
}

impl TransferTaskActor {
    pub fn new(
        id: Uuid,
        config: Config,
        label: String,
        backend: Arc<dyn Backend>,
        store: Arc<dyn StateStore>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            id,
            label,
            config,
            backend,
            store,
            limiter,
            status: Arc::new(TransferStatus::new()),
            cancel: CancelFlag::new(),
            dirty: Arc::new(AtomicBool::new(false)),
            phase: TransferPhase::Init,
            last_error: None,
            queue: None,
            permit: None,
            manager_addr: None,
            tick_handle: None,
        }
    }

    /// 阶段映射为执行器视角的任务状态
    pub fn task_status(&self) -> TaskStatus {
        match self.phase {
            TransferPhase::Init => TaskStatus::Pending,
            TransferPhase::Preparing
            | TransferPhase::Transferring
            | TransferPhase::Committing => TaskStatus::Running,
            TransferPhase::Succeeded => TaskStatus::Completed,
            TransferPhase::Failed => TaskStatus::Failed(
                self.last_error.clone().unwrap_or_else(|| "未知错误".to_string()),
            ),
            TransferPhase::Cancelled => TaskStatus::Cancelled,
        }
    }

    /// 状态 tick：计算速度、上报进度、按需持久化
    ///
    /// 持久化只在这里发生，崩溃最多丢一个 tick 的进度。
    pub(super) fn on_tick(&mut self) {
        self.status.tick(1.0);
        if self.dirty.swap(false, Ordering::SeqCst) && self.config.enable_resume {
            if let Some(queue) = &self.queue {
                if let Err(e) = self.store.save(&queue.snapshot()) {
                    log::error!("任务 {} 持久化进度失败: {}", self.id, e);
                }
            }
        }
        self.notify_manager_progress();
    }

    pub(super) fn release_permit(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
        }
    }

    pub(super) fn stop_tick(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.tick_handle.take() {
            ctx.cancel_future(handle);
        }
    }

    pub fn notify_manager_progress(&self) {
        if let Some(manager_addr) = &self.manager_addr {
            manager_addr.do_send(crate::core::manager::UpdateTaskProgress {
                task_id: self.id,
                snapshot: self.status.snapshot(),
            });
        }
    }

    pub fn notify_manager_completed(&self) {
        if let Some(manager_addr) = &self.manager_addr {
            manager_addr.do_send(crate::core::manager::MarkTaskCompleted { task_id: self.id });
        }
    }

    pub fn notify_manager_failed(&self, error: TransferError) {
        if let Some(manager_addr) = &self.manager_addr {
            manager_addr.do_send(crate::core::manager::MarkTaskFailed {
                task_id: self.id,
                error,
            });
        }
    }

    pub fn notify_manager_cancelled(&self) {
        if let Some(manager_addr) = &self.manager_addr {
            manager_addr.do_send(crate::core::manager::MarkTaskCancelled { task_id: self.id });
        }
    }
}
