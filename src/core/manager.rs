use actix::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::Config;
use crate::core::backend::{Backend, JsonFileStateStore, StateStore};
use crate::core::error::TransferError;
use crate::core::limiter::RateLimiter;
use crate::core::status::StatusSnapshot;
use crate::core::task::actor::TransferTaskActor;
use crate::core::task::messages::{CancelTransfer, StartTransfer};
use crate::core::task::state::TaskStatus;

/// ================== 任务元数据 ==================
#[derive(Clone, Debug)]
pub struct TaskMeta {
    pub id: Uuid,
    pub label: String,
    pub status: TaskStatus,
    pub progress: f32,
    pub transferred: u64,
    pub total: u64,
    pub speed: u64,
    pub retry_count: usize,
}

/// 永久失败的传输单元，批次结束时统一上报
#[derive(Clone, Debug)]
pub struct FailedTransfer {
    pub task_id: Uuid,
    pub label: String,
    pub message: String,
}

/// 执行器汇总统计
#[derive(Clone, Copy, Debug, Default)]
pub struct ManagerStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub speed: u64,
}

/// 注册一个使用任意后端的传输任务
pub struct AddTransfer {
    pub label: String,
    pub backend: Arc<dyn Backend>,
    pub store: Arc<dyn StateStore>,
}
impl Message for AddTransfer { type Result = Result<Uuid, TransferError>; }
impl Handler<AddTransfer> for TransferManagerActor {
    type Result = Result<Uuid, TransferError>;
    fn handle(&mut self, msg: AddTransfer, _ctx: &mut Self::Context) -> Self::Result {
        Ok(self.register(msg.label, msg.backend, msg.store))
    }
}

/// 注册一个 HTTP 下载任务（url -> 本地文件）
pub struct AddDownload {
    pub url: String,
    pub file: String,
}
impl Message for AddDownload { type Result = Result<Uuid, TransferError>; }
impl Handler<AddDownload> for TransferManagerActor {
    type Result = Result<Uuid, TransferError>;
    fn handle(&mut self, msg: AddDownload, _ctx: &mut Self::Context) -> Self::Result {
        if !crate::utils::validator::is_valid_url(&msg.url) {
            return Err(TransferError::InvalidUrl(msg.url));
        }
        let target = Path::new(&msg.file);
        if target.exists() {
            return Err(TransferError::TargetExists(msg.file));
        }
        let backend = crate::http::HttpDownloadBackend::new(
            &msg.url,
            target,
            self.config.timeout,
            &self.config.user_agent,
        )?;
        let store = Arc::new(JsonFileStateStore::for_target(target));
        Ok(self.register(msg.file, Arc::new(backend), store))
    }
}

/// 启动指定任务
pub struct StartTaskById { pub task_id: Uuid }
impl Message for StartTaskById { type Result = Result<(), TransferError>; }
impl Handler<StartTaskById> for TransferManagerActor {
    type Result = Result<(), TransferError>;
    fn handle(&mut self, msg: StartTaskById, ctx: &mut Self::Context) -> Self::Result {
        if !self.tasks.contains_key(&msg.task_id) {
            return Err(TransferError::Unknown(format!("任务ID不存在: {}", msg.task_id)));
        }
        self.dispatch(msg.task_id, ctx);
        Ok(())
    }
}

/// 取消指定任务
pub struct CancelTaskById { pub task_id: Uuid }
impl Message for CancelTaskById { type Result = (); }
impl Handler<CancelTaskById> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, msg: CancelTaskById, _ctx: &mut Self::Context) {
        if let Some(addr) = self.tasks.get(&msg.task_id) {
            addr.do_send(CancelTransfer);
        }
    }
}

/// 取消全部任务
pub struct CancelAll;
impl Message for CancelAll { type Result = (); }
impl Handler<CancelAll> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, _msg: CancelAll, _ctx: &mut Self::Context) {
        for addr in self.tasks.values() {
            addr.do_send(CancelTransfer);
        }
    }
}

/// 查询所有任务ID
pub struct ListTasks;
impl Message for ListTasks { type Result = Vec<Uuid>; }
impl Handler<ListTasks> for TransferManagerActor {
    type Result = MessageResult<ListTasks>;
    fn handle(&mut self, _msg: ListTasks, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.tasks.keys().cloned().collect())
    }
}

/// 查询指定任务元数据
pub struct QueryTaskMetaById { pub task_id: Uuid }
impl Message for QueryTaskMetaById { type Result = Option<TaskMeta>; }
impl Handler<QueryTaskMetaById> for TransferManagerActor {
    type Result = Option<TaskMeta>;
    fn handle(&mut self, msg: QueryTaskMetaById, _ctx: &mut Self::Context) -> Self::Result {
        self.metas.get(&msg.task_id).cloned()
    }
}

/// 汇总统计（供进度显示）
pub struct GetStats;
impl Message for GetStats { type Result = ManagerStats; }
impl Handler<GetStats> for TransferManagerActor {
    type Result = MessageResult<GetStats>;
    fn handle(&mut self, _msg: GetStats, _ctx: &mut Self::Context) -> Self::Result {
        let mut stats = ManagerStats { total: self.metas.len(), ..Default::default() };
        for meta in self.metas.values() {
            match &meta.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed(_) => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
            stats.total_bytes += meta.total;
            stats.transferred_bytes += meta.transferred;
            stats.speed += meta.speed;
        }
        MessageResult(stats)
    }
}

/// 取走失败列表（FIFO，取走即清空）
pub struct TakeFailed;
impl Message for TakeFailed { type Result = Vec<FailedTransfer>; }
impl Handler<TakeFailed> for TransferManagerActor {
    type Result = MessageResult<TakeFailed>;
    fn handle(&mut self, _msg: TakeFailed, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.failed.drain(..).collect())
    }
}

/// 任务进度上报（任务 actor 的状态 tick 发来）
pub struct UpdateTaskProgress {
    pub task_id: Uuid,
    pub snapshot: StatusSnapshot,
}
impl Message for UpdateTaskProgress { type Result = (); }
impl Handler<UpdateTaskProgress> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, msg: UpdateTaskProgress, _ctx: &mut Self::Context) {
        if let Some(meta) = self.metas.get_mut(&msg.task_id) {
            meta.progress = msg.snapshot.progress;
            meta.transferred = msg.snapshot.transferred;
            meta.total = msg.snapshot.total;
            meta.speed = msg.snapshot.speed;
        }
    }
}

/// 任务完成
pub struct MarkTaskCompleted { pub task_id: Uuid }
impl Message for MarkTaskCompleted { type Result = (); }
impl Handler<MarkTaskCompleted> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, msg: MarkTaskCompleted, _ctx: &mut Self::Context) {
        if let Some(meta) = self.metas.get_mut(&msg.task_id) {
            meta.status = TaskStatus::Completed;
            meta.speed = 0;
            log::info!("任务完成: {}", meta.label);
        }
    }
}

/// 任务失败：按重试策略决定重试或落入失败列表
pub struct MarkTaskFailed {
    pub task_id: Uuid,
    pub error: TransferError,
}
impl Message for MarkTaskFailed { type Result = (); }
impl Handler<MarkTaskFailed> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, msg: MarkTaskFailed, ctx: &mut Self::Context) {
        let strategy = self.config.task_retry_strategy();
        let Some(meta) = self.metas.get_mut(&msg.task_id) else { return };

        if strategy.should_retry(&msg.error, meta.retry_count) {
            meta.retry_count += 1;
            meta.status = TaskStatus::Pending;
            let delay = strategy.get_delay(meta.retry_count - 1);
            log::warn!(
                "任务 {} 失败（{}），{:.1} 秒后第 {} 次重试",
                meta.label, msg.error, delay.as_secs_f64(), meta.retry_count
            );
            let task_id = msg.task_id;
            ctx.run_later(delay, move |act, ctx| {
                act.dispatch(task_id, ctx);
            });
            return;
        }

        // 重试耗尽或 Terminal：一个单元最多进入失败列表一次
        if !matches!(meta.status, TaskStatus::Failed(_)) {
            meta.status = TaskStatus::Failed(msg.error.to_string());
            meta.speed = 0;
            self.failed.push_back(FailedTransfer {
                task_id: msg.task_id,
                label: meta.label.clone(),
                message: msg.error.to_string(),
            });
            log::error!("任务永久失败: {} - {}", meta.label, msg.error);
        }
    }
}

/// 任务取消
pub struct MarkTaskCancelled { pub task_id: Uuid }
impl Message for MarkTaskCancelled { type Result = (); }
impl Handler<MarkTaskCancelled> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, msg: MarkTaskCancelled, _ctx: &mut Self::Context) {
        if let Some(meta) = self.metas.get_mut(&msg.task_id) {
            meta.status = TaskStatus::Cancelled;
            meta.speed = 0;
        }
    }
}

impl Actor for TransferManagerActor {
    type Context = Context<Self>;
}

/// 全局任务执行器 Actor
///
/// 持有有界并发预算（信号量），最多 `max_concurrent_tasks` 个传输同时
/// 运行；失败的任务按退避重试，重试耗尽后进入失败列表，绝不影响其它任务。
pub struct TransferManagerActor {
    pub config: Config,
    pub limiter: Arc<RateLimiter>,
    semaphore: Arc<Semaphore>,
    tasks: HashMap<Uuid, Addr<TransferTaskActor>>,
    metas: HashMap<Uuid, TaskMeta>,
    failed: VecDeque<FailedTransfer>,
}

impl TransferManagerActor {
    pub fn new(config: Config) -> Self {
        // 限速器整个进程共享一个实例，跨任务生效
        let limiter = Arc::new(RateLimiter::new(config.speed_limit_kb * 1024));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        Self {
            config,
            limiter,
            semaphore,
            tasks: HashMap::new(),
            metas: HashMap::new(),
            failed: VecDeque::new(),
        }
    }

    fn register(
        &mut self,
        label: String,
        backend: Arc<dyn Backend>,
        store: Arc<dyn StateStore>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let addr = TransferTaskActor::new(
            id,
            self.config.clone(),
            label.clone(),
            backend,
            store,
            self.limiter.clone(),
        )
        .start();
        self.tasks.insert(id, addr);
        self.metas.insert(id, TaskMeta {
            id,
            label,
            status: TaskStatus::Pending,
            progress: 0.0,
            transferred: 0,
            total: 0,
            speed: 0,
            retry_count: 0,
        });
        id
    }

    /// 申请并发预算后启动任务；预算耗尽时在信号量上排队
    fn dispatch(&mut self, task_id: Uuid, ctx: &mut Context<Self>) {
        let Some(addr) = self.tasks.get(&task_id).cloned() else { return };
        let semaphore = self.semaphore.clone();
        let manager_addr = ctx.address();
        if let Some(meta) = self.metas.get_mut(&task_id) {
            meta.status = TaskStatus::Running;
        }
        actix::spawn(async move {
            let Ok(permit) = semaphore.acquire_owned().await else { return };
            addr.do_send(StartTransfer {
                manager_addr: Some(manager_addr),
                permit: Some(permit),
            });
        });
    }
}
