use actix::Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::Config;
use crate::core::backend::{Backend, CancelFlag, StateStore};
use crate::core::error::{ErrorKind, TransferError, TransferResult};
use crate::core::limiter::RateLimiter;
use crate::core::range::{ChunkingMode, InstanceState, WorkQueue};
use crate::core::retry::RetryContext;
use crate::core::status::TransferStatus;
use uuid::Uuid;

use super::actor::TransferTaskActor;
use super::messages::{MarkCancelled, MarkCompleted, MarkFailed, SetPhase, StatePrepared};
use super::state::TransferPhase;
use super::worker::{self, WorkerShared};

/// 控制器驱动：一次传输的状态机执行体
///
/// 由任务 actor 在 `StartTransfer` 时 spawn，阶段迁移和最终结果
/// 通过消息回送给 actor。
pub struct TransferDriver {
    pub task_id: Uuid,
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub store: Arc<dyn StateStore>,
    pub limiter: Arc<RateLimiter>,
    pub status: Arc<TransferStatus>,
    pub cancel: CancelFlag,
    pub dirty: Arc<AtomicBool>,
    pub addr: Addr<TransferTaskActor>,
}

pub async fn run_transfer(driver: TransferDriver) {
    match drive(&driver).await {
        Ok(()) => {
            driver.addr.do_send(MarkCompleted);
        }
        Err(e) if e.kind() == ErrorKind::Cancelled => {
            log::info!("任务 {} 已取消，进度保留", driver.task_id);
            driver.addr.do_send(MarkCancelled);
        }
        Err(e) => {
            log::error!("任务 {} 失败: {}", driver.task_id, e);
            driver.addr.do_send(MarkFailed { error: e });
        }
    }
}

/// `Init → Preparing → Transferring → Committing → Succeeded`
async fn drive(d: &TransferDriver) -> TransferResult<()> {
    // Preparing：探测目标，装载或生成分片状态
    d.addr.do_send(SetPhase(TransferPhase::Preparing));
    let plan = d.backend.probe().await?;

    // 不支持区间传输的后端退化为单分片
    let (mode, parallelism) = if plan.supports_range {
        (d.config.chunking_mode, d.config.worker_count)
    } else {
        (ChunkingMode::EvenSplitByParallelism, 1)
    };

    let loaded = if d.config.enable_resume {
        d.store.load()?
    } else {
        None
    };
    let (state, resumed) = InstanceState::resume_or_new(
        loaded,
        plan.total_size,
        mode,
        d.config.block_size,
        parallelism,
        plan.remote_tag.clone(),
    );
    if resumed {
        log::info!(
            "任务 {} 从断点恢复，剩余 {} 字节",
            d.task_id,
            state.remaining_bytes()
        );
    }
    d.status.set_total(plan.total_size);
    d.status.set_baseline(plan.total_size - state.remaining_bytes());

    let queue = Arc::new(WorkQueue::from_state(state));
    d.addr.do_send(StatePrepared { queue: queue.clone(), resumed });

    // Transferring：worker 池消费分片
    d.addr.do_send(SetPhase(TransferPhase::Transferring));
    let shared = Arc::new(WorkerShared::new(
        queue.clone(),
        d.backend.clone(),
        d.limiter.clone(),
        d.status.clone(),
        d.cancel.clone(),
        d.config.chunk_retry_strategy(),
        d.dirty.clone(),
    ));
    if let Err(e) = worker::run_pool(shared, parallelism.max(1)).await {
        // 取消和失败都保留进度，之后可以恢复
        if d.config.enable_resume {
            if let Err(save_err) = d.store.save(&queue.snapshot()) {
                log::error!("任务 {} 中断时持久化失败: {}", d.task_id, save_err);
            }
        }
        return Err(e);
    }

    // Committing：只有分片全部确认后才进入；提交失败只重试提交本身
    d.addr.do_send(SetPhase(TransferPhase::Committing));
    if let Err(e) = commit_with_retry(d).await {
        // 分片已全部完成：持久化空的剩余集，下次启动直接重试提交
        if d.config.enable_resume {
            let _ = d.store.save(&queue.snapshot());
        }
        return Err(e);
    }

    let _ = d.store.clear();
    Ok(())
}

async fn commit_with_retry(d: &TransferDriver) -> TransferResult<()> {
    let mut retry = RetryContext::new(d.config.chunk_retry_strategy());
    loop {
        if d.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        match d.backend.commit().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if retry.should_retry(&e) {
                    log::warn!("任务 {} 提交失败，将重试: {}", d.task_id, e);
                    let delay = retry.get_delay();
                    retry.record_retry(e);
                    tokio::time::sleep(delay).await;
                } else {
                    return Err(e);
                }
            }
        }
    }
}
