use actix::prelude::*;
use std::time::Duration;

use super::actor::TransferTaskActor;
use super::controller::{self, TransferDriver};
use super::messages::*;
use super::state::TransferPhase;

/// 状态 tick 周期：进度上报和持久化都按这个节奏，不随分片触发
const STATUS_TICK: Duration = Duration::from_secs(1);

impl Handler<StartTransfer> for TransferTaskActor {
    type Result = ();
    fn handle(&mut self, msg: StartTransfer, ctx: &mut Self::Context) {
        if self.phase.is_active() {
            log::warn!("任务 {} 已在运行，忽略重复启动", self.id);
            return;
        }
        self.cancel.reset();
        self.phase = TransferPhase::Init;
        self.last_error = None;
        self.permit = msg.permit;
        self.manager_addr = msg.manager_addr;

        if self.tick_handle.is_none() {
            let handle = ctx.run_interval(STATUS_TICK, |act, _ctx| act.on_tick());
            self.tick_handle = Some(handle);
        }

        let driver = TransferDriver {
            task_id: self.id,
            config: self.config.clone(),
            backend: self.backend.clone(),
            store: self.store.clone(),
            limiter: self.limiter.clone(),
            status: self.status.clone(),
            cancel: self.cancel.clone(),
            dirty: self.dirty.clone(),
            addr: ctx.address(),
        };
        tokio::spawn(controller::run_transfer(driver));
    }
}

impl Handler<CancelTransfer> for TransferTaskActor {
    type Result = ();
    fn handle(&mut self, _msg: CancelTransfer, ctx: &mut Self::Context) {
        if self.phase.is_active() {
            // 驱动观察到取消信号后会回送 MarkCancelled
            self.cancel.cancel();
        } else if !self.phase.is_terminal() {
            self.phase = TransferPhase::Cancelled;
            self.stop_tick(ctx);
            self.release_permit();
            self.notify_manager_cancelled();
        }
    }
}

impl Handler<StatePrepared> for TransferTaskActor {
    type Result = ();
    fn handle(&mut self, msg: StatePrepared, _ctx: &mut Self::Context) {
        if msg.resumed {
            log::info!("任务 {} 复用持久化分片状态", self.id);
        }
        self.queue = Some(msg.queue);
    }
}

impl Handler<SetPhase> for TransferTaskActor {
    type Result = ();
    fn handle(&mut self, msg: SetPhase, _ctx: &mut Self::Context) {
        log::debug!("任务 {} 阶段: {} -> {}", self.id, self.phase, msg.0);
        self.phase = msg.0;
    }
}

impl Handler<MarkCompleted> for TransferTaskActor {
    type Result = ();
    fn handle(&mut self, _msg: MarkCompleted, ctx: &mut Self::Context) {
        self.phase = TransferPhase::Succeeded;
        self.stop_tick(ctx);
        self.status.tick(1.0);
        // 控制器已清除进度文件；tick 竞态可能又写回一份，这里兜底清掉
        let _ = self.store.clear();
        self.release_permit();
        self.notify_manager_progress();
        self.notify_manager_completed();
    }
}

impl Handler<MarkFailed> for TransferTaskActor {
    type Result = ();
    fn handle(&mut self, msg: MarkFailed, ctx: &mut Self::Context) {
        self.phase = TransferPhase::Failed;
        self.last_error = Some(msg.error.to_string());
        self.stop_tick(ctx);
        self.release_permit();
        self.notify_manager_failed(msg.error);
    }
}

impl Handler<MarkCancelled> for TransferTaskActor {
    type Result = ();
    fn handle(&mut self, _msg: MarkCancelled, ctx: &mut Self::Context) {
        self.phase = TransferPhase::Cancelled;
        self.stop_tick(ctx);
        self.release_permit();
        self.notify_manager_cancelled();
    }
}

impl Handler<QueryStatus> for TransferTaskActor {
    type Result = MessageResult<QueryStatus>;
    fn handle(&mut self, _msg: QueryStatus, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.task_status())
    }
}

impl Handler<QuerySnapshot> for TransferTaskActor {
    type Result = MessageResult<QuerySnapshot>;
    fn handle(&mut self, _msg: QuerySnapshot, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.status.snapshot())
    }
}
