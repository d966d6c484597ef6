use serde::{Serialize, Deserialize};

/// 任务对外状态（执行器视角）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

/// 单次传输的内部阶段状态机
///
/// `Init → Preparing → Transferring → Committing → Succeeded`，
/// 任意非终态可进入 `Failed` / `Cancelled`。阶段迁移只发生在控制器驱动里，
/// 不存在顺序贯穿。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Init,
    Preparing,
    Transferring,
    Committing,
    Succeeded,
    Failed,
    Cancelled,
}

impl TransferPhase {
    /// 是否已进入终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferPhase::Succeeded | TransferPhase::Failed | TransferPhase::Cancelled
        )
    }

    /// 是否处于运行中的阶段（此时重复的启动请求会被忽略）
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TransferPhase::Preparing | TransferPhase::Transferring | TransferPhase::Committing
        )
    }
}

impl std::fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferPhase::Init => "初始化",
            TransferPhase::Preparing => "准备中",
            TransferPhase::Transferring => "传输中",
            TransferPhase::Committing => "提交中",
            TransferPhase::Succeeded => "已完成",
            TransferPhase::Failed => "已失败",
            TransferPhase::Cancelled => "已取消",
        };
        f.write_str(s)
    }
}
