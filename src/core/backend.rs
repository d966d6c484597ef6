use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;

use crate::core::error::{TransferError, TransferResult};
use crate::core::range::{InstanceState, Range};

/// 探测结果：传输目标的基本能力
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub total_size: u64,
    pub supports_range: bool,
    /// 远端内容标识（ETag/Last-Modified 之类），用于恢复时发现内容变更
    pub remote_tag: Option<String>,
}

/// 协作式取消信号
///
/// 从执行器经控制器共享到 worker 和后端调用；置位后不再派发新分片，
/// 在途的后端调用按自己的节奏中止。
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 可插拔的传输后端
///
/// 引擎不关心字节如何移动，只要求后端能按区间传输并在结束时提交。
/// 错误分类由后端在构造 [`TransferError`] 时完成。
#[async_trait]
pub trait Backend: Send + Sync {
    /// 探测目标：总大小、是否支持区间传输
    async fn probe(&self) -> TransferResult<TransferPlan>;

    /// 传输恰好 `range` 覆盖的字节，返回实际移动的字节数
    ///
    /// 零长度分片（空文件）要求后端只做创建/占位，不移动字节。
    async fn transfer_chunk(&self, range: Range, cancel: &CancelFlag) -> TransferResult<u64>;

    /// 所有分片确认完成后的最终提交（上传确认或下载后校验）
    async fn commit(&self) -> TransferResult<()>;
}

/// 进度持久化钩子
///
/// 引擎只定义序列化状态的形状，磁盘格式由实现方决定。
pub trait StateStore: Send + Sync {
    fn save(&self, state: &InstanceState) -> TransferResult<()>;
    fn load(&self) -> TransferResult<Option<InstanceState>>;
    fn clear(&self) -> TransferResult<()>;
}

/// JSON 文件持久化，进度写在目标文件旁边的 sidecar 文件里
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 目标文件对应的默认 sidecar 路径
    pub fn for_target(target: &Path) -> Self {
        let mut os = target.as_os_str().to_owned();
        os.push(".resume.json");
        Self { path: PathBuf::from(os) }
    }
}

impl StateStore for JsonFileStateStore {
    fn save(&self, state: &InstanceState) -> TransferResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| TransferError::StateInvalid(format!("序列化失败: {}", e)))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn load(&self) -> TransferResult<Option<InstanceState>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            // 没有进度文件不是错误，按全新传输处理
            Err(_) => return Ok(None),
        };
        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                log::warn!("进度文件损坏，忽略并重新开始: {}", e);
                Ok(None)
            }
        }
    }

    fn clear(&self) -> TransferResult<()> {
        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }
}

/// 内存持久化，测试和嵌入场景用
#[derive(Default)]
pub struct MemoryStateStore {
    slot: Mutex<Option<InstanceState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, state: &InstanceState) -> TransferResult<()> {
        *self.slot.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    fn load(&self) -> TransferResult<Option<InstanceState>> {
        Ok(self.slot.lock().unwrap().clone())
    }

    fn clear(&self) -> TransferResult<()> {
        *self.slot.lock().unwrap() = None;
        Ok(())
    }
}
