use thiserror::Error;
use std::io;

/// 错误分类：决定引擎在哪一层处理该错误
///
/// - `Transient`：可重试（先在分片内重试，耗尽后升级为整个任务的失败）
/// - `Terminal`：重试无意义，立即中止整个传输
/// - `Cancelled`：不算错误，保留 InstanceState 以便之后恢复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Terminal,
    Cancelled,
}

/// 传输引擎的统一错误类型
///
/// 后端在构造错误时完成分类映射（比如把 HTTP 状态码映射到对应的变体），
/// 引擎只通过 [`TransferError::kind`] 读取分类。
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    #[error("网络错误: {0}")]
    Network(String),

    #[error("传输超时")]
    Timeout,

    #[error("服务端错误: {0}")]
    Server(String),

    #[error("分片大小不匹配: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("认证被拒绝: {0}")]
    Unauthorized(String),

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("请求体过大: {0} 字节")]
    TooLarge(u64),

    #[error("协议错误: {0}")]
    Protocol(String),

    #[error("本地IO错误: {0}")]
    Io(String),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("目标文件已存在: {0}")]
    TargetExists(String),

    #[error("进度状态无效: {0}")]
    StateInvalid(String),

    #[error("传输被取消")]
    Cancelled,

    #[error("未知错误: {0}")]
    Unknown(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Network(_)
            | TransferError::Timeout
            | TransferError::Server(_)
            | TransferError::SizeMismatch { .. } => ErrorKind::Transient,
            TransferError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Terminal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() == ErrorKind::Terminal
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        TransferError::Io(e.to_string())
    }
}

impl From<String> for TransferError {
    fn from(error: String) -> Self {
        TransferError::Unknown(error)
    }
}

impl From<&str> for TransferError {
    fn from(error: &str) -> Self {
        TransferError::Unknown(error.to_string())
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
