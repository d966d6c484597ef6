use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::TransferError;
use crate::core::range::ChunkingMode;
use crate::core::retry::RetryStrategy;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// 传输速度限制（KB/s），0 表示不限速，对所有任务全局生效
    pub speed_limit_kb: u64,
    /// 默认下载目录
    pub download_dir: String,
    /// 每个任务的 worker 数（并行分片数）
    pub worker_count: usize,
    /// 最大并发任务数
    pub max_concurrent_tasks: usize,
    /// 网络超时时间（秒）
    pub timeout: u64,
    /// User-Agent
    pub user_agent: String,
    /// 是否启用断点续传
    pub enable_resume: bool,
    /// 分片模式
    pub chunking_mode: ChunkingMode,
    /// 固定分片模式下的块大小（字节）
    pub block_size: u64,
    /// 单个分片的重试次数
    pub retry_count: usize,
    /// 重试延迟（秒）
    pub retry_delay: u64,
    /// 最大重试延迟（秒）
    pub retry_max_delay: u64,
    /// 整个任务的重试次数（分片重试耗尽后升级）
    pub task_retry_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            speed_limit_kb: 0, // 默认不限速
            download_dir: "./downloads".to_string(),
            worker_count: 4,
            max_concurrent_tasks: 3,
            timeout: 30,
            user_agent: "MultiTrans/0.1".to_string(),
            enable_resume: true,
            chunking_mode: ChunkingMode::FixedBlockSize,
            block_size: 4 * 1024 * 1024,
            retry_count: 3,
            retry_delay: 5,
            retry_max_delay: 60,
            task_retry_count: 2,
        }
    }
}

impl Config {
    /// 加载配置文件
    pub fn load(path: &str) -> Result<Self, TransferError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            // 尝试解析TOML
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    eprintln!("配置文件格式错误: {}，将使用默认配置", e);
                    let config = Config::default();
                    Config::save_with_tutorial(&config, path)?;
                    Ok(config)
                }
            }
        } else {
            let config = Config::default();
            Config::save_with_tutorial(&config, path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), TransferError> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tutorial_content = Config::generate_tutorial_content();
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| TransferError::Unknown(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n\n{}", tutorial_content, config_content);
        std::fs::write(path, full_content)?;
        Ok(())
    }

    /// 生成配置文件教程内容（静态方法）
    fn generate_tutorial_content() -> String {
        r#"# MultiTrans 配置文件
# ====================
#
# TOML 格式，用于配置 MultiTrans 分块传输引擎的行为。
# 命令行参数会覆盖配置文件中的设置，优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   multitrans https://example.com/file.zip                   # 使用默认配置
#   multitrans -l 1024 https://example.com/file.zip           # 限制速度1MB/s
#   multitrans -w 8 https://example.com/file.zip              # 每任务8个worker
#   multitrans -d /path/to/downloads https://example.com/file.zip

# ==================== 传输设置 ====================

# 传输速度限制（KB/s），0 表示不限速
# 限速对所有任务的所有 worker 全局生效
# 示例：1024 = 1MB/s, 5120 = 5MB/s
speed_limit_kb = 0

# 默认下载目录
download_dir = "./downloads"

# 每个任务的 worker 数（并行传输的分片数）
# 建议值：2-16，根据网络环境调整
worker_count = 4

# 最大并发任务数（同时进行的传输任务数）
# 建议值：1-5
max_concurrent_tasks = 3

# ==================== 网络设置 ====================

# 网络超时时间（秒）
timeout = 30

# User-Agent 字符串
user_agent = "MultiTrans/0.1"

# ==================== 分片设置 ====================

# 是否启用断点续传
# 启用后，传输中断可以从断点继续
enable_resume = true

# 分片模式：
#   "FixedBlockSize"         按固定块大小切分
#   "EvenSplitByParallelism" 按 worker 数近似均分
chunking_mode = "FixedBlockSize"

# 固定分片模式下的块大小（字节），默认 4MB
# 块数超过 999 时会自动放大块大小
block_size = 4194304

# ==================== 重试设置 ====================

# 单个分片的重试次数（瞬时错误）
retry_count = 3

# 重试延迟（秒），指数退避的起点
retry_delay = 5

# 最大重试延迟（秒）
retry_max_delay = 60

# 整个任务的重试次数
# 分片重试耗尽后升级为任务失败，再按此次数整任务重试
task_retry_count = 2

# ==================== 配置项说明 ====================
"#.to_string()
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), TransferError> {
        crate::utils::validator::validate_worker_count(self.worker_count)
            .map_err(|e| TransferError::Unknown(e.to_string()))?;
        if self.max_concurrent_tasks == 0 {
            return Err(TransferError::Unknown("并发任务数必须大于0".to_string()));
        }
        if self.timeout == 0 {
            return Err(TransferError::Unknown("超时时间必须大于0".to_string()));
        }
        if self.download_dir.is_empty() {
            return Err(TransferError::Unknown("下载目录不能为空".to_string()));
        }
        if self.block_size == 0 {
            return Err(TransferError::Unknown("块大小必须大于0".to_string()));
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        // 命令行参数覆盖配置文件
        if let Some(speed_limit) = args.speed_limit_kb {
            self.speed_limit_kb = speed_limit;
        }

        if !args.download_dir.is_empty() {
            self.download_dir = args.download_dir.clone();
        }

        if let Some(worker_count) = args.worker_count {
            self.worker_count = worker_count;
        }
    }

    /// 分片级重试策略（也用于提交重试）
    pub fn chunk_retry_strategy(&self) -> RetryStrategy {
        RetryStrategy {
            max_retries: self.retry_count,
            base_delay: Duration::from_secs(self.retry_delay),
            max_delay: Duration::from_secs(self.retry_max_delay),
            ..RetryStrategy::default()
        }
    }

    /// 任务级重试策略（执行器在任务失败后使用）
    pub fn task_retry_strategy(&self) -> RetryStrategy {
        RetryStrategy {
            max_retries: self.task_retry_count,
            base_delay: Duration::from_secs(self.retry_delay.max(1)),
            max_delay: Duration::from_secs(self.retry_max_delay),
            ..RetryStrategy::default()
        }
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - worker数: {}\n\
            - 并发任务数: {}\n\
            - 速度限制: {} KB/s\n\
            - 超时时间: {} 秒\n\
            - 分片重试次数: {}\n\
            - 任务重试次数: {}\n\
            - 断点续传: {}",
            self.download_dir,
            self.worker_count,
            self.max_concurrent_tasks,
            if self.speed_limit_kb == 0 { "不限速".to_string() } else { self.speed_limit_kb.to_string() },
            self.timeout,
            self.retry_count,
            self.task_retry_count,
            if self.enable_resume { "启用" } else { "禁用" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.speed_limit_kb, 0);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.block_size, 4 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.worker_count = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.max_concurrent_tasks = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.block_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let config = Config::default();
        let path = "./test_config.toml";

        config.save_with_tutorial(path).expect("保存带教程的配置失败");
        let loaded_config = Config::load(path).expect("加载配置失败");

        assert_eq!(loaded_config.speed_limit_kb, config.speed_limit_kb);
        assert_eq!(loaded_config.worker_count, config.worker_count);
        assert_eq!(loaded_config.chunking_mode, config.chunking_mode);

        // 清理测试文件
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_config_save_with_tutorial() {
        let config = Config::default();
        let path = "./test_config_with_tutorial.toml";
        config.save_with_tutorial(path).expect("保存带教程的配置失败");
        let content = std::fs::read_to_string(path).expect("读取配置文件失败");
        assert!(content.contains("MultiTrans 配置文件"));
        assert!(content.contains("使用示例"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_retry_strategies() {
        let config = Config::default();
        let chunk = config.chunk_retry_strategy();
        assert_eq!(chunk.max_retries, 3);
        assert_eq!(chunk.base_delay, Duration::from_secs(5));
        let task = config.task_retry_strategy();
        assert_eq!(task.max_retries, 2);
    }

    #[test]
    fn test_config_summary() {
        let config = Config::default();
        let summary = config.get_summary();

        assert!(summary.contains("配置摘要"));
        assert!(summary.contains("下载目录"));
        assert!(summary.contains("不限速"));
    }
}
