//! CLI: 命令行接口和参数解析模块
//!
//! - 命令行参数解析和验证
//! - 配置文件路径管理
//! - URL 列表处理（命令行参数和文件）
//! - 配置文件编辑器集成
//!
//! 支持的命令：
//! - 基本下载：`multitrans <url>`
//! - 批量下载：`multitrans -f urls.txt`
//! - 编辑配置：`multitrans -e`
//! - 指定配置：`multitrans -c config.conf <url>`
//! - 速度限制：`multitrans -l 1024 <url>`

use clap::Parser;
use std::fs;
use std::env;
use std::path::Path;

use crate::config::Config;
use crate::core::error::TransferError;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/multitrans/multitrans.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/multitrans/multitrans.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/multitrans/multitrans.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 $EDITOR，否则 nano
        let editor = env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());
        let _ = std::process::Command::new(editor).arg(config_path).status();
    }
}

/// 获取平台默认下载目录（当前工作目录）
fn get_default_download_dir() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| ".".to_string())
}

/// MultiTrans 命令行参数
///
/// 示例用法：
///   multitrans https://example.com/file.zip
///   multitrans -e  # 编辑配置文件
///   multitrans -l 1024 https://example.com/file.zip
///
/// 更多用法请加 --help 查看
#[derive(Parser, Debug, Clone)]
#[command(
    name = "multitrans",
    version = env!("CARGO_PKG_VERSION"),
    about = "一个用 Rust 编写的多线程断点续传传输引擎",
    long_about = "支持并发传输、断点续传、全局限速和实时进度显示的分块传输引擎。\n\n示例：\n  multitrans https://example.com/file.zip\n  multitrans -e\n  multitrans -c /path/to/config.conf https://example.com/file.zip\n  multitrans --speed-limit-kb 1024 https://example.com/file.zip\n"
)]
pub struct Args {
    /// 要下载的URL列表（可同时指定多个）
    #[arg(required = false, help = "要下载的URL列表，可以同时指定多个URL。")]
    pub urls: Vec<String>,

    /// 包含URL列表的文件路径
    #[arg(short, long, help = "包含URL列表的文件路径，每行一个URL。")]
    pub file: Option<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 传输速度限制（KB/s），0 表示不限速
    #[arg(long, short = 'l', help = "传输速度限制（KB/s），0 表示不限速。")]
    pub speed_limit_kb: Option<u64>,

    /// 指定下载目录（默认：当前工作目录）
    #[arg(long, short = 'd', default_value_t = get_default_download_dir(), help = "指定下载目录，覆盖配置文件中的设置，默认当前工作目录。")]
    pub download_dir: String,

    /// 指定下载文件名
    #[arg(long, short = 'n', help = "指定下载文件名，覆盖URL自动推断。")]
    pub file_name: Option<String>,

    /// 指定每个任务的 worker 数
    #[arg(long, short = 'w', help = "指定每个任务的worker数，覆盖配置文件中的设置。")]
    pub worker_count: Option<usize>,
}

impl Args {
    /// 解析命令行参数，并加载和合并配置
    pub fn parse_args() -> Result<(Self, Config), TransferError> {
        let args = Args::parse();

        // --edit 逻辑
        if args.edit_config {
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        // 加载或创建配置文件
        let mut config = if Path::new(&args.config).exists() {
            Config::load(&args.config)?
        } else {
            if let Some(parent) = Path::new(&args.config).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let config = Config::default();
            config.save_with_tutorial(&args.config)?;
            config
        };

        // 合并命令行参数到配置
        config.merge_from_args(&args);
        config.validate()?;

        Ok((args, config))
    }

    /// 收集URL列表：命令行参数 + URL文件
    pub fn get_urls(&self) -> Result<Vec<String>, TransferError> {
        let mut urls = Vec::new();
        urls.extend_from_slice(&self.urls);

        if let Some(file_path) = &self.file {
            let content = fs::read_to_string(file_path)
                .map_err(|e| TransferError::Io(format!("无法读取URL文件 {}: {}", file_path, e)))?;

            // 按行读取URL，忽略空行和注释
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    urls.push(line.to_string());
                }
            }
        }

        if urls.is_empty() {
            return Err(TransferError::InvalidUrl(
                "未提供任何URL。请通过命令行参数或文件提供至少一个URL。".to_string(),
            ));
        }
        crate::utils::validator::validate_urls(&urls)
            .map_err(|e| TransferError::InvalidUrl(e.to_string()))?;

        Ok(urls)
    }
}
