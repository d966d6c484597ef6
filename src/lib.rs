//! MultiTrans - 多线程断点续传传输引擎
//!
//! 把单个大文件的传输切成分片，由固定数量的 worker 并行搬运，
//! 支持断点续传、全局限速、分片和整任务两级重试。后端可插拔，
//! 自带基于 HTTP Range 请求的下载后端。

pub mod cli;
pub mod config;
pub mod core;
pub mod http;
pub mod ui;
pub mod utils;
