//! 基于 HTTP Range 请求的下载后端

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use url::Url;

use crate::core::backend::{Backend, CancelFlag, TransferPlan};
use crate::core::error::{TransferError, TransferResult};
use crate::core::range::Range;

/// 下载中的临时文件后缀，提交时去掉
const PART_SUFFIX: &str = ".mtpart";

/// HTTP 下载后端
///
/// `probe` 用 HEAD 请求读取总大小和 Range 支持；`transfer_chunk` 发
/// `Range: bytes=...` 请求，流式写入 `.mtpart` 临时文件的对应偏移；
/// `commit` 校验大小后重命名为目标文件。
pub struct HttpDownloadBackend {
    client: reqwest::Client,
    url: Url,
    target: PathBuf,
    part_path: PathBuf,
    expected_size: OnceLock<u64>,
}

impl HttpDownloadBackend {
    pub fn new(
        url: &str,
        target: &Path,
        timeout_secs: u64,
        user_agent: &str,
    ) -> TransferResult<Self> {
        let url = Url::parse(url).map_err(|_| TransferError::InvalidUrl(url.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransferError::Unknown(format!("HTTP客户端初始化失败: {}", e)))?;
        let mut part_os = target.as_os_str().to_owned();
        part_os.push(PART_SUFFIX);
        Ok(Self {
            client,
            url,
            target: target.to_path_buf(),
            part_path: PathBuf::from(part_os),
            expected_size: OnceLock::new(),
        })
    }

    /// 在偏移处打开临时文件
    async fn open_part_at(&self, offset: u64) -> TransferResult<tokio::fs::File> {
        if let Some(parent) = self.part_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.part_path)
            .await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        Ok(file)
    }
}

/// 分片请求的 Range 头，HTTP 的区间是闭区间
fn range_header(range: Range) -> String {
    format!("bytes={}-{}", range.begin, range.end - 1)
}

/// HTTP 状态码映射到错误分类
fn map_status(status: StatusCode, url: &Url) -> TransferError {
    match status.as_u16() {
        401 | 403 => TransferError::Unauthorized(url.to_string()),
        404 => TransferError::NotFound(url.to_string()),
        408 | 429 => TransferError::Server(format!("HTTP {}", status)),
        s if s >= 500 => TransferError::Server(format!("HTTP {}", status)),
        s => TransferError::Protocol(format!("意外的HTTP状态码: {}", s)),
    }
}

fn map_reqwest_err(e: reqwest::Error) -> TransferError {
    if e.is_timeout() {
        TransferError::Timeout
    } else if e.is_connect() {
        TransferError::Network(format!("连接失败: {}", e))
    } else {
        TransferError::Network(e.to_string())
    }
}

#[async_trait]
impl Backend for HttpDownloadBackend {
    async fn probe(&self) -> TransferResult<TransferPlan> {
        let resp = self
            .client
            .head(self.url.clone())
            .send()
            .await
            .map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), &self.url));
        }

        let total_size = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| TransferError::Protocol("服务器未返回 Content-Length".to_string()))?;

        let supports_range = resp
            .headers()
            .get(reqwest::header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        // 远端内容标识，优先 ETag；内容变了就不能信旧的断点
        let remote_tag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .or_else(|| resp.headers().get(reqwest::header::LAST_MODIFIED))
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let _ = self.expected_size.set(total_size);
        log::debug!(
            "探测 {}: {} 字节, 区间支持={}",
            self.url, total_size, supports_range
        );
        Ok(TransferPlan { total_size, supports_range, remote_tag })
    }

    async fn transfer_chunk(&self, range: Range, cancel: &CancelFlag) -> TransferResult<u64> {
        // 零长度分片（空文件）：只创建文件，不发请求
        if range.is_empty() {
            self.open_part_at(0).await?;
            return Ok(0);
        }

        let resp = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::RANGE, range_header(range))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        match resp.status() {
            StatusCode::PARTIAL_CONTENT => {}
            // 服务器忽略 Range 时只接受从头开始的分片
            StatusCode::OK if range.begin == 0 => {}
            StatusCode::OK => {
                return Err(TransferError::Protocol(
                    "服务器不支持 Range 请求".to_string(),
                ));
            }
            StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(TransferError::TooLarge(range.len()));
            }
            status => return Err(map_status(status, &self.url)),
        }

        let mut file = self.open_part_at(range.begin).await?;
        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let chunk = chunk.map_err(map_reqwest_err)?;
            // 200 回退时服务器可能发整个文件，超出区间的部分丢弃
            let room = range.len() - written;
            if room == 0 {
                break;
            }
            let take = (chunk.len() as u64).min(room) as usize;
            file.write_all(&chunk[..take]).await?;
            written += take as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn commit(&self) -> TransferResult<()> {
        let meta = tokio::fs::metadata(&self.part_path).await?;
        if let Some(expected) = self.expected_size.get() {
            if meta.len() != *expected {
                return Err(TransferError::SizeMismatch {
                    expected: *expected,
                    actual: meta.len(),
                });
            }
        }
        tokio::fs::rename(&self.part_path, &self.target).await?;
        log::info!("下载完成: {}", self.target.display());
        Ok(())
    }
}
