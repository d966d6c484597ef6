//! 测试用的可编排后端

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;

use crate::core::backend::{Backend, CancelFlag, TransferPlan};
use crate::core::error::{TransferError, TransferResult};
use crate::core::range::Range;

/// 按调用序号编排失败的模拟后端
///
/// 记录每一次 `transfer_chunk` 的区间，测试据此断言分发次数、
/// 区间不相交和断点恢复语义。
pub struct MockBackend {
    total_size: u64,
    supports_range: bool,
    remote_tag: Option<String>,
    delay: Duration,
    /// 第 N 次分片调用（从1起）返回 Terminal 错误
    terminal_on: Option<usize>,
    /// 前 N 次分片调用返回 Transient 错误
    transient_left: AtomicUsize,
    /// 前 N 次 probe 返回 Transient 错误（测试整任务重试）
    probe_failures_left: AtomicUsize,
    /// 前 N 次 commit 返回 Transient 错误
    commit_failures_left: AtomicUsize,
    chunk_seq: AtomicUsize,
    chunk_log: Mutex<Vec<Range>>,
    commit_count: AtomicUsize,
}

impl MockBackend {
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            supports_range: true,
            remote_tag: None,
            delay: Duration::ZERO,
            terminal_on: None,
            transient_left: AtomicUsize::new(0),
            probe_failures_left: AtomicUsize::new(0),
            commit_failures_left: AtomicUsize::new(0),
            chunk_seq: AtomicUsize::new(0),
            chunk_log: Mutex::new(Vec::new()),
            commit_count: AtomicUsize::new(0),
        }
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn remote_tag(mut self, tag: &str) -> Self {
        self.remote_tag = Some(tag.to_string());
        self
    }

    pub fn terminal_on_call(mut self, nth: usize) -> Self {
        self.terminal_on = Some(nth);
        self
    }

    pub fn transient_failures(self, n: usize) -> Self {
        self.transient_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn probe_failures(self, n: usize) -> Self {
        self.probe_failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn commit_failures(self, n: usize) -> Self {
        self.commit_failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// 所有记录在案的分片调用（含失败的调用）
    pub fn chunk_calls(&self) -> Vec<Range> {
        self.chunk_log.lock().unwrap().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn probe(&self) -> TransferResult<TransferPlan> {
        if Self::take_one(&self.probe_failures_left) {
            return Err(TransferError::Timeout);
        }
        Ok(TransferPlan {
            total_size: self.total_size,
            supports_range: self.supports_range,
            remote_tag: self.remote_tag.clone(),
        })
    }

    async fn transfer_chunk(&self, range: Range, cancel: &CancelFlag) -> TransferResult<u64> {
        let seq = self.chunk_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.chunk_log.lock().unwrap().push(range);
        if let Some(nth) = self.terminal_on {
            if seq == nth {
                return Err(TransferError::Unauthorized("mock terminal".to_string()));
            }
        }
        if Self::take_one(&self.transient_left) {
            return Err(TransferError::Timeout);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        Ok(range.len())
    }

    async fn commit(&self) -> TransferResult<()> {
        self.commit_count.fetch_add(1, Ordering::SeqCst);
        if Self::take_one(&self.commit_failures_left) {
            return Err(TransferError::Server("mock commit failure".to_string()));
        }
        Ok(())
    }
}
