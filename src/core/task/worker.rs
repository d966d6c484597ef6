use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinSet;

use crate::core::backend::{Backend, CancelFlag};
use crate::core::error::{ErrorKind, TransferError, TransferResult};
use crate::core::limiter::RateLimiter;
use crate::core::range::{Range, WorkQueue};
use crate::core::retry::{RetryContext, RetryStrategy};
use crate::core::status::TransferStatus;

/// worker 池共享的运行状态
pub struct WorkerShared {
    pub queue: Arc<WorkQueue>,
    pub backend: Arc<dyn Backend>,
    pub limiter: Arc<RateLimiter>,
    pub status: Arc<TransferStatus>,
    pub cancel: CancelFlag,
    pub retry: RetryStrategy,
    /// 有新完成的分片、等待下一次持久化 tick
    pub dirty: Arc<AtomicBool>,
    abort: AtomicBool,
    first_error: Mutex<Option<TransferError>>,
}

impl WorkerShared {
    pub fn new(
        queue: Arc<WorkQueue>,
        backend: Arc<dyn Backend>,
        limiter: Arc<RateLimiter>,
        status: Arc<TransferStatus>,
        cancel: CancelFlag,
        retry: RetryStrategy,
        dirty: Arc<AtomicBool>,
    ) -> Self {
        Self {
            queue,
            backend,
            limiter,
            status,
            cancel,
            retry,
            dirty,
            abort: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    fn record_error(&self, error: TransferError) {
        let mut slot = self.first_error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(error);
        }
        // 终止信号：已领取的分片继续排空，但不再派发新分片
        self.abort.store(true, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.abort.load(Ordering::SeqCst)
    }
}

/// 以 `parallelism` 个执行单元并发消费分片队列
///
/// 先完成的单元立即领取下一个待传分片（按可用性分发，而非静态划分），
/// 慢分片不会拖住其它连接。全部分片确认完成返回 Ok。
pub async fn run_pool(shared: Arc<WorkerShared>, parallelism: usize) -> TransferResult<()> {
    let mut join = JoinSet::new();
    for id in 0..parallelism.max(1) {
        let s = shared.clone();
        join.spawn(chunk_worker(id, s));
    }
    while let Some(res) = join.join_next().await {
        if let Err(e) = res {
            log::error!("worker 异常退出: {}", e);
        }
    }

    if shared.cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }
    if let Some(e) = shared.first_error.lock().unwrap().take() {
        return Err(e);
    }
    if shared.queue.is_drained() {
        Ok(())
    } else {
        Err(TransferError::Unknown("worker 池退出时仍有分片未完成".to_string()))
    }
}

async fn chunk_worker(id: usize, s: Arc<WorkerShared>) {
    loop {
        if s.should_stop() {
            break;
        }
        let Some(range) = s.queue.take() else { break };
        match transfer_one(&s, range).await {
            Ok(moved) => {
                s.queue.complete(range);
                s.status.add(moved);
                s.dirty.store(true, Ordering::SeqCst);
                log::debug!("worker#{} 完成分片 {}", id, range);
                // 限速记账，超出配额时在这里阻塞
                s.limiter.add(moved).await;
            }
            Err(e) => {
                s.queue.abandon(range);
                if e.kind() != ErrorKind::Cancelled {
                    log::error!("worker#{} 分片 {} 不可恢复: {}", id, range, e);
                    s.record_error(e);
                }
                break;
            }
        }
    }
}

/// 传输单个分片，Transient 错误在分片内有界重试
async fn transfer_one(s: &WorkerShared, range: Range) -> TransferResult<u64> {
    let mut retry = RetryContext::new(s.retry.clone());
    loop {
        if s.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let result = match s.backend.transfer_chunk(range, &s.cancel).await {
            Ok(moved) if moved != range.len() => {
                Err(TransferError::SizeMismatch { expected: range.len(), actual: moved })
            }
            other => other,
        };
        match result {
            Ok(moved) => return Ok(moved),
            Err(e) => {
                if retry.should_retry(&e) {
                    log::warn!("分片 {} 传输失败，将重试: {}", range, e);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::range::{ChunkingMode, InstanceState};
    use crate::core::testkit::MockBackend;
    use std::time::Duration;

    fn fast_retry() -> RetryStrategy {
        RetryStrategy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    fn make_shared(backend: Arc<MockBackend>, state: InstanceState) -> Arc<WorkerShared> {
        Arc::new(WorkerShared::new(
            Arc::new(WorkQueue::from_state(state)),
            backend,
            Arc::new(RateLimiter::new(0)),
            Arc::new(TransferStatus::new()),
            CancelFlag::new(),
            fast_retry(),
            Arc::new(AtomicBool::new(false)),
        ))
    }

    #[tokio::test]
    async fn test_pool_drains_all_ranges() {
        let backend = Arc::new(MockBackend::new(1_000_000));
        let state = InstanceState::generate(1_000_000, ChunkingMode::FixedBlockSize, 300_000, 4);
        let shared = make_shared(backend.clone(), state);
        shared.status.set_total(1_000_000);

        run_pool(shared.clone(), 4).await.expect("传输应成功");
        assert!(shared.queue.is_drained());
        assert_eq!(shared.status.transferred(), 1_000_000);
        assert_eq!(backend.chunk_calls().len(), 4);
    }

    #[tokio::test]
    async fn test_no_overlapping_writes() {
        let backend = Arc::new(MockBackend::new(10 * 1024 * 1024));
        let state =
            InstanceState::generate(10 * 1024 * 1024, ChunkingMode::FixedBlockSize, 1024 * 1024, 4);
        let shared = make_shared(backend.clone(), state);

        run_pool(shared, 4).await.unwrap();

        // 任意两次后端调用的区间不得相交
        let mut calls = backend.chunk_calls();
        calls.sort_by_key(|r| r.begin);
        for pair in calls.windows(2) {
            assert!(pair[0].end <= pair[1].begin, "{} 与 {} 重叠", pair[0], pair[1]);
        }
        assert_eq!(calls.iter().map(Range::len).sum::<u64>(), 10 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_resume_transfers_only_remaining() {
        // K=2 已完成，N=4：只允许传剩下的两块
        let mut state = InstanceState::generate(1_000_000, ChunkingMode::FixedBlockSize, 300_000, 4);
        state.ranges.drain(0..2);
        let backend = Arc::new(MockBackend::new(1_000_000));
        let shared = make_shared(backend.clone(), state);

        run_pool(shared.clone(), 4).await.unwrap();

        let calls = backend.chunk_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|r| r.begin >= 600_000), "不得重传已完成的分片");
        assert_eq!(shared.status.transferred(), 400_000);
    }

    #[tokio::test]
    async fn test_terminal_error_stops_dispatch() {
        // P=1 下第2块返回 Terminal：第3、4块不得再被请求
        let backend = Arc::new(MockBackend::new(1_000_000).terminal_on_call(2));
        let state = InstanceState::generate(1_000_000, ChunkingMode::FixedBlockSize, 300_000, 4);
        let shared = make_shared(backend.clone(), state);

        let err = run_pool(shared, 1).await.unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(backend.chunk_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_transient_error_retried_in_place() {
        // 前两次调用超时，分片级重试后整体仍然成功
        let backend = Arc::new(MockBackend::new(600).transient_failures(2));
        let state = InstanceState::generate(600, ChunkingMode::FixedBlockSize, 300, 2);
        let shared = make_shared(backend.clone(), state);

        run_pool(shared.clone(), 2).await.expect("瞬时错误应被就地重试");
        assert!(shared.queue.is_drained());
    }

    #[tokio::test]
    async fn test_transient_exhaustion_escalates() {
        let backend = Arc::new(MockBackend::new(600).transient_failures(100));
        let state = InstanceState::generate(600, ChunkingMode::FixedBlockSize, 300, 2);
        let shared = make_shared(backend, state);

        let err = run_pool(shared.clone(), 1).await.unwrap_err();
        assert!(err.is_transient());
        // 进度保留，队列未排空
        assert!(!shared.queue.is_drained());
    }

    #[tokio::test]
    async fn test_cancellation_preserves_state() {
        let backend = Arc::new(MockBackend::new(1_000_000).chunk_delay(Duration::from_millis(50)));
        let state = InstanceState::generate(1_000_000, ChunkingMode::FixedBlockSize, 100_000, 4);
        let shared = make_shared(backend, state);

        let cancel = shared.cancel.clone();
        let pool = tokio::spawn(run_pool(shared.clone(), 2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let err = pool.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        // 未完成的分片都还在快照里，可以恢复
        let snapshot = shared.queue.snapshot();
        assert!(!snapshot.ranges.is_empty());
        assert_eq!(
            snapshot.remaining_bytes() + shared.status.transferred(),
            1_000_000
        );
    }
}
