use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 被限流的调用重新检查窗口的间隔
const PARK_TICK: Duration = Duration::from_millis(200);

/// 计量窗口长度
const WINDOW: Duration = Duration::from_secs(1);

struct Window {
    start: Instant,
    bytes: u64,
}

/// 进程级限速器
///
/// 所有任务的所有 worker 共享一个实例，传完一个分片后调用 [`RateLimiter::add`]
/// 记账；超出配额的调用方按 tick 周期休眠重试，近似公平（不是严格 FIFO）。
/// `max_rate == 0` 表示不限速，`add` 退化为空操作。
pub struct RateLimiter {
    max_rate: u64, // B/s
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max_rate: u64) -> Self {
        Self {
            max_rate,
            window: Mutex::new(Window {
                start: Instant::now(),
                bytes: 0,
            }),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_rate == 0
    }

    /// 记账 `n` 字节，必要时阻塞到窗口配额允许为止
    ///
    /// 单笔超过整秒配额的请求在空窗口上直接放行，否则永远无法通过。
    pub async fn add(&self, n: u64) {
        if self.max_rate == 0 || n == 0 {
            return;
        }
        loop {
            let admitted = {
                let mut w = self.window.lock().unwrap();
                if w.start.elapsed() >= WINDOW {
                    w.start = Instant::now();
                    w.bytes = 0;
                }
                if w.bytes + n <= self.max_rate || w.bytes == 0 {
                    w.bytes += n;
                    true
                } else {
                    false
                }
            };
            if admitted {
                return;
            }
            tokio::time::sleep(PARK_TICK).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_unlimited_never_blocks() {
        tokio_test::block_on(async {
            let limiter = RateLimiter::new(0);
            let t0 = Instant::now();
            for _ in 0..1000 {
                limiter.add(10 * 1024 * 1024).await;
            }
            assert!(limiter.is_unlimited());
            assert!(t0.elapsed() < Duration::from_millis(100), "不限速时不应有任何等待");
        });
    }

    #[tokio::test]
    async fn test_limited_paces_throughput() {
        // 配额 8KB/s，提交 16KB，至少要跨一个窗口
        let limiter = RateLimiter::new(8192);
        let t0 = Instant::now();
        for _ in 0..4 {
            limiter.add(4096).await;
        }
        let elapsed = t0.elapsed();
        assert!(elapsed >= Duration::from_millis(800), "实际耗时 {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_oversized_request_admitted_on_empty_window() {
        let limiter = RateLimiter::new(1024);
        let t0 = Instant::now();
        // 单笔超配额：空窗口直接放行，不得饿死
        limiter.add(10 * 1024).await;
        assert!(t0.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_shared_across_workers() {
        let limiter = Arc::new(RateLimiter::new(8192));
        let t0 = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let l = limiter.clone();
            handles.push(tokio::spawn(async move {
                l.add(4096).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // 4 * 4KB 超过 8KB/s 配额，必然有 worker 被挡到下一个窗口
        assert!(t0.elapsed() >= Duration::from_millis(800));
    }
}
