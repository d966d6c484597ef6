use std::time::Duration;
use crate::core::error::TransferError;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 抖动因子，避免重试风暴
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryStrategy {
    /// 只有 Transient 错误在次数限制内才重试
    pub fn should_retry(&self, error: &TransferError, retry_count: usize) -> bool {
        retry_count < self.max_retries && error.is_transient()
    }

    pub fn get_delay(&self, retry_count: usize) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64()
            * self.backoff_multiplier.powi(retry_count as i32);
        let jitter = delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let delay = Duration::from_secs_f64((delay_secs + jitter).max(0.1));
        delay.min(self.max_delay)
    }
}

/// 重试上下文，跟踪一个工作单元的重试进度
#[derive(Debug)]
pub struct RetryContext {
    pub strategy: RetryStrategy,
    pub retry_count: usize,
    pub last_error: Option<TransferError>,
}

impl RetryContext {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            retry_count: 0,
            last_error: None,
        }
    }

    pub fn should_retry(&self, error: &TransferError) -> bool {
        self.strategy.should_retry(error, self.retry_count)
    }

    pub fn record_retry(&mut self, error: TransferError) {
        self.retry_count += 1;
        self.last_error = Some(error);
    }

    pub fn get_delay(&self) -> Duration {
        self.strategy.get_delay(self.retry_count)
    }

    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_retried() {
        let strategy = RetryStrategy::default();
        assert!(strategy.should_retry(&TransferError::Timeout, 0));
        assert!(strategy.should_retry(&TransferError::Network("reset".to_string()), 2));
        assert!(!strategy.should_retry(&TransferError::Unauthorized("401".to_string()), 0));
        assert!(!strategy.should_retry(&TransferError::Cancelled, 0));
    }

    #[test]
    fn test_retry_count_bound() {
        let strategy = RetryStrategy::default();
        assert!(!strategy.should_retry(&TransferError::Timeout, 3));
        assert!(!strategy.should_retry(&TransferError::Timeout, 100));
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let strategy = RetryStrategy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(strategy.get_delay(0), Duration::from_secs(1));
        assert_eq!(strategy.get_delay(1), Duration::from_secs(2));
        assert_eq!(strategy.get_delay(2), Duration::from_secs(4));
        // 封顶
        assert_eq!(strategy.get_delay(5), Duration::from_secs(8));
    }

    #[test]
    fn test_context_tracks_retries() {
        let mut ctx = RetryContext::new(RetryStrategy::default());
        assert!(ctx.should_retry(&TransferError::Timeout));
        ctx.record_retry(TransferError::Timeout);
        ctx.record_retry(TransferError::Timeout);
        ctx.record_retry(TransferError::Timeout);
        assert!(!ctx.should_retry(&TransferError::Timeout));
        ctx.reset();
        assert!(ctx.should_retry(&TransferError::Timeout));
    }
}
