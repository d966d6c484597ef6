use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// 单次传输的统计计数
///
/// worker 端只做无锁累加，速度和 ETA 由状态 tick 按固定节奏计算，
/// 不随每个分片更新。
pub struct TransferStatus {
    total: AtomicU64,
    transferred: AtomicU64,
    speed: AtomicU64, // B/s，由 tick 写入
    last_tick_bytes: AtomicU64,
    started: Instant,
}

/// 供进度回调读取的一致性快照
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    pub total: u64,
    pub transferred: u64,
    pub speed: u64,
    pub progress: f32,
    pub eta_secs: Option<u64>,
    pub elapsed_secs: u64,
}

impl TransferStatus {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            transferred: AtomicU64::new(0),
            speed: AtomicU64::new(0),
            last_tick_bytes: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    /// 恢复传输时设置已完成的基线字节数
    pub fn set_baseline(&self, transferred: u64) {
        self.transferred.store(transferred, Ordering::SeqCst);
        self.last_tick_bytes.store(transferred, Ordering::SeqCst);
    }

    pub fn add(&self, n: u64) {
        self.transferred.fetch_add(n, Ordering::SeqCst);
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// 按 tick 间隔计算瞬时速度
    pub fn tick(&self, interval_secs: f64) {
        let now = self.transferred.load(Ordering::SeqCst);
        let last = self.last_tick_bytes.swap(now, Ordering::SeqCst);
        let delta = now.saturating_sub(last);
        let speed = if interval_secs > 0.0 {
            (delta as f64 / interval_secs) as u64
        } else {
            0
        };
        self.speed.store(speed, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let total = self.total.load(Ordering::SeqCst);
        let transferred = self.transferred.load(Ordering::SeqCst);
        let speed = self.speed.load(Ordering::SeqCst);
        let progress = if total > 0 {
            (transferred as f32 / total as f32) * 100.0
        } else {
            0.0
        };
        let eta_secs = if speed > 0 && total > transferred {
            Some((total - transferred) / speed)
        } else {
            None
        };
        StatusSnapshot {
            total,
            transferred,
            speed,
            progress,
            eta_secs,
            elapsed_secs: self.started.elapsed().as_secs(),
        }
    }
}

impl Default for TransferStatus {
    fn default() -> Self {
        Self::new()
    }
}
