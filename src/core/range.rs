use std::collections::VecDeque;
use std::sync::Mutex;
use serde::{Serialize, Deserialize};

/// 单块分片上限，超过时自动放大块大小，约束元数据体积和请求次数
pub const MAX_BLOCK_COUNT: u64 = 999;

/// 字节区间，左闭右开 `[begin, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

impl Range {
    pub fn new(begin: u64, end: u64) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// 分片模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkingMode {
    /// 固定块大小切分，块数超过 [`MAX_BLOCK_COUNT`] 时放大块
    FixedBlockSize,
    /// 按并发数近似均分，最后一块吸收余数
    EvenSplitByParallelism,
}

/// 固定块大小切分
///
/// `total == 0` 时返回一个零长度分片 `[0, 0)`：空文件的传输仍然会
/// 调用一次后端，并正常走提交流程。
pub fn split_fixed(total: u64, block_size: u64) -> Vec<Range> {
    assert!(block_size > 0, "块大小必须大于0");
    if total == 0 {
        return vec![Range::new(0, 0)];
    }
    let mut block_size = block_size;
    let count = total.div_ceil(block_size);
    if count > MAX_BLOCK_COUNT {
        block_size = total.div_ceil(MAX_BLOCK_COUNT);
    }
    let mut ranges = Vec::new();
    let mut begin = 0;
    while begin < total {
        let end = (begin + block_size).min(total);
        ranges.push(Range::new(begin, end));
        begin = end;
    }
    ranges
}

/// 按并发数近似均分
pub fn split_even(total: u64, parallelism: usize) -> Vec<Range> {
    if total == 0 {
        return vec![Range::new(0, 0)];
    }
    let n = (parallelism.max(1) as u64).min(total);
    let base = total / n;
    let mut ranges = Vec::with_capacity(n as usize);
    for i in 0..n {
        let begin = i * base;
        // 最后一块吸收余数
        let end = if i == n - 1 { total } else { (i + 1) * base };
        ranges.push(Range::new(begin, end));
    }
    ranges
}

/// 单次传输的可序列化进度记录
///
/// `ranges` 只保存尚未完成的分片。调用方在每次状态 tick 时持久化，
/// 成功完成后清除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceState {
    pub total_size: u64,
    pub mode: ChunkingMode,
    pub block_size: u64,
    pub parallelism: usize,
    pub ranges: Vec<Range>,
    /// 远端内容标识（如 HTTP 的 ETag/Last-Modified），恢复时校验
    #[serde(default)]
    pub remote_tag: Option<String>,
}

impl InstanceState {
    /// 从头生成完整分片
    pub fn generate(total_size: u64, mode: ChunkingMode, block_size: u64, parallelism: usize) -> Self {
        let ranges = match mode {
            ChunkingMode::FixedBlockSize => split_fixed(total_size, block_size),
            ChunkingMode::EvenSplitByParallelism => split_even(total_size, parallelism),
        };
        Self { total_size, mode, block_size, parallelism, ranges, remote_tag: None }
    }

    /// 进度记录自检：分片有序、互不重叠、全部落在 `[0, total_size]` 内
    ///
    /// 持久化文件可能损坏或被手工改动，越界的分片会让剩余字节数超过
    /// 总大小，后续的基线计算就会下溢。
    pub fn is_well_formed(&self) -> bool {
        let mut cursor = 0u64;
        for r in &self.ranges {
            if r.begin > r.end || r.end > self.total_size || r.begin < cursor {
                return false;
            }
            cursor = r.end;
        }
        true
    }

    /// 校验持久化状态并恢复，不可用时丢弃旧状态重新生成
    ///
    /// 旧状态必须满足三个条件才会被复用：切分参数一致、远端内容标识
    /// 未变（双方都有标识时严格比较）、记录本身通过自检。
    /// 恢复必须复用原始切分：只重发未完成的分片，绝不重切已完成的前缀。
    /// 返回值第二项表示是否真正复用了旧状态。
    pub fn resume_or_new(
        loaded: Option<InstanceState>,
        total_size: u64,
        mode: ChunkingMode,
        block_size: u64,
        parallelism: usize,
        remote_tag: Option<String>,
    ) -> (Self, bool) {
        if let Some(state) = loaded {
            let compatible = state.total_size == total_size
                && state.mode == mode
                && match mode {
                    ChunkingMode::FixedBlockSize => state.block_size == block_size,
                    ChunkingMode::EvenSplitByParallelism => state.parallelism == parallelism,
                };
            let tag_unchanged = match (&state.remote_tag, &remote_tag) {
                (Some(old), Some(new)) => old == new,
                _ => true,
            };
            if compatible && tag_unchanged && state.is_well_formed() {
                return (state, true);
            }
            log::warn!(
                "持久化状态不可用（参数不一致、远端已变更或记录损坏），从0重新开始: 大小 {} vs {}",
                state.total_size, total_size
            );
        }
        let mut fresh = Self::generate(total_size, mode, block_size, parallelism);
        fresh.remote_tag = remote_tag;
        (fresh, false)
    }

    /// 剩余未传输的字节数
    pub fn remaining_bytes(&self) -> u64 {
        self.ranges.iter().map(Range::len).sum()
    }
}

struct QueueInner {
    remaining: VecDeque<Range>,
    active: Vec<Range>,
}

/// 运行期分片队列
///
/// 多个 worker 并发领取、完成分片，锁内不做任何IO。
/// 任意时刻 `已完成 ∪ remaining ∪ active == [0, total_size)`，无重叠无空洞。
pub struct WorkQueue {
    total_size: u64,
    mode: ChunkingMode,
    block_size: u64,
    parallelism: usize,
    remote_tag: Option<String>,
    inner: Mutex<QueueInner>,
}

impl WorkQueue {
    pub fn from_state(state: InstanceState) -> Self {
        Self {
            total_size: state.total_size,
            mode: state.mode,
            block_size: state.block_size,
            parallelism: state.parallelism,
            remote_tag: state.remote_tag,
            inner: Mutex::new(QueueInner {
                remaining: state.ranges.into(),
                active: Vec::new(),
            }),
        }
    }

    /// 领取下一个待传分片，没有则返回 None
    pub fn take(&self) -> Option<Range> {
        let mut inner = self.inner.lock().unwrap();
        let range = inner.remaining.pop_front()?;
        inner.active.push(range);
        Some(range)
    }

    /// 分片传输确认完成，从队列中彻底移除
    pub fn complete(&self, range: Range) {
        let mut inner = self.inner.lock().unwrap();
        inner.active.retain(|r| *r != range);
    }

    /// 分片失败，退回待传队列（队首，优先重传）
    pub fn abandon(&self, range: Range) {
        let mut inner = self.inner.lock().unwrap();
        inner.active.retain(|r| *r != range);
        inner.remaining.push_front(range);
    }

    /// 全部分片都已确认完成
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.remaining.is_empty() && inner.active.is_empty()
    }

    /// 当前未完成分片的持久化快照（active 的分片尚未确认，仍算未完成）
    pub fn snapshot(&self) -> InstanceState {
        let inner = self.inner.lock().unwrap();
        let mut ranges: Vec<Range> = inner.active.clone();
        ranges.extend(inner.remaining.iter().copied());
        ranges.sort_by_key(|r| r.begin);
        InstanceState {
            total_size: self.total_size,
            mode: self.mode,
            block_size: self.block_size,
            parallelism: self.parallelism,
            ranges,
            remote_tag: self.remote_tag.clone(),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn pending_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.remaining.len() + inner.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(ranges: &[Range], total: u64) {
        // 无空洞、无重叠、长度之和等于 total
        let mut cursor = 0;
        for r in ranges {
            assert_eq!(r.begin, cursor, "分片之间存在空洞或重叠");
            assert!(r.begin <= r.end);
            cursor = r.end;
        }
        assert_eq!(cursor, total);
        assert_eq!(ranges.iter().map(Range::len).sum::<u64>(), total);
    }

    #[test]
    fn test_split_fixed_partition() {
        for (total, bs) in [(1u64, 1u64), (10, 3), (1024, 1024), (1025, 1024), (999_999, 4096)] {
            let ranges = split_fixed(total, bs);
            assert_partition(&ranges, total);
        }
    }

    #[test]
    fn test_split_fixed_scenario() {
        // 1MB 文件按 300KB 切：最后一块吃剩余的 100KB
        let ranges = split_fixed(1_000_000, 300_000);
        assert_eq!(ranges, vec![
            Range::new(0, 300_000),
            Range::new(300_000, 600_000),
            Range::new(600_000, 900_000),
            Range::new(900_000, 1_000_000),
        ]);
    }

    #[test]
    fn test_split_fixed_caps_block_count() {
        let total = 10_000_000u64;
        let ranges = split_fixed(total, 1);
        assert!(ranges.len() as u64 <= MAX_BLOCK_COUNT);
        assert_partition(&ranges, total);
    }

    #[test]
    fn test_split_fixed_empty_file() {
        let ranges = split_fixed(0, 4096);
        assert_eq!(ranges, vec![Range::new(0, 0)]);
    }

    #[test]
    fn test_split_even_partition() {
        for (total, p) in [(10u64, 4usize), (1, 8), (1000, 3), (7, 7), (1 << 30, 16)] {
            let ranges = split_even(total, p);
            assert_partition(&ranges, total);
            assert!(ranges.len() <= p.max(1));
        }
    }

    #[test]
    fn test_split_even_last_absorbs_remainder() {
        let ranges = split_even(10, 4);
        assert_eq!(ranges.last().unwrap().end, 10);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].len(), 2);
        assert_eq!(ranges[3].len(), 4);
    }

    #[test]
    fn test_resume_reuses_persisted_partition() {
        let mut state = InstanceState::generate(1_000_000, ChunkingMode::FixedBlockSize, 300_000, 4);
        // 模拟前两块完成后崩溃
        state.ranges.drain(0..2);
        let json = serde_json::to_string(&state).unwrap();
        let loaded: InstanceState = serde_json::from_str(&json).unwrap();

        let (resumed, reused) =
            InstanceState::resume_or_new(Some(loaded), 1_000_000, ChunkingMode::FixedBlockSize, 300_000, 4, None);
        assert!(reused);
        assert_eq!(resumed.ranges, vec![
            Range::new(600_000, 900_000),
            Range::new(900_000, 1_000_000),
        ]);
        assert_eq!(resumed.remaining_bytes(), 400_000);
    }

    #[test]
    fn test_resume_discards_mismatched_state() {
        let state = InstanceState::generate(500, ChunkingMode::FixedBlockSize, 100, 4);
        // 远端状态已丢失：总大小对不上，必须从0重新生成
        let (fresh, reused) =
            InstanceState::resume_or_new(Some(state), 1000, ChunkingMode::FixedBlockSize, 100, 4, None);
        assert!(!reused);
        assert_eq!(fresh.remaining_bytes(), 1000);
        assert_eq!(fresh.ranges[0].begin, 0);
    }

    #[test]
    fn test_resume_discards_out_of_bounds_ranges() {
        // 损坏的进度文件：参数都对得上，但分片越界
        let mut state = InstanceState::generate(1000, ChunkingMode::FixedBlockSize, 500, 4);
        state.ranges = vec![Range::new(0, 2000)];
        assert!(!state.is_well_formed());
        assert!(state.remaining_bytes() > state.total_size);

        let (fresh, reused) =
            InstanceState::resume_or_new(Some(state), 1000, ChunkingMode::FixedBlockSize, 500, 4, None);
        assert!(!reused);
        // 重新生成后基线计算不会下溢
        assert!(fresh.total_size.checked_sub(fresh.remaining_bytes()).is_some());
        assert_eq!(fresh.remaining_bytes(), 1000);
    }

    #[test]
    fn test_resume_discards_overlapping_ranges() {
        let mut state = InstanceState::generate(1000, ChunkingMode::FixedBlockSize, 500, 4);
        state.ranges = vec![Range::new(0, 600), Range::new(400, 1000)];
        assert!(!state.is_well_formed());

        let (_, reused) =
            InstanceState::resume_or_new(Some(state), 1000, ChunkingMode::FixedBlockSize, 500, 4, None);
        assert!(!reused);
    }

    #[test]
    fn test_resume_discards_on_remote_change() {
        let mut state = InstanceState::generate(1000, ChunkingMode::FixedBlockSize, 500, 4);
        state.ranges.remove(0);
        state.remote_tag = Some("etag-v1".to_string());

        // 远端内容变了（ETag 不同）：旧分片不可信，从0重新开始
        let (fresh, reused) = InstanceState::resume_or_new(
            Some(state.clone()),
            1000,
            ChunkingMode::FixedBlockSize,
            500,
            4,
            Some("etag-v2".to_string()),
        );
        assert!(!reused);
        assert_eq!(fresh.remaining_bytes(), 1000);
        assert_eq!(fresh.remote_tag.as_deref(), Some("etag-v2"));

        // 标识一致则正常复用
        let (_, reused) = InstanceState::resume_or_new(
            Some(state.clone()),
            1000,
            ChunkingMode::FixedBlockSize,
            500,
            4,
            Some("etag-v1".to_string()),
        );
        assert!(reused);

        // 远端不提供标识时无从校验，按参数匹配复用
        let (_, reused) =
            InstanceState::resume_or_new(Some(state), 1000, ChunkingMode::FixedBlockSize, 500, 4, None);
        assert!(reused);
    }

    #[test]
    fn test_work_queue_take_complete() {
        let state = InstanceState::generate(100, ChunkingMode::FixedBlockSize, 30, 2);
        let queue = WorkQueue::from_state(state);
        let mut taken = Vec::new();
        while let Some(r) = queue.take() {
            taken.push(r);
        }
        assert_eq!(taken.len(), 4);
        assert!(!queue.is_drained());
        for r in taken {
            queue.complete(r);
        }
        assert!(queue.is_drained());
    }

    #[test]
    fn test_work_queue_abandon_and_snapshot() {
        let state = InstanceState::generate(100, ChunkingMode::FixedBlockSize, 50, 2);
        let queue = WorkQueue::from_state(state);
        let a = queue.take().unwrap();
        let b = queue.take().unwrap();
        queue.complete(a);
        queue.abandon(b);
        let snap = queue.snapshot();
        assert_eq!(snap.ranges, vec![b]);
        // 退回的分片会被优先重新领取
        assert_eq!(queue.take(), Some(b));
    }
}
