//! 帧提取：顺序读取视频帧，交给有界线程池增强，收集并按序号排序
//!
//! 状态机：`Idle → Opening → Reading → {Completed, Failed}`。
//! 打开失败时以空结果完成；单帧失败只记录日志并跳过。

pub mod pool;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

pub use pool::BoundedPool;

use crate::config::ExtractOptions;
use crate::enhancer::FrameEnhance;
use crate::error::ExtractError;
use crate::frame::{AssetMetadata, EnhancedImage, ExtractionResult, RawFrame};
use crate::media::FrameSource;
use crate::media::ffmpeg::VideoAsset;

/// 连续读取失败达到此次数后视为读取器已停止
pub const MAX_CONSECUTIVE_READ_FAILURES: u32 = 32;

/// 提取状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    /// 尚未开始
    Idle,
    /// 正在打开视频
    Opening,
    /// 正在顺序读取并分发帧
    Reading,
    /// 全部任务完成
    Completed,
    /// 打开或创建读取器失败
    Failed,
}

impl ExtractionState {
    /// 是否允许转换到 `next`
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Opening)
                | (Self::Opening, Self::Reading | Self::Failed)
                | (Self::Reading, Self::Completed | Self::Failed)
        )
    }
}

/// 单次提取的状态跟踪
struct StateTracker<'a> {
    source: &'a str,
    state: ExtractionState,
}

impl<'a> StateTracker<'a> {
    const fn new(source: &'a str) -> Self {
        Self {
            source,
            state: ExtractionState::Idle,
        }
    }

    fn advance(&mut self, next: ExtractionState) {
        if !self.state.can_advance_to(next) {
            warn!(from = ?self.state, to = ?next, "忽略非法的提取状态转换");
            return;
        }
        debug!(source = self.source, from = ?self.state, to = ?next, "提取状态转换");
        self.state = next;
    }

    /// 进入 `Failed` 并返回空结果
    fn fail(&mut self, err: &ExtractError) -> ExtractionResult {
        error!(source = self.source, error = %err, "视频提取失败");
        self.advance(ExtractionState::Failed);
        ExtractionResult::empty()
    }
}

/// 读取统计
#[derive(Debug, Default, Clone, Copy)]
struct ReadStats {
    /// 成功读取的帧数
    decoded: u64,
    /// 读取失败而跳过的帧数
    skipped: u64,
    /// 分发给线程池的帧数
    dispatched: u64,
}

/// 按 `frame_interval` 抽样的帧迭代器
///
/// 序号是成功读取的帧在解码顺序中的位置，抽样后依然保持时间含义
struct SampledFrames<'a, S> {
    source: &'a mut S,
    stats: &'a mut ReadStats,
    interval: u64,
    consecutive_failures: u32,
}

impl<S: FrameSource> Iterator for SampledFrames<'_, S> {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        loop {
            match self.source.read_next() {
                Ok(Some(buffer)) => {
                    self.consecutive_failures = 0;
                    let index = self.stats.decoded;
                    self.stats.decoded += 1;
                    if index % self.interval != 0 {
                        continue;
                    }
                    self.stats.dispatched += 1;
                    return Some(RawFrame { index, buffer });
                }
                Ok(None) => return None,
                Err(e) => {
                    self.stats.skipped += 1;
                    self.consecutive_failures += 1;
                    warn!(error = %e, "跳过无法读取的帧");
                    if self.consecutive_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                        warn!(
                            failures = self.consecutive_failures,
                            "连续读取失败次数过多，停止读取"
                        );
                        return None;
                    }
                }
            }
        }
    }
}

/// 帧提取器
///
/// 持有共享的增强器；一个实例可以依次或同时服务多次提取
pub struct FrameExtractor<E> {
    enhancer: Arc<E>,
}

impl<E: FrameEnhance> FrameExtractor<E> {
    /// 创建提取器
    #[must_use]
    pub const fn new(enhancer: Arc<E>) -> Self {
        Self { enhancer }
    }

    /// 共享的增强器
    #[must_use]
    pub const fn enhancer(&self) -> &Arc<E> {
        &self.enhancer
    }

    /// 提取视频帧，完成后恰好调用一次 `on_complete`
    pub fn extract_frames<F>(&self, path: &Path, options: &ExtractOptions, on_complete: F)
    where
        F: FnOnce(ExtractionResult),
    {
        on_complete(self.extract(path, options));
    }

    /// 提取视频帧并返回结果
    ///
    /// 视频无法打开、没有视频轨道或读取器创建失败时返回空结果
    #[must_use]
    pub fn extract(&self, path: &Path, options: &ExtractOptions) -> ExtractionResult {
        let label = path.display().to_string();
        let mut state = StateTracker::new(&label);

        state.advance(ExtractionState::Opening);
        let asset = match VideoAsset::open(path) {
            Ok(asset) => asset,
            Err(e) => return state.fail(&e),
        };

        state.advance(ExtractionState::Reading);
        match asset.into_reader() {
            Ok(reader) => self.drain(reader, options, state),
            Err(e) => state.fail(&e),
        }
    }

    /// 从已打开的帧源提取
    #[must_use]
    pub fn extract_from<S: FrameSource>(
        &self,
        source: S,
        options: &ExtractOptions,
    ) -> ExtractionResult {
        let mut state = StateTracker::new("<source>");
        state.advance(ExtractionState::Opening);
        state.advance(ExtractionState::Reading);
        self.drain(source, options, state)
    }

    /// 读取全部帧、并行增强、排序后完成
    fn drain<S: FrameSource>(
        &self,
        mut source: S,
        options: &ExtractOptions,
        mut state: StateTracker<'_>,
    ) -> ExtractionResult {
        let metadata: AssetMetadata = source.metadata();
        let total_frames = metadata.total_frames();
        let pool = BoundedPool::new(options.workers(), options.batch());
        info!(
            source = state.source,
            duration = metadata.duration,
            frame_rate = metadata.frame_rate,
            total_frames,
            workers = pool.workers(),
            batch_size = pool.batch_size(),
            "开始提取视频帧"
        );

        let mut stats = ReadStats::default();
        let frames = SampledFrames {
            source: &mut source,
            stats: &mut stats,
            interval: options.interval().get() as u64,
            consecutive_failures: 0,
        };

        let enhancer = self.enhancer.as_ref();
        let mut images = pool.run(frames, |frame: RawFrame| {
            let image = enhancer.enhance_frame(&frame);
            if image.is_none() {
                debug!(index = frame.index, "帧增强失败，已丢弃");
            }
            image.map(|image| EnhancedImage {
                index: frame.index,
                timestamp: frame.buffer.timestamp,
                image,
            })
        });
        images.sort_unstable_by_key(|img| img.index);

        state.advance(ExtractionState::Completed);
        info!(
            source = state.source,
            decoded = stats.decoded,
            skipped = stats.skipped,
            dispatched = stats.dispatched,
            frames = images.len(),
            "视频帧提取完成"
        );

        ExtractionResult {
            images,
            frame_rate: metadata.frame_rate,
            duration: metadata.duration,
            total_frames,
        }
    }
}

/// 在独立线程上提取，完成后在该线程上调用 `on_complete`
///
/// # Errors
///
/// 线程创建失败
pub fn spawn_extraction<E, F>(
    extractor: Arc<FrameExtractor<E>>,
    path: PathBuf,
    options: ExtractOptions,
    on_complete: F,
) -> io::Result<JoinHandle<()>>
where
    E: FrameEnhance + 'static,
    F: FnOnce(ExtractionResult) + Send + 'static,
{
    thread::Builder::new()
        .name("frame-extractor".into())
        .spawn(move || extractor.extract_frames(&path, &options, on_complete))
}
