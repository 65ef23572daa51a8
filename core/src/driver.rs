//! 管线驱动：接收视频文件，启动提取，把结果交给下游消费者

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::thread::JoinHandle;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ExtractOptions;
use crate::enhancer::{FrameEnhance, FrameEnhancer};
use crate::extractor::{BoundedPool, FrameExtractor, spawn_extraction};
use crate::frame::{EnhancedImage, ExtractionResult};

/// 可接受的视频容器扩展名
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["mov", "mp4"];

/// 扩展名是否为支持的视频容器（不区分大小写）
#[must_use]
pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

/// 检查扩展名，不支持时返回带路径与可选格式的错误
///
/// # Errors
///
/// 扩展名不是 [`SUPPORTED_EXTENSIONS`] 之一
pub fn ensure_supported_video(path: &Path) -> Result<()> {
    if !is_supported_video(path) {
        bail!(
            "不支持的视频格式: {}（仅支持 {}）",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }
    Ok(())
}

/// 时间轴末端标签，例如 `"12.34 seconds, 370 frames"`
#[must_use]
pub fn timeline_label(duration: f64, total_frames: u64) -> String {
    format!("{duration:.2} seconds, {total_frames} frames")
}

/// 发往下游的消息
#[derive(Debug)]
pub enum PipelineMsg {
    /// 一次提取完成
    FramesReady {
        /// 视频路径
        source: PathBuf,
        /// 提取结果
        result: ExtractionResult,
    },
}

/// 提取结果摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionSummary {
    /// 视频路径
    pub source: String,
    /// 产出的图像数
    pub frames: usize,
    /// 帧率
    pub frame_rate: f64,
    /// 时长（秒）
    pub duration: f64,
    /// 由元数据推算的总帧数
    pub total_frames: u64,
    /// 未产出的帧数
    pub dropped: u64,
    /// 第一帧序号
    pub first_index: Option<u64>,
    /// 最后一帧序号
    pub last_index: Option<u64>,
    /// 时间轴标签
    pub label: String,
}

impl ExtractionSummary {
    /// 由提取结果生成摘要
    #[must_use]
    pub fn from_result(source: &Path, result: &ExtractionResult) -> Self {
        let frames = result.images.len();
        Self {
            source: source.display().to_string(),
            frames,
            frame_rate: result.frame_rate,
            duration: result.duration,
            total_frames: result.total_frames,
            dropped: result.total_frames.saturating_sub(frames as u64),
            first_index: result.images.first().map(|img| img.index),
            last_index: result.images.last().map(|img| img.index),
            label: timeline_label(result.duration, result.total_frames),
        }
    }
}

/// 管线驱动
///
/// 每次 `submit` 在独立线程上提取，完成后通过通道发送 [`PipelineMsg::FramesReady`]
pub struct PipelineDriver<E = FrameEnhancer> {
    extractor: Arc<FrameExtractor<E>>,
    options: ExtractOptions,
    output_tx: SyncSender<PipelineMsg>,
}

impl<E: FrameEnhance + 'static> PipelineDriver<E> {
    /// 创建驱动
    #[must_use]
    pub fn new(enhancer: Arc<E>, options: ExtractOptions, output_tx: SyncSender<PipelineMsg>) -> Self {
        Self {
            extractor: Arc::new(FrameExtractor::new(enhancer)),
            options,
            output_tx,
        }
    }

    /// 提交一个视频文件
    ///
    /// # Errors
    ///
    /// - 扩展名不是支持的视频容器
    /// - 提取线程创建失败
    pub fn submit(&self, path: PathBuf) -> Result<JoinHandle<()>> {
        ensure_supported_video(&path)?;

        info!(path = %path.display(), "提交视频");
        let tx = self.output_tx.clone();
        let source = path.clone();
        spawn_extraction(
            Arc::clone(&self.extractor),
            path,
            self.options,
            move |result| {
                if tx.send(PipelineMsg::FramesReady { source, result }).is_err() {
                    warn!("结果接收端已关闭，丢弃提取结果");
                }
            },
        )
        .context("无法创建提取线程")
    }

    /// 以新的对比度重新增强已提取的图像
    ///
    /// 保留序号与时间戳，失败的图像被丢弃，结果按序号排序
    #[must_use]
    pub fn reenhance(&self, images: &[EnhancedImage], contrast: f32) -> Vec<EnhancedImage> {
        let pool = BoundedPool::new(self.options.workers(), self.options.batch());
        let enhancer = self.extractor.enhancer().as_ref();
        let mut out = pool.run(images, |src: &EnhancedImage| {
            enhancer
                .enhance_image(&src.image, contrast)
                .map(|image| EnhancedImage {
                    index: src.index,
                    timestamp: src.timestamp,
                    image,
                })
        });
        out.sort_unstable_by_key(|img| img.index);
        out
    }
}
