//! 帧增强：单张图像 → 输入/输出纹理 → 对比度内核 → 读回图像
//!
//! 每次调用各自分配纹理，可被多个工作线程同时调用。
//! 任一步骤失败都只返回 `None`，由调用方跳过该帧。

use std::sync::Arc;

use image::{DynamicImage, RgbaImage};
use tracing::warn;

use crate::config::DEFAULT_CONTRAST;
use crate::frame::{PixelBuffer, RawFrame};
use crate::gpu::{ComputeBackend, GpuTexture};

/// 帧增强接口
///
/// 提取器与驱动通过此接口调用增强，便于替换实现
pub trait FrameEnhance: Send + Sync {
    /// 增强一帧解码帧，失败返回 `None`
    fn enhance_frame(&self, frame: &RawFrame) -> Option<RgbaImage>;

    /// 以指定对比度增强一张 RGBA8 图像，失败返回 `None`
    fn enhance_image(&self, image: &RgbaImage, contrast: f32) -> Option<RgbaImage>;
}

/// 基于 GPU 计算后端的帧增强器
pub struct FrameEnhancer {
    /// 共享的计算后端
    backend: Arc<ComputeBackend>,
    /// 应用于视频帧的对比度
    contrast: f32,
}

impl FrameEnhancer {
    /// 创建增强器，视频帧使用默认对比度
    #[must_use]
    pub const fn new(backend: Arc<ComputeBackend>) -> Self {
        Self {
            backend,
            contrast: DEFAULT_CONTRAST,
        }
    }

    /// 设置应用于视频帧的对比度
    #[must_use]
    pub fn with_contrast(mut self, contrast: f32) -> Self {
        self.contrast = contrast;
        self
    }

    /// 应用于视频帧的对比度
    #[must_use]
    pub const fn contrast(&self) -> f32 {
        self.contrast
    }

    /// 增强任意 CPU 图像（先转换为 RGBA8）
    #[must_use]
    pub fn enhance(&self, image: &DynamicImage, contrast: f32) -> Option<RgbaImage> {
        if !valid_contrast(contrast) {
            return None;
        }
        let input = self.backend.texture_from_image(image)?;
        self.apply(&input, contrast)
    }

    /// 增强解码得到的 BGRA8 像素缓冲
    #[must_use]
    pub fn enhance_pixel_buffer(&self, buffer: &PixelBuffer, contrast: f32) -> Option<RgbaImage> {
        if !valid_contrast(contrast) {
            return None;
        }
        let input = self.backend.texture_from_pixel_buffer(buffer)?;
        self.apply(&input, contrast)
    }

    /// 分配同尺寸输出纹理、调度内核并读回
    fn apply(&self, input: &GpuTexture, contrast: f32) -> Option<RgbaImage> {
        let output = self.backend.allocate_texture(input.width(), input.height())?;
        if let Err(e) = self.backend.run_kernel(input, &output, contrast) {
            warn!(error = %e, "对比度内核调度失败");
            return None;
        }
        self.backend.image_from_texture(&output)
    }
}

impl FrameEnhance for FrameEnhancer {
    fn enhance_frame(&self, frame: &RawFrame) -> Option<RgbaImage> {
        self.enhance_pixel_buffer(&frame.buffer, self.contrast)
    }

    fn enhance_image(&self, image: &RgbaImage, contrast: f32) -> Option<RgbaImage> {
        if !valid_contrast(contrast) {
            return None;
        }
        let input = self.backend.texture_from_rgba(image)?;
        self.apply(&input, contrast)
    }
}

/// 对比度必须是有限值
fn valid_contrast(contrast: f32) -> bool {
    if contrast.is_finite() {
        true
    } else {
        warn!(contrast, "对比度不是有限值，拒绝增强");
        false
    }
}
