//! 帧与提取结果的数据模型

use image::RgbaImage;

/// 每像素字节数（BGRA8 / RGBA8）
pub const BYTES_PER_PIXEL: usize = 4;

/// 解码得到的 BGRA8 像素缓冲（紧密排列，无行填充）
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    /// BGRA8 像素数据
    pub bgra: Vec<u8>,
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 显示时间戳（秒）
    pub timestamp: f64,
}

impl PixelBuffer {
    /// 期望的字节长度
    #[must_use]
    pub const fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    /// 缓冲长度与尺寸是否一致且非空
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.bgra.len() == Self::expected_len(self.width, self.height)
    }
}

/// 带序号的原始帧
///
/// 由解码端产生，交给处理它的工作线程独占，转换为输出图像后释放
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// 解码顺序中的位置（从 0 开始，严格递增）
    pub index: u64,
    /// 像素缓冲
    pub buffer: PixelBuffer,
}

/// 增强后的图像，携带来源帧的序号
#[derive(Debug, Clone)]
pub struct EnhancedImage {
    /// 来源帧序号
    pub index: u64,
    /// 来源帧时间戳（秒）
    pub timestamp: f64,
    /// RGBA8 图像
    pub image: RgbaImage,
}

/// 视频容器元数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetMetadata {
    /// 时长（秒）
    pub duration: f64,
    /// 视频轨道的标称帧率
    pub frame_rate: f64,
}

impl AssetMetadata {
    /// 由元数据推算的总帧数：`round(duration × frame_rate)`
    #[must_use]
    pub fn total_frames(&self) -> u64 {
        total_frames(self.duration, self.frame_rate)
    }
}

/// `round(duration × frame_rate)`，非有限或非正值返回 0
#[must_use]
pub fn total_frames(duration: f64, frame_rate: f64) -> u64 {
    let frames = (duration * frame_rate).round();
    if frames.is_finite() && frames > 0.0 {
        frames as u64
    } else {
        0
    }
}

/// 一次提取的最终结果
///
/// 完成时恰好交付一次；打开失败时为空结果
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// 按序号排序的增强图像
    pub images: Vec<EnhancedImage>,
    /// 帧率
    pub frame_rate: f64,
    /// 时长（秒）
    pub duration: f64,
    /// 由元数据推算的总帧数（与实际产出数量无关）
    pub total_frames: u64,
}

impl ExtractionResult {
    /// 失败信号：`([], 0, 0, 0)`
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// 是否为空结果
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// 产出的帧序号列表
    #[must_use]
    pub fn indices(&self) -> Vec<u64> {
        self.images.iter().map(|img| img.index).collect()
    }
}
