//! 错误类型定义
//!
//! - `BackendError`：计算后端构造阶段的致命错误
//! - `ExtractError`：视频打开与逐帧读取阶段的错误

use std::path::PathBuf;

use ffmpeg_next as ffmpeg;

/// 计算后端错误
///
/// 只在构造 `ComputeBackend` 时出现，调用方应视为不可恢复
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    /// 没有可用的 GPU 适配器
    #[error("没有可用的 GPU 设备: {0}")]
    NoDevice(String),

    /// 适配器拒绝创建逻辑设备
    #[error("GPU 设备创建失败: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// 纹理尺寸超过设备上限
    #[error("纹理尺寸 {width}x{height} 超过设备上限 {limit}")]
    TextureTooLarge {
        /// 请求的宽度
        width: u32,
        /// 请求的高度
        height: u32,
        /// 设备的二维纹理边长上限
        limit: u32,
    },

    /// 输入与输出纹理尺寸不一致
    #[error("输入纹理 {input:?} 与输出纹理 {output:?} 尺寸不一致")]
    ExtentMismatch {
        /// 输入尺寸（宽, 高）
        input: (u32, u32),
        /// 输出尺寸（宽, 高）
        output: (u32, u32),
    },

    /// 错误作用域捕获到的设备错误（验证失败或显存不足）
    #[error("GPU 操作 {step} 失败: {message}")]
    Device {
        /// 出错的步骤
        step: &'static str,
        /// 设备报告的错误
        message: String,
    },

    /// 纹理读回时映射暂存缓冲失败
    #[error("纹理读回失败: {0}")]
    Readback(String),

    /// 等待 GPU 完成时出错
    #[error("等待 GPU 完成失败: {0}")]
    Poll(#[from] wgpu::PollError),
}

/// 视频解码错误
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// `FFmpeg` 库初始化失败
    #[error("FFmpeg 初始化失败: {0}")]
    Init(#[source] ffmpeg::Error),

    /// 无法打开视频容器
    #[error("无法打开视频文件 {path}: {source}")]
    AssetOpen {
        /// 视频路径
        path: PathBuf,
        /// 底层错误
        #[source]
        source: ffmpeg::Error,
    },

    /// 容器中没有视频轨道
    #[error("未找到视频轨道")]
    NoVideoTrack,

    /// 解码会话无法建立
    #[error("无法创建帧读取器: {0}")]
    ReaderInit(String),

    /// 单个数据包解码失败
    #[error("第 {position} 帧解码失败: {source}")]
    FrameDecode {
        /// 读取位置
        position: u64,
        /// 底层错误
        #[source]
        source: ffmpeg::Error,
    },

    /// 单帧像素缓冲无法取得
    #[error("第 {position} 帧像素缓冲复制失败")]
    FrameCopy {
        /// 读取位置
        position: u64,
    },
}

impl ExtractError {
    /// 是否为整个视频级别的失败（而非单帧失败）
    #[must_use]
    pub const fn is_asset_level(&self) -> bool {
        matches!(
            self,
            Self::Init(_) | Self::AssetOpen { .. } | Self::NoVideoTrack | Self::ReaderInit(_)
        )
    }
}
