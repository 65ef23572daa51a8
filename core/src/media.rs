//! 媒体处理模块
//!
//! 包含视频解码（`FFmpeg`）与静态图像读取

pub mod ffmpeg;
pub mod image;
mod source;

pub use source::FrameSource;
