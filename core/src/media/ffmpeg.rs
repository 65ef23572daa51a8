//! `FFmpeg` 视频解码
//!
//! `VideoAsset` 打开容器并读取元数据，`FfmpegFrameReader` 按顺序输出 BGRA8 帧

mod asset;
#[cfg(test)]
pub(crate) mod fixtures;
mod reader;

pub use asset::VideoAsset;
pub use reader::FfmpegFrameReader;
