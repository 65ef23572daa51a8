//! 视频容器：打开文件、定位视频轨道、读取时长与帧率

use std::path::Path;

use ffmpeg_next as ffmpeg;
use tracing::debug;

use super::FfmpegFrameReader;
use crate::error::ExtractError;
use crate::frame::AssetMetadata;

/// 容器级时长的时间基（`AV_TIME_BASE`，微秒）
const CONTAINER_TIME_BASE: f64 = 1_000_000.0;

/// 已打开的只读视频容器
///
/// 每次提取打开一次，读取完所有帧后丢弃
pub struct VideoAsset {
    /// 容器输入上下文
    input: ffmpeg::format::context::Input,
    /// 视频轨道索引
    stream_index: usize,
    /// 视频轨道时间基
    time_base: ffmpeg::Rational,
    /// 元数据
    metadata: AssetMetadata,
}

impl VideoAsset {
    /// 打开视频文件并定位第一条视频轨道
    ///
    /// # Errors
    ///
    /// - `FFmpeg` 初始化失败
    /// - 文件无法打开或不是可识别的容器
    /// - 容器中没有视频轨道
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        ffmpeg::init().map_err(ExtractError::Init)?;

        let input = ffmpeg::format::input(path).map_err(|source| ExtractError::AssetOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let (stream_index, time_base, stream_duration, frame_rate) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or(ExtractError::NoVideoTrack)?;
            let frame_rate = positive_ratio(stream.avg_frame_rate())
                .or_else(|| positive_ratio(stream.rate()))
                .unwrap_or(0.0);
            let time_base = stream.time_base();
            let stream_duration = (stream.duration() > 0)
                .then(|| stream.duration() as f64 * f64::from(time_base));
            (stream.index(), time_base, stream_duration, frame_rate)
        };

        // 优先使用容器时长，缺失时退回视频轨道时长
        let duration = (input.duration() > 0)
            .then(|| input.duration() as f64 / CONTAINER_TIME_BASE)
            .or(stream_duration)
            .unwrap_or(0.0);

        let metadata = AssetMetadata {
            duration,
            frame_rate,
        };
        debug!(
            path = %path.display(),
            stream_index,
            duration,
            frame_rate,
            "视频容器已打开"
        );

        Ok(Self {
            input,
            stream_index,
            time_base,
            metadata,
        })
    }

    /// 为视频轨道创建顺序帧读取器（输出 BGRA8）
    ///
    /// # Errors
    ///
    /// - 解码器上下文无法创建
    /// - 视频尺寸无效
    pub fn into_reader(self) -> Result<FfmpegFrameReader, ExtractError> {
        let decoder = {
            let stream = self
                .input
                .stream(self.stream_index)
                .ok_or_else(|| ExtractError::ReaderInit("视频轨道已失效".into()))?;
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| ExtractError::ReaderInit(format!("无法创建解码器上下文: {e}")))?;
            context
                .decoder()
                .video()
                .map_err(|e| ExtractError::ReaderInit(format!("无法创建视频解码器: {e}")))?
        };

        if decoder.width() == 0 || decoder.height() == 0 {
            return Err(ExtractError::ReaderInit(format!(
                "视频尺寸无效: {}x{}",
                decoder.width(),
                decoder.height()
            )));
        }

        Ok(FfmpegFrameReader::new(
            self.input,
            decoder,
            self.stream_index,
            self.time_base,
            self.metadata,
        ))
    }
}

/// 分子分母均为正时返回比值
fn positive_ratio(r: ffmpeg::Rational) -> Option<f64> {
    (r.numerator() > 0 && r.denominator() > 0)
        .then(|| f64::from(r.numerator()) / f64::from(r.denominator()))
}
