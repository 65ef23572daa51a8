//! `FFmpeg` 顺序帧读取器（输出 BGRA8）

use ffmpeg_next as ffmpeg;

use crate::error::ExtractError;
use crate::frame::{AssetMetadata, BYTES_PER_PIXEL, PixelBuffer};
use crate::media::FrameSource;

/// 像素格式转换器，解码帧格式或尺寸变化时重建
struct Scaler {
    context: ffmpeg::software::scaling::Context,
    format: ffmpeg::format::Pixel,
    width: u32,
    height: u32,
}

/// 顺序读取视频轨道的帧
///
/// 每次 `read_next` 返回下一帧解码结果，读完返回 `Ok(None)`
pub struct FfmpegFrameReader {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<Scaler>,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    metadata: AssetMetadata,
    /// 已解码帧数
    position: u64,
    /// 是否已向解码器发送 EOF
    flushed: bool,
}

impl FfmpegFrameReader {
    pub(super) fn new(
        input: ffmpeg::format::context::Input,
        decoder: ffmpeg::decoder::Video,
        stream_index: usize,
        time_base: ffmpeg::Rational,
        metadata: AssetMetadata,
    ) -> Self {
        Self {
            input,
            decoder,
            scaler: None,
            stream_index,
            time_base,
            metadata,
            position: 0,
            flushed: false,
        }
    }

    /// 向解码器送入视频轨道的下一个数据包；没有更多数据包时发送 EOF
    fn feed_packet(&mut self) -> Result<(), ExtractError> {
        let position = self.position;
        let stream_index = self.stream_index;
        let next = self
            .input
            .packets()
            .find(|(stream, _)| stream.index() == stream_index)
            .map(|(_, packet)| packet);

        let sent = match next {
            Some(packet) => self.decoder.send_packet(&packet),
            None => {
                self.flushed = true;
                self.decoder.send_eof()
            }
        };
        sent.map_err(|source| ExtractError::FrameDecode { position, source })
    }

    /// 将解码帧转换为紧密排列的 BGRA8 缓冲
    fn convert(&mut self, frame: &ffmpeg::frame::Video) -> Result<PixelBuffer, ExtractError> {
        let position = self.position;
        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(ExtractError::FrameCopy { position });
        }

        let reuse = self
            .scaler
            .as_ref()
            .is_some_and(|s| s.format == format && s.width == width && s.height == height);
        if !reuse {
            let context = ffmpeg::software::scaling::Context::get(
                format,
                width,
                height,
                ffmpeg::format::Pixel::BGRA,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|source| ExtractError::FrameDecode { position, source })?;
            self.scaler = Some(Scaler {
                context,
                format,
                width,
                height,
            });
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(ExtractError::FrameCopy { position });
        };

        let mut bgra_frame = ffmpeg::frame::Video::empty();
        scaler
            .context
            .run(frame, &mut bgra_frame)
            .map_err(|source| ExtractError::FrameDecode { position, source })?;

        // 按行复制，去掉行尾填充
        let stride = bgra_frame.stride(0);
        let row_len = width as usize * BYTES_PER_PIXEL;
        let data = bgra_frame.data(0);
        let mut bgra = Vec::with_capacity(PixelBuffer::expected_len(width, height));
        for y in 0..height as usize {
            let start = y * stride;
            let row = data
                .get(start..start + row_len)
                .ok_or(ExtractError::FrameCopy { position })?;
            bgra.extend_from_slice(row);
        }

        Ok(PixelBuffer {
            bgra,
            width,
            height,
            timestamp: self.timestamp_of(frame),
        })
    }

    /// 帧时间戳（秒）；缺失 pts 时按帧率推算
    fn timestamp_of(&self, frame: &ffmpeg::frame::Video) -> f64 {
        match frame.timestamp().or_else(|| frame.pts()) {
            Some(pts) => pts as f64 * f64::from(self.time_base),
            None if self.metadata.frame_rate > 0.0 => {
                self.position as f64 / self.metadata.frame_rate
            }
            None => 0.0,
        }
    }
}

impl FrameSource for FfmpegFrameReader {
    fn metadata(&self) -> AssetMetadata {
        self.metadata
    }

    fn read_next(&mut self) -> Result<Option<PixelBuffer>, ExtractError> {
        loop {
            let mut frame = ffmpeg::frame::Video::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => {
                    let converted = self.convert(&frame);
                    self.position += 1;
                    return converted.map(Some);
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    // 需要更多数据包
                    if self.flushed {
                        return Ok(None);
                    }
                    self.feed_packet()?;
                }
                Err(source) => {
                    return Err(ExtractError::FrameDecode {
                        position: self.position,
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ffmpeg::{VideoAsset, fixtures};

    fn read_all(reader: &mut FfmpegFrameReader) -> Vec<PixelBuffer> {
        let mut frames = Vec::new();
        while let Some(buffer) = reader.read_next().unwrap() {
            frames.push(buffer);
        }
        frames
    }

    #[test]
    fn test_reads_every_frame_in_order() {
        let path = fixtures::temp_path("reader.mp4");
        fixtures::encode_clip(&path, 60).unwrap();
        let reader = VideoAsset::open(&path).and_then(VideoAsset::into_reader);
        let _ = std::fs::remove_file(&path);
        let mut reader = reader.unwrap();

        let frames = read_all(&mut reader);
        assert_eq!(frames.len(), 60);
        assert!(frames.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(frames[0].timestamp.abs() < 0.05);
        // 读完之后保持结束状态
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_frames_are_tight_bgra() {
        let path = fixtures::temp_path("bgra.mp4");
        fixtures::encode_clip(&path, 5).unwrap();
        let reader = VideoAsset::open(&path).and_then(VideoAsset::into_reader);
        let _ = std::fs::remove_file(&path);

        let frames = read_all(&mut reader.unwrap());
        assert!(!frames.is_empty());
        for buffer in &frames {
            assert_eq!((buffer.width, buffer.height), fixtures::CLIP_SIZE);
            // 行宽不是 16 的倍数，去掉填充后长度仍精确
            assert!(buffer.is_well_formed());
            // 纯蓝画面：B 高、R 低、不透明
            let center = PixelBuffer::expected_len(buffer.width, buffer.height / 2)
                + (buffer.width as usize / 2) * BYTES_PER_PIXEL;
            let px = &buffer.bgra[center..center + BYTES_PER_PIXEL];
            assert!(px[0] > 200, "{px:?}");
            assert!(px[2] < 60, "{px:?}");
            assert_eq!(px[3], 255);
        }
    }
}
