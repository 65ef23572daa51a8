//! 测试用媒体文件：纯音频 WAV 与编码生成的短视频

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

/// 生成视频的尺寸；宽度不是 16 的倍数，解码后行尾带填充
pub const CLIP_SIZE: (u32, u32) = (66, 34);

/// 生成视频的帧率
pub const CLIP_FPS: i32 = 30;

/// 纯蓝色在 BT.601 有限范围下的 Y/U/V
const BLUE_YUV: [u8; 3] = [41, 240, 110];

/// 临时目录下带进程号的文件路径
pub fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("pattern_capture_fixture_{}_{name}", std::process::id()));
    path
}

/// 写入 0.1 秒的单声道 16 位 PCM WAV（无视频轨道）
pub fn write_wav(path: &Path) -> io::Result<()> {
    const SAMPLE_RATE: u32 = 8000;
    const SAMPLES: u32 = SAMPLE_RATE / 10;
    let data_len = SAMPLES * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..SAMPLES {
        // 方波
        let sample: i16 = if (i / 20) % 2 == 0 { 4000 } else { -4000 };
        out.extend_from_slice(&sample.to_le_bytes());
    }

    std::fs::File::create(path)?.write_all(&out)
}

/// 用 MPEG-4 Part 2 编码 `frames` 帧纯蓝画面，写入 `path`（容器由扩展名决定）
pub fn encode_clip(path: &Path, frames: i64) -> Result<(), ffmpeg::Error> {
    ffmpeg::init()?;
    let (width, height) = CLIP_SIZE;
    let time_base = ffmpeg::Rational::new(1, CLIP_FPS);

    let mut octx = ffmpeg::format::output(path)?;
    let codec =
        ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4).ok_or(ffmpeg::Error::EncoderNotFound)?;
    let global_header = octx
        .format()
        .flags()
        .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

    let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()?;
    encoder.set_width(width);
    encoder.set_height(height);
    encoder.set_format(ffmpeg::format::Pixel::YUV420P);
    encoder.set_time_base(time_base);
    encoder.set_frame_rate(Some(ffmpeg::Rational::new(CLIP_FPS, 1)));
    if global_header {
        encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
    }
    let mut encoder = encoder.open_as(codec)?;

    let stream_index = {
        let mut ost = octx.add_stream(codec)?;
        ost.set_parameters(&encoder);
        ost.set_time_base(time_base);
        ost.index()
    };
    octx.write_header()?;
    let stream_time_base = octx
        .stream(stream_index)
        .map_or(time_base, |s| s.time_base());

    for pts in 0..frames {
        let mut frame = ffmpeg::frame::Video::new(ffmpeg::format::Pixel::YUV420P, width, height);
        for (plane, value) in BLUE_YUV.into_iter().enumerate() {
            frame.data_mut(plane).fill(value);
        }
        frame.set_pts(Some(pts));
        encoder.send_frame(&frame)?;
        write_packets(&mut encoder, &mut octx, stream_index, time_base, stream_time_base)?;
    }
    encoder.send_eof()?;
    write_packets(&mut encoder, &mut octx, stream_index, time_base, stream_time_base)?;
    octx.write_trailer()
}

/// 取出编码器中已就绪的数据包并写入容器
fn write_packets(
    encoder: &mut ffmpeg::codec::encoder::video::Encoder,
    octx: &mut ffmpeg::format::context::Output,
    stream_index: usize,
    from: ffmpeg::Rational,
    to: ffmpeg::Rational,
) -> Result<(), ffmpeg::Error> {
    let mut packet = ffmpeg::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(stream_index);
        packet.rescale_ts(from, to);
        packet.write_interleaved(octx)?;
    }
    Ok(())
}
