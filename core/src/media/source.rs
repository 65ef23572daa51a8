//! 顺序帧来源抽象

use crate::error::ExtractError;
use crate::frame::{AssetMetadata, PixelBuffer};

/// 顺序帧来源
///
/// 底层解码会话不能并发读取，只由提取器的生产者线程逐帧拉取
pub trait FrameSource {
    /// 容器元数据（时长、帧率）
    fn metadata(&self) -> AssetMetadata;

    /// 读取下一帧
    ///
    /// 返回 `Ok(Some(..))` 表示成功取得一帧 BGRA8 像素缓冲，
    /// 返回 `Ok(None)` 表示已到达流末尾。
    ///
    /// # Errors
    ///
    /// 单帧解码或复制失败；调用方可以跳过该帧继续读取。
    fn read_next(&mut self) -> Result<Option<PixelBuffer>, ExtractError>;
}
