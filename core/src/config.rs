//! 管线配置定义与解析

use std::num::NonZeroUsize;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// 默认对比度（内核的恒等点）
pub const DEFAULT_CONTRAST: f32 = 1.0;

/// 管线运行时配置
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// 帧提取参数
    pub extract: ExtractOptions,
    /// 增强参数
    pub enhance: EnhanceOptions,
}

/// 帧提取参数
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractOptions {
    /// 每隔多少个解码帧取一帧（1 表示全部）
    pub frame_interval: usize,
    /// 并发工作线程数
    pub max_concurrent_tasks: usize,
    /// 每批分发的帧数
    pub batch_size: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            frame_interval: 1,
            max_concurrent_tasks: 4,
            batch_size: 8,
        }
    }
}

impl ExtractOptions {
    /// 采样间隔（0 视为 1）
    #[must_use]
    pub fn interval(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.frame_interval).unwrap_or(NonZeroUsize::MIN)
    }

    /// 工作线程数（0 视为 1）
    #[must_use]
    pub fn workers(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_concurrent_tasks).unwrap_or(NonZeroUsize::MIN)
    }

    /// 批大小（0 视为 1）
    #[must_use]
    pub fn batch(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size).unwrap_or(NonZeroUsize::MIN)
    }
}

/// 增强参数
#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct EnhanceOptions {
    /// 对比度系数，常用范围 0.0–3.0
    pub contrast: f32,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            contrast: DEFAULT_CONTRAST,
        }
    }
}

/// 从 TOML 字符串解析管线配置
///
/// # Errors
///
/// - TOML 解析失败
/// - 配置字段反序列化失败
pub fn parse_config_str(s: &str) -> Result<PipelineConfig> {
    let cfg: PipelineConfig = toml::from_str(s)?;
    Ok(cfg)
}

/// 从指定路径加载管线配置（TOML）
///
/// # Errors
///
/// - 读取文件失败
/// - TOML 解析失败
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
    parse_config_str(&s)
}
