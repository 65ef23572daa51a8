//! 静态图像读取与简单统计

use std::path::Path;

use anyhow::{Context, Result};
use async_fs as fs;
use image::{DynamicImage, RgbaImage};

/// 从文件路径异步读取并解码图片
///
/// # Errors
///
/// - 文件无法读取
/// - 内容不是支持的图片格式
pub async fn load_image_async(path: &Path) -> Result<DynamicImage> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("无法读取图片: {}", path.display()))?;
    image::load_from_memory(&bytes).with_context(|| format!("无法解码图片: {}", path.display()))
}

/// RGBA8 图像的平均亮度（Rec. 601，0..=255），空图像返回 0
#[must_use]
pub fn mean_luma(image: &RgbaImage) -> f64 {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = image
        .pixels()
        .map(|px| {
            let [r, g, b, _] = px.0;
            0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
        })
        .sum();
    sum / count as f64
}

/// 像素亮度的标准差，用于衡量对比度
#[must_use]
pub fn luma_spread(image: &RgbaImage) -> f64 {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return 0.0;
    }
    let mean = mean_luma(image);
    let var: f64 = image
        .pixels()
        .map(|px| {
            let [r, g, b, _] = px.0;
            let l = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
            (l - mean) * (l - mean)
        })
        .sum::<f64>()
        / count as f64;
    var.sqrt()
}
