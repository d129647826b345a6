//! # 透明度检测
//!
//! ## 设计思路
//!
//! 只需判断“是否存在 alpha < 255 的像素”，无需全分辨率扫描：
//! 先降采样到不超过 `sample_size × sample_size`，再逐个检查 alpha 字节。
//!
//! ## 实现思路
//!
//! 1. 颜色类型本身不含 alpha 通道时直接判定为不透明
//! 2. 使用面积平均（Box）降采样，半透明像素会拉低所在采样格的 alpha
//! 3. 扫描每第 4 个字节，命中即返回
//! 4. 采样失败时按“有透明”处理，迫使后续走压平白底路径

use fast_image_resize as fr;
use image::{DynamicImage, RgbaImage};

use super::planner::fit_within;
use super::resize::try_fast_resize;
use super::ImageError;

/// 默认采样边长上限。
pub const TRANSPARENCY_SAMPLE_SIZE: u32 = 100;

/// 判断图片是否含有透明像素。
///
/// # 示例
/// ```rust
/// use critique_payload::image_pipeline::detect_transparency;
/// use image::{DynamicImage, Rgba, RgbaImage};
///
/// let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
/// assert!(detect_transparency(&img, 100));
/// ```
pub fn detect_transparency(image: &DynamicImage, sample_size: u32) -> bool {
    detect_transparency_with(image, sample_size, box_sample)
}

/// 面积平均降采样。
fn box_sample(image: &DynamicImage, width: u32, height: u32) -> Result<RgbaImage, ImageError> {
    try_fast_resize(image, width, height, fr::ResizeAlg::Convolution(fr::FilterType::Box))
}

/// 采样器可替换的检测实现；采样失败时返回 `true`。
pub(crate) fn detect_transparency_with<S>(image: &DynamicImage, sample_size: u32, sampler: S) -> bool
where
    S: FnOnce(&DynamicImage, u32, u32) -> Result<RgbaImage, ImageError>,
{
    if !image.color().has_alpha() {
        return false;
    }

    let (width, height) = (image.width(), image.height());
    let (sample_width, sample_height) = sample_dimensions(width, height, sample_size);

    let sampled = if (sample_width, sample_height) == (width, height) {
        image.to_rgba8()
    } else {
        match sampler(image, sample_width, sample_height) {
            Ok(sampled) => sampled,
            Err(err) => {
                log::warn!("⚠️ 透明度采样失败，按含透明处理：{}", err);
                return true;
            }
        }
    };

    let translucent = has_translucent_alpha(sampled.as_raw());
    log::debug!(
        "🔍 透明度检测：{}x{} 采样 {}x{} -> {}",
        width,
        height,
        sample_width,
        sample_height,
        translucent
    );

    translucent
}

/// 采样尺寸：等比缩放到不超过 `max_side × max_side`。
pub(crate) fn sample_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    fit_within(width, height, max_side, max_side)
}

/// 扫描 RGBA 字节流中的 alpha 分量。
fn has_translucent_alpha(rgba: &[u8]) -> bool {
    rgba.iter().skip(3).step_by(4).any(|&alpha| alpha < u8::MAX)
}
