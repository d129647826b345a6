//! # 缩放工具
//!
//! 统一使用 `fast_image_resize` 做 RGBA 缩放；失败时由调用方决定回退策略：
//! 栅格化回退到 `image::resize_exact`，透明度检测则按“有透明”保守处理。

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};

use super::ImageError;

/// 缩放到精确尺寸，`fast_image_resize` 失败时回退 `image::resize_exact`。
pub(crate) fn resize_rgba(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> RgbaImage {
    if image.width() == target_width && image.height() == target_height {
        return image.to_rgba8();
    }

    let alg = fr::ResizeAlg::Convolution(to_fast_filter(filter));
    match try_fast_resize(image, target_width, target_height, alg) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!(
                "⚠️ fast_image_resize 缩放失败，回退 image::resize_exact：{}",
                err
            );
            image
                .resize_exact(target_width, target_height, filter)
                .to_rgba8()
        }
    }
}

/// 使用 `fast_image_resize` 缩放，不做回退。
pub(crate) fn try_fast_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    alg: fr::ResizeAlg,
) -> Result<RgbaImage, ImageError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
            .map_err(|e| ImageError::Raster(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new().resize_alg(alg);

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Raster(format!("fast_image_resize 执行失败：{}", e)))?;

    RgbaImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| ImageError::Raster("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}
