//! # 离屏栅格化
//!
//! ## 设计思路
//!
//! 把源图绘制到精确为目标尺寸的画布上，再按目标格式编码。
//! 需要压平时先整幅填充白色、再绘制源图，保证透明区域合成到白底上，
//! 不会残留未定义或黑色像素。
//!
//! ## 实现思路
//!
//! - 画布尺寸为 0 或字节数溢出时视为无法获取画布（`Raster`）
//! - 缩放走 `fast_image_resize`，失败回退 `image::resize_exact`
//! - JPEG：质量 `[0,1]` 映射为编码器质量 `1..=100`
//! - PNG：无损，忽略质量参数

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, Rgba, RgbaImage};

use super::resize::resize_rgba;
use super::source::OutputMime;
use super::ImageError;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 单次栅格化参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterRequest {
    pub width: u32,
    pub height: u32,
    /// 是否压平到白底。
    pub flatten: bool,
    pub mime: OutputMime,
    /// 有损质量 `[0, 1]`，PNG 忽略。
    pub quality: f32,
}

/// 绘制并编码，返回编码后的字节。
pub fn rasterize(
    image: &DynamicImage,
    request: &RasterRequest,
    filter: FilterType,
) -> Result<Vec<u8>, ImageError> {
    check_surface(request.width, request.height)?;

    let scaled = resize_rgba(image, request.width, request.height, filter);

    let surface = if request.flatten {
        let mut canvas = RgbaImage::from_pixel(request.width, request.height, WHITE);
        imageops::overlay(&mut canvas, &scaled, 0, 0);
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
    } else {
        DynamicImage::ImageRgba8(scaled)
    };

    encode_surface(&surface, request.mime, request.quality)
}

/// 质量 `[0,1]` 到 JPEG 编码器质量的映射。
pub(crate) fn jpeg_quality(quality: f32) -> u8 {
    ((quality * 100.0).round() as i32).clamp(1, 100) as u8
}

fn check_surface(width: u32, height: u32) -> Result<usize, ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::Raster(format!(
            "无法创建 {}x{} 画布",
            width, height
        )));
    }

    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| ImageError::Raster("画布尺寸导致内存溢出风险".to_string()))
}

fn encode_surface(
    surface: &DynamicImage,
    mime: OutputMime,
    quality: f32,
) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();

    match mime {
        OutputMime::Jpeg => {
            let rgb = surface.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality));
            encoder
                .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(|e| ImageError::Encode(format!("JPEG 编码失败：{}", e)))?;
        }
        OutputMime::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                CompressionType::Best,
                PngFilterType::Adaptive,
            );
            surface
                .write_with_encoder(encoder)
                .map_err(|e| ImageError::Encode(format!("PNG 编码失败：{}", e)))?;
        }
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat};

    fn request(width: u32, height: u32, flatten: bool, mime: OutputMime) -> RasterRequest {
        RasterRequest {
            width,
            height,
            flatten,
            mime,
            quality: 0.8,
        }
    }

    fn transparent_red(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 0])))
    }

    #[test]
    fn jpeg_output_has_exact_target_dimensions() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(200, 100, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, 90, 255])
        }));

        let bytes = rasterize(&img, &request(50, 25, false, OutputMime::Jpeg), FilterType::Triangle)
            .expect("rasterize should succeed");

        assert_eq!(image::guess_format(&bytes).ok(), Some(ImageFormat::Jpeg));
        let decoded = image::load_from_memory(&bytes).expect("decode output");
        assert_eq!(decoded.dimensions(), (50, 25));
    }

    #[test]
    fn flatten_composites_transparency_onto_white() {
        let bytes = rasterize(
            &transparent_red(16, 16),
            &request(16, 16, true, OutputMime::Png),
            FilterType::Triangle,
        )
        .expect("rasterize should succeed");

        let decoded = image::load_from_memory(&bytes).expect("decode output");
        assert!(!decoded.color().has_alpha());
        assert!(decoded.to_rgba8().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn flatten_blends_semi_transparent_pixels() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 128])));

        let bytes = rasterize(&img, &request(4, 4, true, OutputMime::Png), FilterType::Nearest)
            .expect("rasterize should succeed");

        let decoded = image::load_from_memory(&bytes).expect("decode output").to_rgb8();
        let gray = decoded.get_pixel(1, 1).0[0];
        assert!((120..=135).contains(&gray), "unexpected blended value {gray}");
    }

    #[test]
    fn png_without_flatten_keeps_alpha() {
        let bytes = rasterize(
            &transparent_red(8, 8),
            &request(8, 8, false, OutputMime::Png),
            FilterType::Triangle,
        )
        .expect("rasterize should succeed");

        let decoded = image::load_from_memory(&bytes).expect("decode output").to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn png_ignores_quality() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(32, 32, |x, y| {
            Rgba([(x * 7) as u8, (y * 5) as u8, 40, 255])
        }));

        let mut low = request(32, 32, false, OutputMime::Png);
        low.quality = 0.1;
        let mut high = low;
        high.quality = 0.95;

        let low_bytes = rasterize(&img, &low, FilterType::Triangle).expect("low");
        let high_bytes = rasterize(&img, &high, FilterType::Triangle).expect("high");
        assert_eq!(low_bytes, high_bytes);
    }

    #[test]
    fn zero_sized_surface_is_a_raster_error() {
        let result = rasterize(
            &transparent_red(8, 8),
            &request(0, 8, false, OutputMime::Jpeg),
            FilterType::Triangle,
        );

        assert!(matches!(result, Err(ImageError::Raster(_))));
    }

    #[test]
    fn jpeg_quality_mapping_is_clamped() {
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(0.4), 40);
        assert_eq!(jpeg_quality(0.7), 70);
        assert_eq!(jpeg_quality(1.0), 100);
    }
}
