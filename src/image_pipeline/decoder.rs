//! # 解码模块
//!
//! 先读 header 尺寸做像素与内存上限检查，再完整解码，
//! 避免恶意输入在解码阶段触发过高的内存开销。

use image::{GenericImageView, ImageFormat};
use std::io::Cursor;

use super::source::{RawImageData, SourceImage};
use super::{ImageError, PipelineConfig};

/// 将原始字节解码为 `SourceImage`。
pub(crate) fn decode_source(raw: RawImageData, config: &PipelineConfig) -> Result<SourceImage, ImageError> {
    let format: ImageFormat = image::guess_format(&raw.bytes)
        .map_err(|e| ImageError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

    let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
    validate_pixel_limits(config, header_width, header_height)?;
    validate_decoded_memory_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory_with_format(&raw.bytes, format)
        .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Decode("图片尺寸为 0".to_string()));
    }
    validate_pixel_limits(config, width, height)?;
    validate_decoded_memory_limits(config, width, height)?;

    log::info!(
        "✅ 图片解码成功 - 来源: {} 格式: {:?} 尺寸: {}x{} 颜色: {:?}",
        raw.source_hint,
        format,
        width,
        height,
        decoded.color()
    );

    Ok(SourceImage::new(decoded, raw.source_hint))
}

/// 仅通过图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?
        .into_dimensions()
        .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
}

fn validate_pixel_limits(config: &PipelineConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn validate_decoded_memory_limits(config: &PipelineConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let estimated = (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(ImageError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}
