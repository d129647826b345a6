//! # 体积与格式校验
//!
//! ## 设计思路
//!
//! 视觉接口只接受 `image/jpeg` 与 `image/png`，且有硬性体积上限。
//! 校验在两处调用：压缩完成后立即校验产物，交付前再对交付结果重新度量一次。
//!
//! ## 实现思路
//!
//! - 字节：先比体积，再比声明 MIME 与文件签名（`infer`）是否一致
//! - Data URL：按 `base64 长度 × 0.75` 估算体积，不解码、不联网即可拒绝超限载荷
//! - `blob:` 地址：从进程内对象表读取后按字节校验
//! - `http(s)` 地址：复用加载模块的安全下载（限额读取），再按字节校验

use base64::{Engine as _, engine::general_purpose};

use super::object_store::LocalObjectStore;
use super::source::{OutputMime, TransportPayload};
use super::{ImageError, PayloadPipeline};

/// 视觉接口接受的 MIME 集合。
pub const ACCEPTED_MIME_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// 校验内存中的载荷。
///
/// # 示例
/// ```rust
/// use critique_payload::image_pipeline::{validate_buffer, ImageError};
///
/// let err = validate_buffer(&[0u8; 16], "image/jpeg", 8).unwrap_err();
/// assert!(matches!(err, ImageError::PayloadTooLarge { size: 16, limit: 8 }));
/// ```
pub fn validate_buffer(bytes: &[u8], declared_mime: &str, limit: u64) -> Result<OutputMime, ImageError> {
    let size = bytes.len() as u64;
    if size > limit {
        return Err(ImageError::PayloadTooLarge { size, limit });
    }

    let declared = accepted_mime(declared_mime)?;

    let sniffed = infer::get(bytes)
        .map(|kind| kind.mime_type())
        .ok_or_else(|| ImageError::UnsupportedFormat("无法识别载荷的文件签名".to_string()))?;

    if OutputMime::from_mime(sniffed) != Some(declared) {
        return Err(ImageError::UnsupportedFormat(format!(
            "声明类型 {} 与实际内容 {} 不一致",
            declared.as_str(),
            sniffed
        )));
    }

    Ok(declared)
}

/// 按 Base64 长度估算 Data URL 的载荷体积（`len × 0.75`，不计 `=` 填充）。
pub fn estimate_data_url_size(data_url: &str) -> Result<u64, ImageError> {
    let (_, payload) = split_data_url(data_url)?;
    Ok(base64_decoded_len(payload))
}

/// 校验 Data URL：体积先于解码检查。
pub fn validate_data_url(data_url: &str, limit: u64) -> Result<OutputMime, ImageError> {
    let (mime, payload) = split_data_url(data_url)?;

    let size = base64_decoded_len(payload);
    if size > limit {
        return Err(ImageError::PayloadTooLarge { size, limit });
    }

    let declared = accepted_mime(mime)?;

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ImageError::InvalidFormat(format!("Data URL Base64 解码失败：{}", e)))?;

    validate_buffer(&bytes, declared.as_str(), limit)
}

fn base64_decoded_len(payload: &str) -> u64 {
    payload.trim_end_matches('=').len() as u64 * 3 / 4
}

fn accepted_mime(mime: &str) -> Result<OutputMime, ImageError> {
    OutputMime::from_mime(mime).ok_or_else(|| {
        ImageError::UnsupportedFormat(format!(
            "不支持的类型：{}（仅接受 {}）",
            mime,
            ACCEPTED_MIME_TYPES.join(" / ")
        ))
    })
}

/// 拆分 `data:<mime>;base64,<payload>`。
fn split_data_url(data_url: &str) -> Result<(&str, &str), ImageError> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| ImageError::InvalidFormat("不是 Data URL".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::InvalidFormat("Data URL 缺少数据段".to_string()))?;

    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| ImageError::InvalidFormat("Data URL 缺少 base64 标记".to_string()))?;

    Ok((mime, payload))
}

impl PayloadPipeline {
    /// 校验任意交付地址（`data:` / `blob:` / `http(s)`）。
    pub async fn validate_locator(&self, locator: &str, limit: u64) -> Result<OutputMime, ImageError> {
        if locator.starts_with("data:") {
            return validate_data_url(locator, limit);
        }

        if LocalObjectStore::is_object_url(locator) {
            let object = self.objects.resolve(locator)?;
            return validate_buffer(&object.bytes, object.mime.as_str(), limit);
        }

        let config = self.config_snapshot()?;
        let body = Self::fetch_remote(locator, &config, limit).await?;
        let declared = body
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        log::debug!(
            "🔎 远程载荷校验：{} {} 字节 {}",
            Self::redact_url_for_log(locator),
            body.bytes.len(),
            declared
        );

        validate_buffer(&body.bytes, &declared, limit)
    }

    /// 交付前的最终校验：重新度量交付结果。
    pub async fn validate_for_handoff(&self, payload: &TransportPayload) -> Result<(), ImageError> {
        let ceiling = self.config_snapshot()?.handoff_ceiling_bytes;

        let measured = match payload {
            TransportPayload::Inline(inner) => validate_buffer(&inner.bytes, inner.mime.as_str(), ceiling)?,
            TransportPayload::DataUrl { url, .. } => validate_data_url(url, ceiling)?,
            TransportPayload::Uploaded { locator, size, .. } => {
                if *size > ceiling {
                    return Err(ImageError::PayloadTooLarge {
                        size: *size,
                        limit: ceiling,
                    });
                }
                self.validate_locator(locator, ceiling).await?
            }
        };

        if measured != payload.mime() {
            return Err(ImageError::UnsupportedFormat(format!(
                "交付类型 {} 与实际内容 {} 不一致",
                payload.mime().as_str(),
                measured.as_str()
            )));
        }

        log::debug!("✅ 交付校验通过 - {} 字节 {}", payload.size(), measured.as_str());
        Ok(())
    }
}
