//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”、“流水线中间结果”与“交付结果”解耦：
//! - `ImageSource` 表示外部来源语义
//! - `RawImageData` 表示已加载但未解码的字节
//! - `SourceImage` 表示已解码的位图（单次调用独占）
//! - `EncodedPayload` / `TransportPayload` 表示交给调用方的结果

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use image::DynamicImage;
use once_cell::unsync::OnceCell;

use super::object_store::ObjectUrl;
use super::transparency::detect_transparency;

/// 图片输入来源。
pub enum ImageSource {
    /// 网络地址来源。
    Url(String),
    /// Data URL 或纯 Base64 字符串。
    DataUrl(String),
    /// 本地文件路径来源。
    FilePath(String),
    /// 调用方已持有的原始字节。
    Bytes(Vec<u8>),
    /// 进程内临时对象地址；流水线结束时随来源一起释放。
    Object(ObjectUrl),
}

impl ImageSource {
    /// 按输入文本识别来源：`http(s)://` 为网络地址，`data:` 为 Data URL，其余视为本地路径。
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.get(..8).unwrap_or(trimmed).to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else if lower.starts_with("data:") {
            Self::DataUrl(trimmed.to_string())
        } else {
            Self::FilePath(input.to_string())
        }
    }

    pub(crate) fn hint(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::DataUrl(_) => "data-url",
            Self::FilePath(_) => "file",
            Self::Bytes(_) => "bytes",
            Self::Object(_) => "object-url",
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 已解码的源图。
///
/// 透明度在首次查询时计算并缓存，之后复用。
pub struct SourceImage {
    image: DynamicImage,
    transparency: OnceCell<bool>,
    origin: &'static str,
}

impl SourceImage {
    pub fn new(image: DynamicImage, origin: &'static str) -> Self {
        Self {
            image,
            transparency: OnceCell::new(),
            origin,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn origin(&self) -> &'static str {
        self.origin
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// 是否存在透明像素（按 `sample_size` 降采样检测，结果缓存）。
    pub fn has_transparency(&self, sample_size: u32) -> bool {
        *self
            .transparency
            .get_or_init(|| detect_transparency(&self.image, sample_size))
    }
}

/// 视觉接口接受的输出格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMime {
    Jpeg,
    Png,
}

impl OutputMime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// 仅识别接受集合内的 MIME；其余返回 `None`。
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }
}

/// 压缩产物。
///
/// 不变量：`size() <= max_size_bytes`，否则流水线已显式失败。
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    pub bytes: Bytes,
    pub mime: OutputMime,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    /// 实际执行的栅格化次数（含应急缩小）。
    pub attempts: u32,
}

impl EncodedPayload {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime.as_str(),
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// 交付方式（调用方策略）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// 直接返回字节。
    Inline,
    /// 转为 Data URL。
    DataUrl,
    /// 上传到外部对象存储，返回可公开访问的地址。
    Upload,
}

/// 交付结果。
#[derive(Debug, Clone)]
pub enum TransportPayload {
    Inline(EncodedPayload),
    DataUrl {
        url: String,
        mime: OutputMime,
        size: u64,
    },
    Uploaded {
        locator: String,
        mime: OutputMime,
        size: u64,
    },
}

impl TransportPayload {
    pub fn mime(&self) -> OutputMime {
        match self {
            Self::Inline(payload) => payload.mime,
            Self::DataUrl { mime, .. } | Self::Uploaded { mime, .. } => *mime,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Inline(payload) => payload.size(),
            Self::DataUrl { size, .. } | Self::Uploaded { size, .. } => *size,
        }
    }

    /// 可传递给外部接口的地址（内联字节没有地址）。
    pub fn locator(&self) -> Option<&str> {
        match self {
            Self::Inline(_) => None,
            Self::DataUrl { url, .. } => Some(url),
            Self::Uploaded { locator, .. } => Some(locator),
        }
    }
}
