//! # 图片载荷流水线（image_pipeline）
//!
//! ## 设计思路
//!
//! 视觉模型接口对输入有硬性约束：体积上限约 5 MB、只接受不透明 JPEG 或 PNG。
//! 该模块把任意用户图片（任意格式、分辨率、是否带透明通道）确定性地压缩为满足约束的载荷，
//! 在预算内尽量保留画质；无法满足时返回带阶段信息的错误，绝不交出超限载荷。
//!
//! - `config`：提供方预设、压缩参数合并校验、运行配置
//! - `planner`：目标尺寸规划（超大图预缩 + 等比收敛）
//! - `transparency`：降采样后的透明度检测
//! - `rasterizer`：离屏绘制、压平白底、编码
//! - `compressor`：收敛循环与应急缩小
//! - `validator`：体积与格式校验（字节 / Data URL / 对象地址 / 远程地址）
//! - `loader` / `decoder`：来源加载与安全解码
//! - `object_store`：进程内 `blob:` 地址与外部上传器
//! - `handler`：统一编排 + 阶段耗时日志
//!
//! ## 调用链
//!
//! ```text
//! 调用方
//!    ↓
//! handler.rs（配置快照 + 编排）
//!    ├─ loader.rs（来源加载 + URL/体积安全校验）
//!    ├─ decoder.rs（header 尺寸 + 像素/内存上限 + 解码）
//!    ├─ compressor.rs（spawn_blocking）
//!    │    ├─ planner.rs
//!    │    ├─ transparency.rs
//!    │    └─ rasterizer.rs（重复执行）
//!    ├─ validator.rs（压缩后校验）
//!    └─ 交付（内联 / Data URL / 上传）→ validator.rs（交付前复检）
//!    ↓
//! EncodedPayload / TransportPayload 或 ImageError
//! ```

mod compressor;
mod config;
mod decoder;
mod error;
mod handler;
mod loader;
mod object_store;
mod planner;
mod rasterizer;
mod resize;
mod source;
mod transparency;
mod validator;

pub use compressor::{CompressionAttempt, Compressor, EMERGENCY_SCALE, MAX_SCALE_STEP, QUALITY_FLOOR, QUALITY_STEP};
pub use config::{
    CompressionOverrides, CompressionSettings, MAX_ATTEMPTS_LIMIT, MIB, NetworkPolicy, PipelineConfig,
    VisionProvider,
};
pub use error::ImageError;
pub use handler::PayloadPipeline;
pub use object_store::{HttpObjectUploader, LocalObjectStore, ObjectUploader, ObjectUrl, StoredObject};
pub use planner::{PRE_SHRINK_PIXEL_LIMIT, TargetDimensions, plan_dimensions};
pub use rasterizer::{RasterRequest, rasterize};
pub use source::{DeliveryPolicy, EncodedPayload, ImageSource, OutputMime, SourceImage, TransportPayload};
pub use transparency::{TRANSPARENCY_SAMPLE_SIZE, detect_transparency};
pub use validator::{ACCEPTED_MIME_TYPES, estimate_data_url_size, validate_buffer, validate_data_url};
