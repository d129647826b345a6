//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `PayloadPipeline` 只负责流程编排与配置管理。处理链路固定为：
//! 1. 读取配置快照，合并本次压缩参数
//! 2. 按来源加载原始字节
//! 3. 解码并在阻塞线程池中执行收敛压缩
//! 4. 校验压缩产物
//! 5. 按交付策略输出，并在交付前重新校验
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<PipelineConfig>>` 支持运行时切换提供方与网络策略。
//! - 单次请求内使用同一配置快照，避免处理中途配置漂移。
//! - 解码与压缩是 CPU 密集型，放到 `spawn_blocking`，不阻塞异步运行时。
//! - 记录 `load/decode/compress/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::compressor::Compressor;
use super::decoder::decode_source;
use super::object_store::{LocalObjectStore, ObjectUploader};
use super::source::{DeliveryPolicy, EncodedPayload, TransportPayload};
use super::validator::validate_buffer;
use super::{CompressionOverrides, ImageError, ImageSource, NetworkPolicy, PipelineConfig, VisionProvider};

/// 载荷流水线。
pub struct PayloadPipeline {
    pub(super) config: Arc<RwLock<PipelineConfig>>,
    pub(super) objects: Arc<LocalObjectStore>,
}

impl Default for PayloadPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl PayloadPipeline {
    /// # 示例
    /// ```rust
    /// use critique_payload::image_pipeline::{PayloadPipeline, PipelineConfig, VisionProvider};
    ///
    /// let pipeline = PayloadPipeline::new(PipelineConfig::default());
    /// pipeline.set_provider(VisionProvider::OpenAi)?;
    /// assert_eq!(pipeline.provider()?, VisionProvider::OpenAi);
    /// # Ok::<(), critique_payload::image_pipeline::ImageError>(())
    /// ```
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            objects: LocalObjectStore::new(),
        }
    }

    /// 获取配置快照。
    pub fn config_snapshot(&self) -> Result<PipelineConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    pub fn object_store(&self) -> &Arc<LocalObjectStore> {
        &self.objects
    }

    /// 切换模型提供方。
    pub fn set_provider(&self, provider: VisionProvider) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.provider = provider;

        let settings = provider.settings();
        log::info!(
            "⚙️ 已切换模型提供方：{}（{}x{}, quality={}, max_size={} 字节）",
            provider.as_str(),
            settings.max_width,
            settings.max_height,
            settings.quality,
            settings.max_size_bytes
        );

        Ok(())
    }

    pub fn provider(&self) -> Result<VisionProvider, ImageError> {
        let config = self
            .config
            .read()
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.provider)
    }

    /// 更新网络安全与超时策略（先校验，后写入）。
    pub fn set_network_policy(&self, policy: NetworkPolicy) -> Result<(), ImageError> {
        policy.validate()?;

        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_network_policy(&policy);

        log::info!(
            "⚙️ 已更新网络策略：allow_private={} resolve_dns={} connect={}s total={}s",
            policy.allow_private_network,
            policy.resolve_dns_for_url_safety,
            policy.connect_timeout,
            policy.download_timeout
        );

        Ok(())
    }

    /// 处理主入口：加载、解码、压缩并校验。
    ///
    /// 返回的载荷保证满足体积上限与格式要求；否则返回带阶段信息的错误。
    pub async fn prepare_payload(
        &self,
        source: ImageSource,
        overrides: &CompressionOverrides,
    ) -> Result<EncodedPayload, ImageError> {
        let config = self.config_snapshot()?;
        let settings = config.compression_settings(overrides)?;
        let limit = settings.max_size_bytes;
        let total_start = Instant::now();

        log::info!(
            "🚀 开始处理图片 - 来源: {} 提供方: {} 上限: {} 字节",
            source.hint(),
            config.provider.as_str(),
            limit
        );

        let load_start = Instant::now();
        let raw = self.load_source(source, &config).await?;
        let load_elapsed = load_start.elapsed();

        let compressor = Compressor::new(settings)
            .with_filter(config.resize_filter)
            .with_sample_size(config.transparency_sample_size);

        let (payload, decode_elapsed, compress_elapsed) = tokio::task::spawn_blocking(move || {
            let decode_start = Instant::now();
            let source = decode_source(raw, &config)?;
            let decode_elapsed = decode_start.elapsed();

            let compress_start = Instant::now();
            let payload = compressor.compress(&source)?;
            Ok::<_, ImageError>((payload, decode_elapsed, compress_start.elapsed()))
        })
        .await
        .map_err(|e| ImageError::Raster(format!("压缩任务异常终止：{}", e)))??;

        validate_buffer(&payload.bytes, payload.mime.as_str(), limit)?;

        log::info!(
            "✅ 图片处理完成 - {} 字节 {} {}x{} attempts={} load={}ms decode={}ms compress={}ms total={}ms",
            payload.size(),
            payload.mime.as_str(),
            payload.width,
            payload.height,
            payload.attempts,
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            compress_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(payload)
    }

    /// 不依赖外部存储的交付（内联字节或 Data URL）。
    pub async fn deliver_local(
        &self,
        payload: EncodedPayload,
        policy: DeliveryPolicy,
    ) -> Result<TransportPayload, ImageError> {
        let transport = match policy {
            DeliveryPolicy::Inline => TransportPayload::Inline(payload),
            DeliveryPolicy::DataUrl => TransportPayload::DataUrl {
                url: payload.to_data_url(),
                mime: payload.mime,
                size: payload.size(),
            },
            DeliveryPolicy::Upload => {
                return Err(ImageError::Upload("未配置对象上传器".to_string()));
            }
        };

        self.validate_for_handoff(&transport).await?;
        Ok(transport)
    }

    /// 按策略交付；`Upload` 使用给定上传器。
    pub async fn deliver<U: ObjectUploader>(
        &self,
        payload: EncodedPayload,
        policy: DeliveryPolicy,
        uploader: &U,
    ) -> Result<TransportPayload, ImageError> {
        if policy != DeliveryPolicy::Upload {
            return self.deliver_local(payload, policy).await;
        }

        let upload_start = Instant::now();
        let mime = payload.mime;
        let size = payload.size();
        let locator = uploader.upload(payload.bytes, mime).await?;

        let transport = TransportPayload::Uploaded { locator, mime, size };
        self.validate_for_handoff(&transport).await?;

        log::info!(
            "✅ 上传交付完成 - {} 字节 upload={}ms",
            size,
            upload_start.elapsed().as_millis()
        );

        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::{ObjectUrl, OutputMime};
    use bytes::Bytes;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    fn png_bytes(width: u32, height: u32, alpha: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, alpha])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode fixture");
        buf
    }

    /// 把上传内容登记到进程内对象表，可选地在末尾追加填充字节模拟上传链路篡改。
    struct StoreUploader {
        store: Arc<LocalObjectStore>,
        padding: usize,
        held: Mutex<Vec<ObjectUrl>>,
    }

    impl StoreUploader {
        fn new(store: &Arc<LocalObjectStore>, padding: usize) -> Self {
            Self {
                store: Arc::clone(store),
                padding,
                held: Mutex::new(Vec::new()),
            }
        }
    }

    impl ObjectUploader for StoreUploader {
        async fn upload(&self, bytes: Bytes, mime: OutputMime) -> Result<String, ImageError> {
            let mut stored = bytes.to_vec();
            stored.resize(stored.len() + self.padding, 0);

            let object = self.store.register(Bytes::from(stored), mime)?;
            let locator = object.as_str().to_string();
            self.held.lock().expect("lock").push(object);
            Ok(locator)
        }
    }

    #[tokio::test]
    async fn prepare_payload_from_bytes_produces_jpeg_within_budget() {
        let pipeline = PayloadPipeline::default();

        let payload = pipeline
            .prepare_payload(ImageSource::Bytes(png_bytes(1200, 900, 255)), &CompressionOverrides::default())
            .await
            .expect("prepare should succeed");

        assert_eq!(payload.mime, OutputMime::Jpeg);
        assert_eq!((payload.original_width, payload.original_height), (1200, 900));
        assert_eq!((payload.width, payload.height), (800, 600));
        assert!(payload.size() <= VisionProvider::Claude.settings().max_size_bytes);
    }

    #[tokio::test]
    async fn object_source_is_released_after_success() {
        let pipeline = PayloadPipeline::default();
        let object = pipeline
            .object_store()
            .register(Bytes::from(png_bytes(40, 40, 255)), OutputMime::Png)
            .expect("register");

        pipeline
            .prepare_payload(ImageSource::Object(object), &CompressionOverrides::default())
            .await
            .expect("prepare should succeed");

        assert!(pipeline.object_store().is_empty());
    }

    #[tokio::test]
    async fn object_source_is_released_after_failure() {
        let pipeline = PayloadPipeline::default();
        let object = pipeline
            .object_store()
            .register(Bytes::from_static(b"not an image at all"), OutputMime::Png)
            .expect("register");

        let result = pipeline
            .prepare_payload(ImageSource::Object(object), &CompressionOverrides::default())
            .await;

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
        assert!(pipeline.object_store().is_empty());
    }

    #[tokio::test]
    async fn invalid_overrides_fail_before_loading() {
        let pipeline = PayloadPipeline::default();
        let overrides = CompressionOverrides {
            quality: Some(2.0),
            ..Default::default()
        };

        let result = pipeline
            .prepare_payload(ImageSource::FilePath("/does/not/exist.png".into()), &overrides)
            .await;

        assert!(matches!(result, Err(ImageError::InvalidSettings(_))));
    }

    #[tokio::test]
    async fn data_url_delivery_reports_payload_size() {
        let pipeline = PayloadPipeline::default();
        let payload = pipeline
            .prepare_payload(ImageSource::Bytes(png_bytes(64, 64, 255)), &CompressionOverrides::default())
            .await
            .expect("prepare");
        let size = payload.size();

        let transport = pipeline
            .deliver_local(payload, DeliveryPolicy::DataUrl)
            .await
            .expect("deliver");

        assert_eq!(transport.size(), size);
        assert!(transport.locator().is_some_and(|url| url.starts_with("data:image/jpeg;base64,")));
    }

    #[tokio::test]
    async fn upload_without_uploader_is_an_upload_error() {
        let pipeline = PayloadPipeline::default();
        let payload = pipeline
            .prepare_payload(ImageSource::Bytes(png_bytes(16, 16, 255)), &CompressionOverrides::default())
            .await
            .expect("prepare");

        let result = pipeline.deliver_local(payload, DeliveryPolicy::Upload).await;

        assert!(matches!(result, Err(ImageError::Upload(_))));
    }

    #[tokio::test]
    async fn upload_delivery_is_revalidated_at_handoff() {
        let pipeline = PayloadPipeline::default();
        let uploader = StoreUploader::new(pipeline.object_store(), 0);
        let payload = pipeline
            .prepare_payload(ImageSource::Bytes(png_bytes(64, 64, 255)), &CompressionOverrides::default())
            .await
            .expect("prepare");

        let transport = pipeline
            .deliver(payload, DeliveryPolicy::Upload, &uploader)
            .await
            .expect("deliver");

        assert!(matches!(transport, TransportPayload::Uploaded { .. }));
        assert!(transport.locator().is_some_and(LocalObjectStore::is_object_url));
    }

    #[tokio::test]
    async fn handoff_check_catches_payload_altered_by_upload() {
        let pipeline = PayloadPipeline::default();
        let ceiling = pipeline.config_snapshot().expect("snapshot").handoff_ceiling_bytes;
        let uploader = StoreUploader::new(pipeline.object_store(), ceiling as usize);
        let payload = pipeline
            .prepare_payload(ImageSource::Bytes(png_bytes(64, 64, 255)), &CompressionOverrides::default())
            .await
            .expect("prepare");

        let result = pipeline.deliver(payload, DeliveryPolicy::Upload, &uploader).await;

        match result {
            Err(ImageError::PayloadTooLarge { size, limit }) => {
                assert!(size > limit);
                assert_eq!(limit, ceiling);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn provider_switch_is_visible_in_snapshots() {
        let pipeline = PayloadPipeline::default();
        assert_eq!(pipeline.provider().expect("provider"), VisionProvider::Claude);

        pipeline.set_provider(VisionProvider::OpenAi).expect("switch");

        let snapshot = pipeline.config_snapshot().expect("snapshot");
        let settings = snapshot
            .compression_settings(&CompressionOverrides::default())
            .expect("settings");
        assert_eq!(snapshot.provider, VisionProvider::OpenAi);
        assert_eq!((settings.max_width, settings.max_height), (1200, 1600));
    }

    #[test]
    fn invalid_network_policy_leaves_config_untouched() {
        let pipeline = PayloadPipeline::default();
        let before = pipeline.config_snapshot().expect("snapshot").network_policy();

        let mut policy = before;
        policy.allow_private_network = true;
        policy.connect_timeout = 0;

        assert!(matches!(
            pipeline.set_network_policy(policy),
            Err(ImageError::InvalidSettings(_))
        ));
        assert_eq!(pipeline.config_snapshot().expect("snapshot").network_policy(), before);
    }
}
