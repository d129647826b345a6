//! # 对象地址与上传
//!
//! ## 设计思路
//!
//! - `LocalObjectStore`：进程内的临时 `blob:` 地址注册表，地址由 `ObjectUrl` 守卫持有，
//!   守卫释放时自动撤销，任何退出路径都不会遗留地址。
//! - `ObjectUploader`：外部对象存储的抽象，交付阶段按策略上传并拿回公开地址。
//! - `HttpObjectUploader`：以原始字节 `POST` 到上传端点，响应体 JSON 中的 `url` 即为地址。

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;

use super::ImageError;
use super::source::OutputMime;

const OBJECT_URL_PREFIX: &str = "blob:critique-payload/";

/// 已注册对象。
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub mime: OutputMime,
}

/// 进程内临时对象注册表。
#[derive(Debug, Default)]
pub struct LocalObjectStore {
    entries: Mutex<HashMap<String, StoredObject>>,
    next_id: AtomicU64,
}

impl LocalObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 是否为本进程的对象地址。
    pub fn is_object_url(locator: &str) -> bool {
        locator.starts_with("blob:")
    }

    /// 注册字节并返回地址守卫；守卫释放即撤销。
    pub fn register(self: &Arc<Self>, bytes: Bytes, mime: OutputMime) -> Result<ObjectUrl, ImageError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("{}{:016x}", OBJECT_URL_PREFIX, id);

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ImageError::ResourceLimit("对象存储锁已中毒".to_string()))?;
        entries.insert(url.clone(), StoredObject { bytes, mime });

        log::debug!("📌 注册对象地址：{}（当前 {} 个）", url, entries.len());

        Ok(ObjectUrl {
            url,
            store: Arc::downgrade(self),
        })
    }

    /// 解析对象地址。
    pub fn resolve(&self, locator: &str) -> Result<StoredObject, ImageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ImageError::ResourceLimit("对象存储锁已中毒".to_string()))?;

        entries
            .get(locator)
            .cloned()
            .ok_or_else(|| ImageError::Network(format!("对象地址不存在或已释放：{}", locator)))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn revoke(&self, locator: &str) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        if entries.remove(locator).is_some() {
            log::debug!("🧹 已撤销对象地址：{}", locator);
        }
    }
}

/// `blob:` 地址守卫。
#[derive(Debug)]
pub struct ObjectUrl {
    url: String,
    store: Weak<LocalObjectStore>,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.revoke(&self.url);
        }
    }
}

/// 外部对象存储。
pub trait ObjectUploader: Send + Sync {
    /// 上传字节，返回可公开访问的地址。
    fn upload(
        &self,
        bytes: Bytes,
        mime: OutputMime,
    ) -> impl Future<Output = Result<String, ImageError>> + Send;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// 基于 HTTP 的上传器。
#[derive(Debug, Clone)]
pub struct HttpObjectUploader {
    endpoint: reqwest::Url,
    client: reqwest::Client,
}

impl HttpObjectUploader {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self, ImageError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| ImageError::Upload(format!("上传地址格式错误：{}", e)))?;

        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(ImageError::Upload("上传地址仅支持 HTTP/HTTPS".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ImageError::Upload(format!("无法创建上传客户端：{}", e)))?;

        Ok(Self { endpoint, client })
    }
}

impl ObjectUploader for HttpObjectUploader {
    async fn upload(&self, bytes: Bytes, mime: OutputMime) -> Result<String, ImageError> {
        let size = bytes.len();
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, mime.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| ImageError::Upload(format!("上传请求失败：{}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Upload(format!("上传失败：HTTP {}", status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ImageError::Upload(format!("读取上传响应失败：{}", e)))?;

        let parsed: UploadResponse = serde_json::from_slice(&body)
            .map_err(|e| ImageError::Upload(format!("上传响应格式错误：{}", e)))?;

        if parsed.url.trim().is_empty() {
            return Err(ImageError::Upload("上传响应缺少地址".to_string()));
        }

        log::info!("☁️ 上传完成 - {} 字节 {}", size, mime.as_str());
        Ok(parsed.url)
    }
}
