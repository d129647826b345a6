//! # 来源加载模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（URL / Data URL / 本地文件 / 字节 / 对象地址）的原始字节加载，
//! 并在“尽可能早”的阶段执行输入校验：体积、文件签名、矢量图拒绝、SSRF 防护。
//!
//! ## 实现思路
//!
//! - URL：协议 + 主机安全 + 逐跳重定向复检 + 内容类型 + 流式下载限额。
//! - Data URL / Base64：格式解析 + 按长度预估解码体积，超限时不解码。
//! - 文件：metadata 体积限制 + 读取。
//! - 对象地址：从 `LocalObjectStore` 读取，守卫随来源一起释放。
//! - 远程读取 `fetch_remote` 同时供交付校验复用，超限统一报 `PayloadTooLarge`，
//!   由加载阶段再映射为输入资源限制。

use base64::{Engine as _, engine::general_purpose};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::lookup_host;

use super::source::RawImageData;
use super::{ImageError, ImageSource, PayloadPipeline, PipelineConfig};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const NETWORK_RETRY_MAX_ATTEMPTS: u8 = 3;
const NETWORK_RETRY_BASE_DELAY_MS: u64 = 180;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;
const VECTOR_SNIFF_BYTES: usize = 512;

/// 远程读取结果。
pub(crate) struct RemoteBody {
    pub(crate) bytes: Vec<u8>,
    pub(crate) content_type: Option<String>,
}

impl PayloadPipeline {
    /// 按来源加载原始字节。`ImageSource::Object` 的守卫在此消费并释放。
    pub(super) async fn load_source(
        &self,
        source: ImageSource,
        config: &PipelineConfig,
    ) -> Result<RawImageData, ImageError> {
        match source {
            ImageSource::Url(url) => Self::load_from_url(&url, config).await,
            ImageSource::DataUrl(data) => Self::load_from_data_url(&data, config),
            ImageSource::FilePath(path) => Self::load_from_file(&path, config),
            ImageSource::Bytes(bytes) => Self::load_from_bytes(bytes, config),
            ImageSource::Object(object) => self.load_from_object(object.as_str(), config),
        }
    }

    async fn load_from_url(url: &str, config: &PipelineConfig) -> Result<RawImageData, ImageError> {
        log::info!("🌐 开始下载图片 - URL: {}", Self::redact_url_for_log(url));

        let body = Self::fetch_remote(url, config, config.max_file_size)
            .await
            .map_err(|err| match err {
                ImageError::PayloadTooLarge { size, limit } => ImageError::ResourceLimit(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    limit as f64 / 1024.0 / 1024.0
                )),
                other => other,
            })?;

        Self::validate_raster_input(&body.bytes)?;

        Ok(RawImageData {
            bytes: body.bytes,
            source_hint: "url",
        })
    }

    fn load_from_data_url(data: &str, config: &PipelineConfig) -> Result<RawImageData, ImageError> {
        log::info!("📝 开始处理 Data URL / Base64 图片");

        let bytes = Self::parse_base64_with_limit(data, config.max_file_size)?;

        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_raster_input(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "data-url",
        })
    }

    fn load_from_file(path: &str, config: &PipelineConfig) -> Result<RawImageData, ImageError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path);

        let file_path = Path::new(path);
        if !file_path.exists() {
            return Err(ImageError::FileSystem(format!("文件不存在：{}", path)));
        }

        let metadata = std::fs::metadata(file_path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if !metadata.is_file() {
            return Err(ImageError::FileSystem(format!("不是普通文件：{}", path)));
        }

        if metadata.len() > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(file_path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        Self::validate_raster_input(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "file",
        })
    }

    fn load_from_bytes(bytes: Vec<u8>, config: &PipelineConfig) -> Result<RawImageData, ImageError> {
        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "输入字节过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_raster_input(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "bytes",
        })
    }

    fn load_from_object(&self, locator: &str, config: &PipelineConfig) -> Result<RawImageData, ImageError> {
        log::debug!("📌 读取对象地址：{}", locator);

        let object = self.objects.resolve(locator)?;
        if object.bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "对象过大：{:.2} MB（限制：{:.2} MB）",
                object.bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = object.bytes.to_vec();
        Self::validate_raster_input(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "object-url",
        })
    }

    /// 带安全校验的远程读取。
    ///
    /// 每一跳都重新做 URL 安全检查；`Content-Length` 超限直接拒绝，
    /// 流式读取累计超过 `limit` 时立即中止。
    pub(crate) async fn fetch_remote(
        url: &str,
        config: &PipelineConfig,
        limit: u64,
    ) -> Result<RemoteBody, ImageError> {
        Self::validate_url_safety(url, config).await?;

        let mut current_url = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        for redirect_count in 0..=config.max_redirects {
            let request_clients = Self::build_request_clients_for_url(&current_url, config).await?;
            let response = Self::send_with_retry(&request_clients, &current_url, config).await?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(ImageError::Network(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| ImageError::Network("重定向响应缺少 Location 头".to_string()))?;

                let location_str = location
                    .to_str()
                    .map_err(|e| ImageError::InvalidFormat(format!("重定向地址无效：{}", e)))?;

                let next_url = current_url
                    .join(location_str)
                    .map_err(|e| ImageError::InvalidFormat(format!("重定向 URL 解析失败：{}", e)))?;

                Self::validate_url_safety(next_url.as_str(), config).await?;

                log::debug!("↪️ 跳转到: {}", Self::redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(ImageError::Network(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    Self::status_message(response.status().as_u16())
                )));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|ct| ct.to_str().ok())
                .map(|ct| ct.to_string());

            if let Some(ct) = content_type.as_deref() {
                if !Self::is_image_content_type(ct) {
                    return Err(ImageError::InvalidFormat(format!("不是图片类型：{}", ct)));
                }
            }

            let total_len = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|cl| cl.to_str().ok())
                .and_then(|cl| cl.parse::<u64>().ok());

            if let Some(size) = total_len {
                if size > limit {
                    return Err(ImageError::PayloadTooLarge { size, limit });
                }
            }

            let bytes = Self::read_body_with_limit(response, total_len, config, limit).await?;

            return Ok(RemoteBody {
                bytes,
                content_type,
            });
        }

        Err(ImageError::Network("下载流程异常结束".to_string()))
    }

    async fn send_with_retry(
        request_clients: &[reqwest::Client],
        url: &reqwest::Url,
        config: &PipelineConfig,
    ) -> Result<reqwest::Response, ImageError> {
        let referer = format!("{}://{}/", url.scheme(), url.host_str().unwrap_or(""));
        let mut attempt: u8 = 1;

        loop {
            let client_idx = (attempt.saturating_sub(1) as usize) % request_clients.len();
            let send_result = request_clients[client_idx]
                .get(url.clone())
                .header(reqwest::header::USER_AGENT, concat!("critique-payload/", env!("CARGO_PKG_VERSION")))
                .header(reqwest::header::ACCEPT, "image/avif,image/webp,image/png,image/jpeg,image/*;q=0.8")
                .header(reqwest::header::REFERER, &referer)
                .send()
                .await;

            match send_result {
                Ok(resp) => {
                    if attempt < NETWORK_RETRY_MAX_ATTEMPTS && Self::is_retryable_http_status(resp.status()) {
                        let delay_ms = Self::compute_retry_delay_with_jitter(
                            attempt,
                            Self::retry_after_hint_ms(resp.headers()),
                        );

                        log::warn!(
                            "⚠️ HTTP {}（第 {}/{} 次，可重试）；{}ms 后重试",
                            resp.status().as_u16(),
                            attempt,
                            NETWORK_RETRY_MAX_ATTEMPTS,
                            delay_ms
                        );

                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    return Ok(resp);
                }
                Err(err) => {
                    if attempt >= NETWORK_RETRY_MAX_ATTEMPTS || !Self::is_retryable_network_error(&err) {
                        return Err(Self::map_reqwest_error(err, url.as_str(), config));
                    }

                    let delay_ms = Self::compute_retry_delay_with_jitter(attempt, None);
                    log::warn!(
                        "⚠️ 网络请求失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                        attempt,
                        NETWORK_RETRY_MAX_ATTEMPTS,
                        Self::sanitize_error_message_with_redacted_url(&err.to_string(), url.as_str()),
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn read_body_with_limit(
        mut response: reqwest::Response,
        total_len: Option<u64>,
        config: &PipelineConfig,
        limit: u64,
    ) -> Result<Vec<u8>, ImageError> {
        let initial_capacity = total_len
            .map(|len| len.min(limit).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        ImageError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        ImageError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk_result.map_err(|e| ImageError::Network(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;

            total = total.saturating_add(chunk.len() as u64);
            if total > limit {
                return Err(ImageError::PayloadTooLarge { size: total, limit });
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    Self::validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        if !signature_validated {
            Self::validate_image_signature(&buffer)?;
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        Ok(buffer)
    }

    async fn build_request_clients_for_url(
        url: &reqwest::Url,
        config: &PipelineConfig,
    ) -> Result<Vec<reqwest::Client>, ImageError> {
        if config.allow_private_network || !config.resolve_dns_for_url_safety {
            return Ok(vec![Self::build_base_http_client(config)?]);
        }

        let host = match url.host_str() {
            Some(host) => host,
            None => return Ok(vec![Self::build_base_http_client(config)?]),
        };

        if host.parse::<IpAddr>().is_ok() {
            return Ok(vec![Self::build_base_http_client(config)?]);
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| ImageError::InvalidFormat("URL 缺少端口信息".to_string()))?;

        // 固定到已校验的公网地址，避免二次解析被 DNS 重绑定。
        let pinned = Self::resolve_public_socket_addrs(host, port).await?;
        if pinned.is_empty() {
            return Err(ImageError::InvalidFormat("URL 未解析到有效公网地址".to_string()));
        }

        let mut clients = Vec::with_capacity(pinned.len());
        for addr in pinned {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.download_timeout))
                .connect_timeout(Duration::from_secs(config.connect_timeout))
                .redirect(reqwest::redirect::Policy::none())
                .resolve(host, addr)
                .build()
                .map_err(|e| ImageError::Network(format!("无法创建 DNS 绑定客户端：{}", e)))?;
            clients.push(client);
        }

        Ok(clients)
    }

    fn build_base_http_client(config: &PipelineConfig) -> Result<reqwest::Client, ImageError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ImageError::Network(format!("无法创建 HTTP 客户端：{}", e)))
    }

    async fn resolve_public_socket_addrs(host: &str, port: u16) -> Result<Vec<SocketAddr>, ImageError> {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| ImageError::InvalidFormat(format!("URL 主机解析失败：{}", e)))?;

        let mut result = Vec::new();
        for addr in addrs {
            if Self::is_private_or_local_ip(addr.ip()) {
                return Err(ImageError::InvalidFormat(format!(
                    "URL 解析结果命中内网地址：{}",
                    addr.ip()
                )));
            }

            result.push(addr);
        }

        Ok(result)
    }

    fn retry_after_hint_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
        let value = headers.get(reqwest::header::RETRY_AFTER)?;
        let secs = value.to_str().ok()?.trim().parse::<u64>().ok()?;
        Some(secs.saturating_mul(1000))
    }

    fn compute_retry_delay_with_jitter(attempt: u8, server_hint_ms: Option<u64>) -> u64 {
        let exp = NETWORK_RETRY_BASE_DELAY_MS.saturating_mul(1_u64 << (attempt.saturating_sub(1) as u32));
        let base = server_hint_ms.unwrap_or(exp);
        let jitter_bound = (base / 2).max(1);
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        base.saturating_add(seed % (jitter_bound + 1))
    }

    fn is_retryable_http_status(status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
    }

    fn is_image_content_type(content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }

    /// 日志用 URL：去掉查询串与片段。
    pub(crate) fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

        format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
    }

    /// 校验 URL 安全性。
    ///
    /// 默认阻止本地/内网目标，防止 SSRF 风险。
    async fn validate_url_safety(url: &str, config: &PipelineConfig) -> Result<(), ImageError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ImageError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        if config.allow_private_network {
            return Ok(());
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ImageError::InvalidFormat("URL 缺少主机地址".to_string()))?;

        if Self::is_local_hostname(host) {
            return Err(ImageError::InvalidFormat(format!("禁止访问本地网络地址：{}", host)));
        }

        let ip_host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = ip_host.parse::<IpAddr>() {
            if Self::is_private_or_local_ip(ip) {
                return Err(ImageError::InvalidFormat(format!("禁止访问内网 IP：{}", ip)));
            }

            return Ok(());
        }

        if config.resolve_dns_for_url_safety {
            let port = parsed
                .port_or_known_default()
                .ok_or_else(|| ImageError::InvalidFormat("URL 缺少端口信息".to_string()))?;

            if Self::resolve_public_socket_addrs(host, port).await?.is_empty() {
                return Err(ImageError::InvalidFormat("URL 未解析到有效地址".to_string()));
            }
        }

        Ok(())
    }

    fn is_local_hostname(host: &str) -> bool {
        host.eq_ignore_ascii_case("localhost")
            || host.eq_ignore_ascii_case("localhost.")
            || host.ends_with(".local")
            || host.ends_with(".localhost")
    }

    /// 判断 IP 是否属于本地/内网/链路本地等受限范围。
    fn is_private_or_local_ip(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_private()
                    || v4.is_loopback()
                    || v4.is_link_local()
                    || v4.is_broadcast()
                    || v4.is_documentation()
                    || v4.is_unspecified()
                    || v4.is_multicast()
                {
                    return true;
                }

                let octets = v4.octets();
                octets[0] == 0 || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
            }
            IpAddr::V6(v6) => {
                if let Some(mapped) = v6.to_ipv4_mapped() {
                    return Self::is_private_or_local_ip(IpAddr::V4(mapped));
                }

                v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_unique_local()
                    || v6.is_unicast_link_local()
                    || v6.is_multicast()
            }
        }
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 Data URL 或纯 Base64；预估体积超过 `max_file_size` 时不解码。
    pub(crate) fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, ImageError> {
        let normalized = data.trim();

        let base64_data = if let Some(rest) = normalized.strip_prefix("data:") {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| ImageError::InvalidFormat("Data URL 缺少数据段".to_string()))?;

            let header = header.to_ascii_lowercase();
            if !header.ends_with(";base64") {
                return Err(ImageError::InvalidFormat("缺少 base64 标记".to_string()));
            }
            if header.starts_with("image/svg") {
                return Err(ImageError::InvalidFormat("不支持矢量图（SVG）输入".to_string()));
            }
            if !header.starts_with("image/") {
                return Err(ImageError::InvalidFormat(format!(
                    "Data URL 不是图片类型：{}",
                    header.trim_end_matches(";base64")
                )));
            }

            payload
        } else {
            normalized
        };

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(base64_data)?;
        if estimated_len > max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(base64_data.trim())
            .map_err(|e| ImageError::InvalidFormat(format!("Base64 解码失败：{}", e)))
    }

    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &PipelineConfig) -> ImageError {
        let err_msg = Self::sanitize_error_message_with_redacted_url(&e.to_string(), url);

        if e.is_timeout() {
            ImageError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            ImageError::Network(format!("无法连接：{}", err_msg))
        } else {
            ImageError::Network(format!("请求失败：{}", err_msg))
        }
    }

    fn sanitize_error_message_with_redacted_url(error_msg: &str, url: &str) -> String {
        error_msg.replace(url, &Self::redact_url_for_log(url))
    }

    fn is_retryable_network_error(error: &reqwest::Error) -> bool {
        if error.is_timeout() || error.is_connect() {
            return true;
        }

        let msg = error.to_string().to_lowercase();
        msg.contains("connection reset")
            || msg.contains("connection closed before message completed")
            || msg.contains("peer closed connection")
            || msg.contains("tls handshake")
    }

    fn status_message(code: u16) -> &'static str {
        match code {
            404 => "未找到",
            403 => "访问被拒绝",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }

    /// 光栅图输入校验：拒绝矢量图，再校验文件签名。
    fn validate_raster_input(bytes: &[u8]) -> Result<(), ImageError> {
        if Self::looks_like_svg(bytes) {
            return Err(ImageError::InvalidFormat("不支持矢量图（SVG）输入".to_string()));
        }

        Self::validate_image_signature(bytes)
    }

    fn looks_like_svg(bytes: &[u8]) -> bool {
        let head = &bytes[..bytes.len().min(VECTOR_SNIFF_BYTES)];
        let text = String::from_utf8_lossy(head).to_ascii_lowercase();
        let trimmed = text.trim_start_matches('\u{feff}').trim_start();

        trimmed.starts_with("<svg") || (trimmed.starts_with("<?xml") && trimmed.contains("<svg"))
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 流式下载阶段的签名探测。
    ///
    /// - `Ok(true)`：已识别为图片
    /// - `Ok(false)`：字节不足以判断，继续下载
    /// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
    fn validate_stream_signature_probe(bytes: &[u8], probe_limit: usize) -> Result<bool, ImageError> {
        if bytes.is_empty() {
            return Ok(false);
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(ImageError::InvalidFormat(format!(
                    "下载内容不是图片类型：{}",
                    kind.mime_type()
                )));
            }
            return Ok(true);
        }

        if bytes.len() >= probe_limit {
            return Err(ImageError::InvalidFormat(format!(
                "下载前 {} 字节内无法识别图片类型",
                probe_limit
            )));
        }

        Ok(false)
    }
}
