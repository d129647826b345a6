//! # 设计评审图片载荷 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 业务逻辑分布在 `image_pipeline` 各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde::Serialize;

use critique_payload::error::AppError;
use critique_payload::image_pipeline::{
    CompressionOverrides, DeliveryPolicy, HttpObjectUploader, ImageSource, PayloadPipeline, TransportPayload,
    VisionProvider,
};
use critique_payload::settings;

/// 把设计稿压缩为视觉模型可接受的载荷，并输出 JSON 报告。
#[derive(Debug, Parser)]
#[command(name = "critique-payload", version)]
struct Cli {
    /// 本地路径、http(s) 地址或 Data URL
    input: String,

    /// 模型提供方（claude / openai）
    #[arg(long, env = "CRITIQUE_PAYLOAD_PROVIDER", default_value = "claude")]
    provider: VisionProvider,

    /// 压缩覆盖项 JSON 文件
    #[arg(long)]
    settings: Option<PathBuf>,

    /// 输出文件（Data URL 交付时写入 URL 文本，否则写入图片字节）
    #[arg(long, short)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Delivery::Inline)]
    delivery: Delivery,

    /// 上传端点，`--delivery upload` 时必填
    #[arg(long, env = "CRITIQUE_PAYLOAD_UPLOAD_ENDPOINT")]
    upload_endpoint: Option<String>,

    /// 允许访问内网地址
    #[arg(long)]
    allow_private_network: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Delivery {
    Inline,
    DataUrl,
    Upload,
}

impl From<Delivery> for DeliveryPolicy {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Inline => DeliveryPolicy::Inline,
            Delivery::DataUrl => DeliveryPolicy::DataUrl,
            Delivery::Upload => DeliveryPolicy::Upload,
        }
    }
}

#[derive(Debug, Serialize)]
struct PayloadReport {
    provider: &'static str,
    mime: &'static str,
    size: u64,
    width: u32,
    height: u32,
    original_width: u32,
    original_height: u32,
    attempts: u32,
    delivery: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorReport {
    code: &'static str,
    stage: &'static str,
    message: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => {
            print_json(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("❌ 处理失败 [{}:{}]: {}", err.stage(), err.code(), err);
            print_json(&ErrorReport {
                code: err.code(),
                stage: err.stage(),
                message: err.to_string(),
            });
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<PayloadReport, AppError> {
    let overrides = match &cli.settings {
        Some(path) => settings::read_overrides(path)?,
        None => CompressionOverrides::default(),
    };

    let pipeline = PayloadPipeline::default();
    pipeline.set_provider(cli.provider)?;

    if cli.allow_private_network {
        let mut policy = pipeline.config_snapshot()?.network_policy();
        policy.allow_private_network = true;
        pipeline.set_network_policy(policy)?;
    }

    let payload = pipeline
        .prepare_payload(ImageSource::from_input(&cli.input), &overrides)
        .await?;

    let mut report = PayloadReport {
        provider: cli.provider.as_str(),
        mime: payload.mime.as_str(),
        size: payload.size(),
        width: payload.width,
        height: payload.height,
        original_width: payload.original_width,
        original_height: payload.original_height,
        attempts: payload.attempts,
        delivery: delivery_name(cli.delivery),
        locator: None,
        output: None,
    };

    let image_bytes = payload.bytes.clone();
    let transport = match cli.delivery {
        Delivery::Upload => {
            let endpoint = cli
                .upload_endpoint
                .as_deref()
                .ok_or_else(|| AppError::Settings("--delivery upload 需要 --upload-endpoint".to_string()))?;
            let timeout = pipeline.config_snapshot()?.download_timeout;
            let uploader = HttpObjectUploader::new(endpoint, timeout)?;
            pipeline.deliver(payload, DeliveryPolicy::Upload, &uploader).await?
        }
        other => pipeline.deliver_local(payload, other.into()).await?,
    };

    if let TransportPayload::Uploaded { locator, .. } = &transport {
        report.locator = Some(locator.clone());
    }

    if let Some(path) = &cli.output {
        match &transport {
            TransportPayload::DataUrl { url, .. } => std::fs::write(path, url)?,
            _ => std::fs::write(path, &image_bytes)?,
        }
        log::info!("💾 已写入 {}", path.display());
        report.output = Some(path.clone());
    }

    Ok(report)
}

fn delivery_name(delivery: Delivery) -> &'static str {
    match delivery {
        Delivery::Inline => "inline",
        Delivery::DataUrl => "data-url",
        Delivery::Upload => "upload",
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(err) => log::error!("序列化输出失败: {err}"),
    }
}
