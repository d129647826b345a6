//! # 设计评审图片载荷 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │          设计评审服务 / CLI（critique-payload）            │
//! │   提交设计稿 → 生成载荷 → 交给视觉模型（OpenAI / Claude）  │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ error ────────── AppError (统一错误类型)              │
//! │  ├─ settings ─────── 压缩覆盖项 JSON 读取                 │
//! │  └─ image_pipeline   加载·解码·收敛压缩·校验·交付         │
//! │      ├─ planner / transparency / rasterizer              │
//! │      ├─ compressor     收敛循环 + 应急缩小               │
//! │      ├─ validator      体积与 MIME 校验                  │
//! │      └─ object_store   blob: 地址 (RAII) / 上传器        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，CLI 的返回类型 |
//! | [`settings`] | 从 JSON 文件读取 `CompressionOverrides` |
//! | [`image_pipeline`] | 把任意图片压缩为满足体积与格式约束的载荷 |

pub mod error;
pub mod image_pipeline;
pub mod settings;
