//! # Batch Grading
//!
//! 基于大模型的批量作业批改库
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 与外部世界打交道，只暴露能力
//! - `OracleTransport` - 一次大模型请求（默认 OpenAI 兼容接口）
//! - `DocumentIngestor` - 把文件转换成文本块和图像块
//! - `RenderPipeline` - 文档渲染降级链和图像体积控制
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务只做一件事
//! - `OracleClient` - 带重试和错误分类的调用
//! - `StructureAnalyzer` - 识别题目数量和学生名单
//! - `BatchPlanner` / `BatchGrader` - 规划批次和批改单个批次
//! - `Aggregator` - 按学生汇总并生成总结
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个作业"的完整处理流程
//! - `JobCtx` - 上下文封装（job_id + 批次参数）
//! - `WorkflowController` - 流程编排（ingest → structure → scoring → report）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/engine` - 批改引擎，装配组件并执行作业
//! - `orchestrator/dispatcher` - 批次调度器，限制并发并隔离失败
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod testing;

// 重新导出常用类型
pub use config::{Config, GradingConfig, OracleConfig};
pub use error::{AppError, AppResult};
pub use infrastructure::{DocumentIngestor, OracleTransport};
pub use models::{BatchGradingOutput, DocumentMeta, JobStatus, Role};
pub use orchestrator::GradingEngine;
pub use workflow::{JobCtx, WorkflowController};
