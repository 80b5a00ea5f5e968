//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责组件装配和并发调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `engine` - 批改引擎
//! - 装配 Oracle 传输、文件读取器、角色识别器和内容缓存
//! - 为每次调用创建作业上下文（JobCtx）
//! - 把作业级错误转换成失败报告
//!
//! ### `dispatcher` - 批次调度器
//! - 控制同时进行的批次数量（Semaphore）
//! - 隔离单个批次的失败
//! - 输出调度统计信息
//!
//! ## 层次关系
//!
//! ```text
//! engine (处理一次作业调用)
//!     ↓
//! workflow::WorkflowController (ingest → structure → scoring → report)
//!     ↓                    ↘
//! services (能力层)       dispatcher (处理 Vec<BatchTask>)
//!     ↓
//! infrastructure (基础设施：OracleTransport / DocumentIngestor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：engine 管装配，dispatcher 管并发
//! 2. **资源共享**：内容缓存由 engine 持有，多次作业共享
//! 3. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod dispatcher;
pub mod engine;

// 重新导出主要类型
pub use dispatcher::Dispatcher;
pub use engine::GradingEngine;
