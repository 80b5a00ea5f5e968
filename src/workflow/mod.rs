//! 流程层（Workflow Layer）
//!
//! 定义"一个作业"从读取文件到生成报告的完整流程。

pub mod controller;
pub mod job_ctx;
pub mod stage;

pub use controller::WorkflowController;
pub use job_ctx::JobCtx;
pub use stage::{Stage, StageOutcome, StageRecord, StageTrace};
