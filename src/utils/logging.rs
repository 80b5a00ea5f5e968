//! 日志工具模块
//!
//! 提供日志初始化和格式化输出的辅助函数

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{BatchGradingOutput, BatchResult, JobStatus};
use crate::workflow::{StageOutcome, StageRecord};

/// 初始化日志
///
/// 读取 `RUST_LOG`，默认 `info`。重复调用不会报错（测试中会多次调用）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 智能批量批改模式");
    info!("🤖 模型: {}", config.oracle.model);
    info!("📊 最大并发数: {}", config.grading.max_concurrency);
    info!("📦 每批最多题目数: {}", config.grading.batch_size);
    info!("{}", "=".repeat(60));
}

/// 记录作业开始信息
///
/// # 参数
/// - `job_id`: 作业 ID
/// - `documents`: 文件数量
pub fn log_job_start(job_id: &str, documents: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📁 作业 {} 开始，共 {} 个文件", job_id, documents);
    info!("{}", "=".repeat(60));
}

/// 记录批次规划结果
pub fn log_plan(students: usize, batches: usize, single_batch_mode: bool) {
    if single_batch_mode {
        info!("📋 一次性批改模式: {} 名学生，{} 个批次", students, batches);
    } else {
        info!("📋 批次规划: {} 名学生，{} 个批次", students, batches);
    }
}

/// 记录阶段结果
pub fn log_stage(record: &StageRecord) {
    match &record.outcome {
        StageOutcome::Ran => info!("✓ 阶段 [{}] 完成 ({} 毫秒)", record.stage, record.elapsed_ms),
        StageOutcome::Skipped { reason } => info!("⏭️ 阶段 [{}] 跳过: {}", record.stage, reason),
        StageOutcome::CacheHit => info!("💾 阶段 [{}] 命中缓存", record.stage),
    }
}

/// 记录调度开始信息
pub fn log_dispatch_start(total: usize, max_concurrency: usize) {
    info!("\n{}", "─".repeat(60));
    info!("📦 开始批改 {} 个批次，最多同时 {} 个", total, max_concurrency);
    info!("{}", "─".repeat(60));
}

/// 记录调度完成信息
pub fn log_dispatch_complete(results: &[BatchResult], elapsed: Duration) {
    let success = results.iter().filter(|r| r.succeeded).count();
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 批改完成: 成功 {}/{}，耗时 {:.2}秒",
        success,
        results.len(),
        elapsed.as_secs_f64()
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(output: &BatchGradingOutput) {
    info!("\n{}", "=".repeat(60));
    info!("📊 批改完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    match output.status {
        JobStatus::Success => info!("✅ 状态: 成功"),
        JobStatus::Failed => info!("❌ 状态: 失败"),
    }
    info!("👥 学生数: {}", output.total_students);
    info!("📦 批次数: {}", output.total_batches);
    info!("⏱️ 耗时: {:.2}秒", output.processing_time_seconds);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
