//! 批次调度器 - 编排层
//!
//! ## 职责
//!
//! 在固定大小的准入池中执行批次任务：
//!
//! 1. **并发控制**：使用 Semaphore 限制同时进行的 Oracle 调用数
//! 2. **失败隔离**：单个批次失败只产生一条失败结果，不影响其他批次
//! 3. **结果完整**：每个输入任务恰好对应一个输出结果，顺序不保证
//!
//! 许可在 spawn 之前获取，所以同时存在的任务数也不会超过上限。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::models::{BatchResult, BatchTask};
use crate::services::BatchGrader;
use crate::utils::logging::{log_dispatch_complete, log_dispatch_start};

/// 批次调度器
#[derive(Clone)]
pub struct Dispatcher {
    grader: BatchGrader,
}

impl Dispatcher {
    pub fn new(grader: BatchGrader) -> Self {
        Self { grader }
    }

    /// 执行全部批次任务
    ///
    /// # 参数
    /// - `tasks`: 批次任务（被消费）
    /// - `max_concurrency`: 准入池大小，最小为 1
    ///
    /// # 返回
    /// 每个任务一个结果，顺序与提交顺序无关
    pub async fn dispatch_all(&self, tasks: Vec<BatchTask>, max_concurrency: usize) -> Vec<BatchResult> {
        let max_concurrency = max_concurrency.max(1);
        let total = tasks.len();
        log_dispatch_start(total, max_concurrency);

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut handles = Vec::with_capacity(total);

        for task in tasks {
            let identity = (task.batch_id, task.student_id.clone(), task.question_numbers.clone());
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    // 信号量只在这里持有，不会被关闭
                    error!("[批次 {}] ❌ 无法获取执行许可: {}", task.batch_id, e);
                    let (batch_id, student_id, questions) = identity;
                    handles.push(Err(BatchResult::failure(
                        batch_id,
                        student_id,
                        questions,
                        format!("无法获取执行许可: {}", e),
                        Duration::ZERO,
                    )));
                    continue;
                }
            };

            let grader = self.grader.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                info!(
                    "[批次 {}] 📝 开始批改 {} 第 {} 题",
                    task.batch_id,
                    task.student_name,
                    task.question_range()
                );
                grader.grade(&task).await
            });
            handles.push(Ok((identity, handle)));
        }

        let mut results = Vec::with_capacity(total);
        for entry in handles {
            match entry {
                Ok(((batch_id, student_id, questions), handle)) => match handle.await {
                    Ok(result) => {
                        if result.succeeded {
                            info!("[批次 {}] ✓ 批改完成 ({:.2}秒)", batch_id, result.latency.as_secs_f64());
                        } else {
                            error!(
                                "[批次 {}] ❌ 批改失败: {}",
                                batch_id,
                                result.failure_reason.as_deref().unwrap_or("未知错误")
                            );
                        }
                        results.push(result);
                    }
                    Err(e) => {
                        error!("[批次 {}] 任务执行失败: {}", batch_id, e);
                        results.push(BatchResult::failure(
                            batch_id,
                            student_id,
                            questions,
                            format!("任务执行失败: {}", e),
                            started.elapsed(),
                        ));
                    }
                },
                Err(result) => results.push(result),
            }
        }

        log_dispatch_complete(&results, started.elapsed());
        results
    }
}
