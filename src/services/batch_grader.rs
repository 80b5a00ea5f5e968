//! 单批次批改
//!
//! 给调度器用的执行单元：一个 [`BatchTask`] 进，一个 [`BatchResult`] 出，永不返回错误。

use std::time::Instant;

use tracing::{debug, warn};

use super::extraction::extract_score;
use super::oracle_client::OracleClient;
use super::prompts::{grading_prompt, GRADING_SYSTEM};
use crate::models::{BatchResult, BatchTask};

/// 批次批改器
#[derive(Clone)]
pub struct BatchGrader {
    oracle: OracleClient,
}

impl BatchGrader {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }

    /// 批改一个批次
    ///
    /// Oracle 失败时返回 `succeeded = false` 的结果，携带失败原因。
    pub async fn grade(&self, task: &BatchTask) -> BatchResult {
        let start = Instant::now();
        let rubric = task.content.rubric.as_ref();
        let prompt = grading_prompt(task, rubric);
        let images = task.content.image_blocks();

        match self.oracle.call_text(&prompt, &images, Some(GRADING_SYSTEM)).await {
            Ok(text) => {
                let max = rubric.and_then(|r| {
                    if task.whole_submission {
                        r.total()
                    } else {
                        r.max_for(&task.question_numbers)
                    }
                });
                let score = bounded_score(extract_score(&text), max, task.batch_id);
                debug!("批次 {} 完成，分数: {:?}", task.batch_id, score);
                BatchResult::success(task, text, score, start.elapsed())
            }
            Err(failure) => BatchResult::failure(
                task.batch_id,
                task.student_id.clone(),
                task.question_numbers.clone(),
                failure.diagnostic(),
                start.elapsed(),
            ),
        }
    }
}

/// 超过满分的分数视为解析错误，丢弃
pub fn bounded_score(score: Option<f64>, max: Option<f64>, batch_id: usize) -> Option<f64> {
    match (score, max) {
        (Some(score), Some(max)) if score > max => {
            warn!(
                "⚠️ 批次 {} 提取到的分数 {} 超过满分 {}，视为无效",
                batch_id, score, max
            );
            None
        }
        (score, _) => score,
    }
}
