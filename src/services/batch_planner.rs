//! 批次规划
//!
//! 纯函数，无 I/O：把每个学生的题号切分为不超过 `batch_size` 的连续批次。

use std::sync::Arc;

use tracing::debug;

use crate::models::{BatchTask, JobContent, StructureReport};

/// 每批题目数的硬上限
pub const MAX_BATCH_SIZE: usize = 10;

/// 批次规划器
#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    batch_size: usize,
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self::new(MAX_BATCH_SIZE)
    }
}

impl BatchPlanner {
    /// 创建规划器，`batch_size` 被限制在 `1..=MAX_BATCH_SIZE`
    pub fn new(batch_size: usize) -> Self {
        let clamped = batch_size.clamp(1, MAX_BATCH_SIZE);
        if clamped != batch_size {
            debug!("批次大小 {} 超出范围，调整为 {}", batch_size, clamped);
        }
        Self { batch_size: clamped }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 生成批次任务
    ///
    /// 批次 ID 在整个计划内从 1 开始递增，与学生无关。
    /// 一次性批改模式下每个学生只生成一个整体批改任务。
    pub fn plan(&self, report: &StructureReport, content: &Arc<JobContent>) -> Vec<BatchTask> {
        let mut tasks = Vec::new();
        let mut next_id = 1;

        for student in &report.students {
            let chunks: Vec<Vec<u32>> = if report.single_batch_mode {
                vec![student.question_numbers.clone()]
            } else {
                student
                    .question_numbers
                    .chunks(self.batch_size)
                    .map(<[u32]>::to_vec)
                    .collect()
            };

            for question_numbers in chunks {
                tasks.push(BatchTask {
                    batch_id: next_id,
                    student_id: student.id.clone(),
                    student_name: student.display_name.clone(),
                    question_numbers,
                    whole_submission: report.single_batch_mode,
                    content: Arc::clone(content),
                });
                next_id += 1;
            }
        }

        debug!(
            "批次规划完成: {} 名学生，{} 个批次（每批最多 {} 题）",
            report.students.len(),
            tasks.len(),
            self.batch_size
        );
        tasks
    }
}
