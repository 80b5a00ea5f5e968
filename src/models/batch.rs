//! 批次任务与批次结果

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::content::JobContent;

/// 批次任务
///
/// 由批次规划生成，调度器只消费一次。`content` 是共享内容的引用，不复制。
#[derive(Debug, Clone, Serialize)]
pub struct BatchTask {
    pub batch_id: usize,
    pub student_id: String,
    pub student_name: String,
    pub question_numbers: Vec<u32>,
    /// 一次性批改模式：整体批改，不按题切分
    pub whole_submission: bool,
    #[serde(skip)]
    pub content: Arc<JobContent>,
}

impl BatchTask {
    /// 题号范围的显示文本，如 `1-10` 或 `3`
    pub fn question_range(&self) -> String {
        question_range(&self.question_numbers)
    }
}

/// 批次结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub batch_id: usize,
    pub student_id: String,
    pub question_numbers: Vec<u32>,
    /// Oracle 回复原文（失败时为失败说明）
    pub raw_text: String,
    pub extracted_score: Option<f64>,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub latency: Duration,
}

impl BatchResult {
    /// 批改成功的结果
    pub fn success(task: &BatchTask, raw_text: String, extracted_score: Option<f64>, latency: Duration) -> Self {
        Self {
            batch_id: task.batch_id,
            student_id: task.student_id.clone(),
            question_numbers: task.question_numbers.clone(),
            raw_text,
            extracted_score,
            succeeded: true,
            failure_reason: None,
            latency,
        }
    }

    /// 批改失败的结果
    pub fn failure(
        batch_id: usize,
        student_id: impl Into<String>,
        question_numbers: Vec<u32>,
        reason: impl Into<String>,
        latency: Duration,
    ) -> Self {
        let reason = reason.into();
        Self {
            batch_id,
            student_id: student_id.into(),
            question_numbers,
            raw_text: format!("批改失败：{}", reason),
            extracted_score: None,
            succeeded: false,
            failure_reason: Some(reason),
            latency,
        }
    }

    /// 第一个题号，用于排序
    pub fn first_question(&self) -> u32 {
        self.question_numbers.first().copied().unwrap_or(0)
    }

    pub fn question_range(&self) -> String {
        question_range(&self.question_numbers)
    }
}

fn question_range(numbers: &[u32]) -> String {
    match (numbers.first(), numbers.last()) {
        (Some(first), Some(last)) if first != last => format!("{}-{}", first, last),
        (Some(first), _) => first.to_string(),
        _ => String::from("-"),
    }
}
