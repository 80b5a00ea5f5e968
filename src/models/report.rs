//! 报告模型

use serde::Serialize;

use super::batch::BatchResult;

/// 学生总结（最终产物，生成后不再修改）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub display_name: String,
    pub narrative: String,
    /// 按首题号排序，包含失败的批次
    pub batch_results: Vec<BatchResult>,
    /// 成功批次中提取到的分数之和
    pub total_score: Option<f64>,
}

impl StudentSummary {
    pub fn failed_batches(&self) -> usize {
        self.batch_results.iter().filter(|r| !r.succeeded).count()
    }
}

/// 扣分点标注
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub student_id: String,
    pub points: Vec<String>,
}

/// 知识点分析
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeInsight {
    pub text: String,
    pub weak_points: Vec<String>,
}

/// 作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
}

/// 批量批改的最终输出
#[derive(Debug, Clone, Serialize)]
pub struct BatchGradingOutput {
    pub status: JobStatus,
    pub narrative_text: String,
    pub html_report: String,
    pub raw_data: serde_json::Value,
    pub processing_time_seconds: f64,
    pub total_batches: usize,
    pub total_students: usize,
}

impl BatchGradingOutput {
    /// 作业级失败的输出
    pub fn failed(message: impl Into<String>, processing_time_seconds: f64) -> Self {
        let message = message.into();
        Self {
            status: JobStatus::Failed,
            html_report: format!(
                "<div class=\"job-failed\">❌ {}</div>",
                crate::services::report_renderer::escape_html(&message)
            ),
            raw_data: serde_json::json!({ "error": &message }),
            narrative_text: format!("❌ 批改失败: {}", message),
            processing_time_seconds,
            total_batches: 0,
            total_students: 0,
        }
    }
}
