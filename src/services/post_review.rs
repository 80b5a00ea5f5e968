//! 批改后的分析阶段
//!
//! - 扣分点标注：每个有成功批次的学生一次 Oracle 调用
//! - 知识点挖掘：整个作业一次 Oracle 调用
//!
//! 两者都不会让作业失败，调用失败时返回空结果。

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::oracle_client::OracleClient;
use super::prompts::{annotation_prompt, knowledge_prompt, ANNOTATION_SYSTEM, KNOWLEDGE_SYSTEM};
use crate::models::{Annotation, BatchResult, KnowledgeInsight, Rubric, StudentSummary};

pub struct PostReviewer {
    oracle: OracleClient,
    max_concurrency: usize,
}

impl PostReviewer {
    pub fn new(oracle: OracleClient, max_concurrency: usize) -> Self {
        Self {
            oracle,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// 为每个学生列出扣分点
    pub async fn annotate(&self, summaries: &[StudentSummary]) -> Vec<Annotation> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let futures = summaries.iter().filter_map(|summary| {
            let succeeded: Vec<&BatchResult> = summary.batch_results.iter().filter(|r| r.succeeded).collect();
            if succeeded.is_empty() {
                return None;
            }
            let semaphore = Arc::clone(&semaphore);
            Some(async move {
                let _permit = semaphore.acquire().await.ok()?;
                let prompt = annotation_prompt(&summary.display_name, &succeeded);
                match self.oracle.call_text(&prompt, &[], Some(ANNOTATION_SYSTEM)).await {
                    Ok(text) => Some(Annotation {
                        student_id: summary.student_id.clone(),
                        points: bullet_points(&text),
                    }),
                    Err(failure) => {
                        warn!("⚠️ {} 的扣分点标注失败: {}", summary.display_name, failure);
                        None
                    }
                }
            })
        });

        let annotations: Vec<Annotation> = join_all(futures).await.into_iter().flatten().collect();
        info!("🔖 扣分点标注完成: {} 名学生", annotations.len());
        annotations
    }

    /// 挖掘薄弱知识点
    pub async fn mine_knowledge(&self, summaries: &[StudentSummary]) -> Option<KnowledgeInsight> {
        let succeeded: Vec<&BatchResult> = summaries
            .iter()
            .flat_map(|s| s.batch_results.iter())
            .filter(|r| r.succeeded)
            .collect();
        if succeeded.is_empty() {
            return None;
        }

        let prompt = knowledge_prompt(&succeeded);
        match self.oracle.call_text(&prompt, &[], Some(KNOWLEDGE_SYSTEM)).await {
            Ok(text) => {
                let weak_points = bullet_points(&text);
                info!("🧠 知识点分析完成: {} 个薄弱点", weak_points.len());
                Some(KnowledgeInsight { text, weak_points })
            }
            Err(failure) => {
                warn!("⚠️ 知识点分析失败: {}", failure);
                None
            }
        }
    }
}

/// 整体得分率
///
/// 需要评分细则提供满分；只统计有分数的学生。
pub fn score_ratio(summaries: &[StudentSummary], rubric: Option<&Rubric>) -> Option<f64> {
    let full = rubric?.total().filter(|t| *t > 0.0)?;
    let scores: Vec<f64> = summaries.iter().filter_map(|s| s.total_score).collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / (full * scores.len() as f64))
}

/// 提取以 `-`、`•`、`*` 或序号开头的行
pub fn bullet_points(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let stripped = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("• "))
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    let digits = line.chars().take_while(char::is_ascii_digit).count();
                    if digits == 0 {
                        return None;
                    }
                    line[digits..]
                        .strip_prefix(". ")
                        .or_else(|| line[digits..].strip_prefix("、"))
                })?;
            let stripped = stripped.trim();
            (!stripped.is_empty()).then(|| stripped.to_string())
        })
        .collect()
}
