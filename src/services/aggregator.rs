//! 结果汇总
//!
//! 按学生分组、按首题号排序，再为每个学生生成一段总结。
//! 失败的批次不参与总结，但保留在结果中。

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::oracle_client::OracleClient;
use super::prompts::{summary_prompt, SUMMARY_SYSTEM};
use crate::models::{BatchResult, StructureReport, StudentSummary};

/// 总结生成失败时的内容
pub const SUMMARY_UNAVAILABLE: &str = "summary unavailable";
/// 学生没有任何成功批次时的内容
pub const NO_VALID_RESULTS: &str = "无有效批改结果";

/// 结果汇总器
pub struct Aggregator {
    oracle: OracleClient,
    max_concurrency: usize,
}

impl Aggregator {
    pub fn new(oracle: OracleClient, max_concurrency: usize) -> Self {
        Self {
            oracle,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// 汇总批次结果
    ///
    /// 学生顺序与结构分析结果一致；结构中没有的学生 ID 排在最后。
    pub async fn aggregate(&self, results: Vec<BatchResult>, report: &StructureReport) -> Vec<StudentSummary> {
        let groups = group_by_student(results, report);
        info!("📝 开始生成 {} 名学生的总结", groups.len());

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let futures = groups.into_iter().map(|(student_id, display_name, batch_results)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let narrative = match semaphore.acquire().await {
                    Ok(_permit) => self.narrate(&display_name, &batch_results).await,
                    Err(_) => SUMMARY_UNAVAILABLE.to_string(),
                };
                let total_score = total_score(&batch_results);
                StudentSummary {
                    student_id,
                    display_name,
                    narrative,
                    batch_results,
                    total_score,
                }
            }
        });
        join_all(futures).await
    }

    async fn narrate(&self, display_name: &str, results: &[BatchResult]) -> String {
        let succeeded: Vec<&BatchResult> = results.iter().filter(|r| r.succeeded).collect();
        if succeeded.is_empty() {
            return NO_VALID_RESULTS.to_string();
        }

        let prompt = summary_prompt(display_name, &succeeded);
        match self.oracle.call_text(&prompt, &[], Some(SUMMARY_SYSTEM)).await {
            Ok(text) => text,
            Err(failure) => {
                warn!("⚠️ {} 的总结生成失败: {}", display_name, failure);
                SUMMARY_UNAVAILABLE.to_string()
            }
        }
    }
}

/// 按学生分组，组内按首题号排序
pub fn group_by_student(
    results: Vec<BatchResult>,
    report: &StructureReport,
) -> Vec<(String, String, Vec<BatchResult>)> {
    let mut grouped: HashMap<String, Vec<BatchResult>> = HashMap::new();
    for result in results {
        grouped.entry(result.student_id.clone()).or_default().push(result);
    }

    let mut ordered = Vec::with_capacity(grouped.len());
    for student in &report.students {
        if let Some(results) = grouped.remove(&student.id) {
            ordered.push((student.id.clone(), student.display_name.clone(), results));
        }
    }
    let mut unknown: Vec<_> = grouped
        .into_iter()
        .map(|(id, results)| (id.clone(), id, results))
        .collect();
    unknown.sort_by(|a, b| a.0.cmp(&b.0));
    ordered.extend(unknown);

    for (_, _, results) in ordered.iter_mut() {
        results.sort_by_key(|r| (r.first_question(), r.batch_id));
    }
    ordered
}

/// 成功批次中提取到的分数之和
pub fn total_score(results: &[BatchResult]) -> Option<f64> {
    results
        .iter()
        .filter(|r| r.succeeded)
        .filter_map(|r| r.extracted_score)
        .fold(None, |acc, score| Some(acc.unwrap_or(0.0) + score))
}
