//! 结构分析 - 业务能力层
//!
//! 一次 Oracle 调用识别题目总数和学生名单。识别失败不会让作业失败，
//! 而是退回一次性批改模式。

use serde_json::Value;
use tracing::{info, warn};

use super::extraction::{extract_question_count, extract_student_names, split_names};
use super::oracle_client::OracleClient;
use super::prompts::{structure_prompt, STRUCTURE_SYSTEM};
use crate::error::{AppResult, StructureError};
use crate::infrastructure::OracleReply;
use crate::models::structure::MAX_QUESTIONS;
use crate::models::{Confidence, JobContent, StructureReport};

/// 结构分析器
pub struct StructureAnalyzer {
    oracle: OracleClient,
}

impl StructureAnalyzer {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }

    /// 分析作业结构
    ///
    /// # 返回
    /// 只有在没有任何内容可分析时返回错误；Oracle 失败或回复无法解析时返回兜底结构
    pub async fn analyze(&self, content: &JobContent) -> AppResult<StructureReport> {
        if content.blocks.is_empty() {
            return Err(StructureError::NoContent {
                documents: content.documents.len(),
            }
            .into());
        }

        let prompt = structure_prompt(&content.labeled_text());
        let images = content.image_blocks();

        let report = match self.oracle.call(&prompt, &images, Some(STRUCTURE_SYSTEM)).await {
            Ok(reply) => parse_reply(&reply),
            Err(failure) => {
                warn!("⚠️ 结构分析调用失败，使用一次性批改模式: {}", failure);
                StructureReport::fallback(Vec::new())
            }
        };
        debug_assert!(report.is_consistent());

        match report.confidence {
            Confidence::High => info!(
                "📊 识别到 {} 道题，{} 名学生",
                report.total_questions,
                report.students.len()
            ),
            Confidence::Low => warn!("⚠️ 未能识别题目数量，使用一次性批改模式（{} 名学生）", report.students.len()),
        }
        Ok(report)
    }
}

/// 解析结构识别回复
///
/// 结构化回复优先；缺少题目数量时退回文本规则，再退回兜底结构。
pub fn parse_reply(reply: &OracleReply) -> StructureReport {
    match reply {
        OracleReply::Structured(value) => {
            parse_structured(value).unwrap_or_else(|| parse_text(&reply.clone().into_text()))
        }
        OracleReply::Text(text) => parse_text(text),
    }
}

fn parse_text(text: &str) -> StructureReport {
    let names = extract_student_names(text).unwrap_or_default();
    match extract_question_count(text) {
        Some(total) if total <= MAX_QUESTIONS => StructureReport::identified(total, names),
        Some(total) => implausible_count(u64::from(total), names),
        None => StructureReport::fallback(names),
    }
}

fn implausible_count(total: u64, names: Vec<String>) -> StructureReport {
    warn!("⚠️ 识别到的题目数 {} 超过上限 {}，按识别失败处理", total, MAX_QUESTIONS);
    StructureReport::fallback(names)
}

fn parse_structured(value: &Value) -> Option<StructureReport> {
    let count = value.get("total_questions").and_then(Value::as_u64).filter(|n| *n > 0)?;
    let total = u32::try_from(count).unwrap_or(u32::MAX);

    let names: Vec<(String, Option<Vec<u32>>)> = match value.get("students") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some((name.trim().to_string(), None)),
                Value::Object(obj) => {
                    let name = obj.get("name")?.as_str()?.trim().to_string();
                    let questions = obj.get("question_numbers").and_then(Value::as_array).map(|qs| {
                        let mut qs: Vec<u32> = qs
                            .iter()
                            .filter_map(Value::as_u64)
                            .filter_map(|q| u32::try_from(q).ok())
                            .filter(|q| (1..=total).contains(q))
                            .collect();
                        qs.sort_unstable();
                        qs.dedup();
                        qs
                    });
                    Some((name, questions.filter(|qs| !qs.is_empty())))
                }
                _ => None,
            })
            .filter(|(name, _)| !name.is_empty())
            .collect(),
        Some(Value::String(list)) => split_names(list).into_iter().map(|n| (n, None)).collect(),
        _ => Vec::new(),
    };

    let student_names: Vec<String> = names.iter().map(|(n, _)| n.clone()).collect();
    if total > MAX_QUESTIONS {
        return Some(implausible_count(count, student_names));
    }

    let mut report = StructureReport::identified(total, student_names);
    // 个别学生只作答了部分题目
    for (student, (_, questions)) in report.students.iter_mut().zip(&names) {
        if let Some(questions) = questions {
            student.question_numbers = questions.clone();
        }
    }
    Some(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::error::{AppError, OracleError};
    use crate::models::structure::DEFAULT_STUDENT_NAME;
    use crate::models::ContentBlock;
    use crate::testing::{test_oracle_config, FakeTransport};

    fn content() -> JobContent {
        JobContent::new(Vec::new(), vec![ContentBlock::text("doc_1", "1. A 2. B")])
    }

    fn analyzer(transport: FakeTransport) -> StructureAnalyzer {
        StructureAnalyzer::new(OracleClient::new(Arc::new(transport), test_oracle_config()))
    }

    #[tokio::test]
    async fn test_text_reply_identifies_students() {
        let report = analyzer(FakeTransport::replying("题目总数：4\n学生信息：张三，李四"))
            .analyze(&content())
            .await
            .unwrap();
        assert_eq!(report.total_questions, 4);
        assert_eq!(report.students.len(), 2);
        assert_eq!(report.confidence, Confidence::High);
        assert!(!report.single_batch_mode);
    }

    #[tokio::test]
    async fn test_unparsable_reply_falls_back() {
        let report = analyzer(FakeTransport::replying("我看不清这些文件"))
            .analyze(&content())
            .await
            .unwrap();
        assert!(report.single_batch_mode);
        assert_eq!(report.confidence, Confidence::Low);
        assert_eq!(report.students.len(), 1);
        assert_eq!(report.students[0].display_name, DEFAULT_STUDENT_NAME);
        assert_eq!(report.students[0].question_numbers, vec![1]);
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back() {
        let transport = FakeTransport::failing(OracleError::Auth { message: "401".into() });
        let report = analyzer(transport).analyze(&content()).await.unwrap();
        assert!(report.single_batch_mode);
        assert_eq!(report.total_questions, 1);
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let result = analyzer(FakeTransport::replying("题目总数：4"))
            .analyze(&JobContent::default())
            .await;
        assert!(matches!(result, Err(AppError::Structure(_))));
    }

    #[test]
    fn test_structured_reply_with_partial_questions() {
        let reply = OracleReply::Structured(json!({
            "total_questions": 3,
            "students": [
                {"name": "张三"},
                {"name": "李四", "question_numbers": [3, 1, 9]}
            ]
        }));
        let report = parse_reply(&reply);
        assert_eq!(report.students[0].question_numbers, vec![1, 2, 3]);
        assert_eq!(report.students[1].question_numbers, vec![1, 3]);
    }

    #[test]
    fn test_implausible_question_count_falls_back() {
        let report = parse_reply(&OracleReply::Text("题目总数：30000000\n学生信息：甲，乙".to_string()));
        assert!(report.single_batch_mode);
        assert_eq!(report.confidence, Confidence::Low);
        assert_eq!(report.students.len(), 2);
        assert_eq!(report.students[1].question_numbers, vec![1]);

        let reply = OracleReply::Structured(json!({"total_questions": 4_000_000_000u64, "students": ["甲"]}));
        let report = parse_reply(&reply);
        assert!(report.single_batch_mode);
        assert_eq!(report.students[0].display_name, "甲");

        let at_limit = parse_reply(&OracleReply::Text(format!("题目总数：{}", MAX_QUESTIONS)));
        assert_eq!(at_limit.total_questions, MAX_QUESTIONS);
        assert!(!at_limit.single_batch_mode);
    }

    #[test]
    fn test_structured_reply_without_count_uses_text_rules() {
        let reply = OracleReply::Structured(json!({"students": "张三、李四"}));
        let report = parse_reply(&reply);
        assert!(report.single_batch_mode);
    }
}
