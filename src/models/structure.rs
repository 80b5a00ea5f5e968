//! 作业结构模型

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 默认学生 ID
pub const DEFAULT_STUDENT_ID: &str = "student_001";
/// 默认学生名称
pub const DEFAULT_STUDENT_NAME: &str = "默认学生";
/// 一份作业最多的题目数，超过时视为识别失败
pub const MAX_QUESTIONS: u32 = 200;

/// 识别置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    High,
}

/// 学生信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRef {
    pub id: String,
    pub display_name: String,
    pub question_numbers: Vec<u32>,
}

impl StudentRef {
    pub fn new(index: usize, display_name: impl Into<String>, question_numbers: Vec<u32>) -> Self {
        Self {
            id: student_id(index),
            display_name: display_name.into(),
            question_numbers,
        }
    }
}

/// 第 `index` 个学生（从 0 开始）的 ID
pub fn student_id(index: usize) -> String {
    format!("student_{:03}", index + 1)
}

/// 结构分析结果
///
/// 每个作业生成一次，之后只读。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    pub total_questions: u32,
    pub students: Vec<StudentRef>,
    pub confidence: Confidence,
    pub single_batch_mode: bool,
}

impl StructureReport {
    /// 识别成功时的结构
    ///
    /// 没有识别到学生姓名时使用一个默认学生。
    pub fn identified(total_questions: u32, names: Vec<String>) -> Self {
        let questions: Vec<u32> = (1..=total_questions).collect();
        Self {
            total_questions,
            students: build_students(names, &questions),
            confidence: Confidence::High,
            single_batch_mode: false,
        }
    }

    /// 兜底结构：一次性批改模式
    ///
    /// 已识别的学生姓名会保留，每人只覆盖“第 1 题”（即整体）。
    pub fn fallback(names: Vec<String>) -> Self {
        Self {
            total_questions: 1,
            students: build_students(names, &[1]),
            confidence: Confidence::Low,
            single_batch_mode: true,
        }
    }

    /// 低置信度必须是一次性批改模式
    pub fn is_consistent(&self) -> bool {
        self.confidence == Confidence::High || self.single_batch_mode
    }
}

fn build_students(names: Vec<String>, questions: &[u32]) -> Vec<StudentRef> {
    if names.is_empty() {
        return vec![StudentRef {
            id: DEFAULT_STUDENT_ID.to_string(),
            display_name: DEFAULT_STUDENT_NAME.to_string(),
            question_numbers: questions.to_vec(),
        }];
    }
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| StudentRef::new(i, name, questions.to_vec()))
        .collect()
}

/// 评分标准
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub text: String,
    /// 题号 → 满分
    pub max_scores: BTreeMap<u32, f64>,
}

impl Rubric {
    /// 一组题目的满分之和，任一题缺失满分时返回 `None`
    pub fn max_for(&self, questions: &[u32]) -> Option<f64> {
        if questions.is_empty() {
            return None;
        }
        questions
            .iter()
            .map(|q| self.max_scores.get(q).copied())
            .sum::<Option<f64>>()
    }

    /// 全部题目的满分之和
    pub fn total(&self) -> Option<f64> {
        if self.max_scores.is_empty() {
            None
        } else {
            Some(self.max_scores.values().sum())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_low_confidence_single_batch() {
        let report = StructureReport::fallback(vec![]);
        assert_eq!(report.total_questions, 1);
        assert_eq!(report.confidence, Confidence::Low);
        assert!(report.single_batch_mode);
        assert_eq!(report.students.len(), 1);
        assert_eq!(report.students[0].id, DEFAULT_STUDENT_ID);
        assert_eq!(report.students[0].question_numbers, vec![1]);
        assert!(report.is_consistent());
    }

    #[test]
    fn test_identified_gives_each_student_all_questions() {
        let report = StructureReport::identified(4, vec!["张三".into(), "李四".into()]);
        assert_eq!(report.students.len(), 2);
        assert_eq!(report.students[1].id, "student_002");
        assert_eq!(report.students[1].question_numbers, vec![1, 2, 3, 4]);
        assert!(!report.single_batch_mode);
    }

    #[test]
    fn test_rubric_max_requires_every_question() {
        let rubric = Rubric {
            text: String::new(),
            max_scores: BTreeMap::from([(1, 5.0), (2, 10.0)]),
        };
        assert_eq!(rubric.max_for(&[1, 2]), Some(15.0));
        assert_eq!(rubric.max_for(&[2, 3]), None);
        assert_eq!(rubric.total(), Some(15.0));
    }
}
