//! 文件角色识别
//!
//! 默认实现按文件名关键字判断，容易误判，所以放在 [`RoleClassifier`] 接口后面，可以替换。

use phf::phf_map;

use crate::models::Role;

/// 文件角色识别接口
pub trait RoleClassifier: Send + Sync {
    fn classify(&self, file_name: &str) -> Role;
}

/// 文件名关键字（小写） → 角色
static ROLE_KEYWORDS: phf::Map<&'static str, Role> = phf_map! {
    "marking" => Role::Marking,
    "rubric" => Role::Marking,
    "标准" => Role::Marking,
    "评分" => Role::Marking,
    "answer" => Role::Answer,
    "答案" => Role::Answer,
    "作答" => Role::Answer,
    "question" => Role::Question,
    "题目" => Role::Question,
    "试题" => Role::Question,
};

/// 同时命中多个关键字时的优先级：批改标准 > 学生答案 > 题目
fn priority(role: Role) -> u8 {
    match role {
        Role::Marking => 3,
        Role::Answer => 2,
        Role::Question => 1,
        Role::Unknown => 0,
    }
}

/// 基于文件名关键字的默认实现
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRoleClassifier;

impl RoleClassifier for KeywordRoleClassifier {
    fn classify(&self, file_name: &str) -> Role {
        let lower = file_name.to_lowercase();
        ROLE_KEYWORDS
            .entries()
            .filter(|(keyword, _)| lower.contains(*keyword))
            .map(|(_, role)| *role)
            .max_by_key(|role| priority(*role))
            .unwrap_or(Role::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_case_insensitive() {
        let classifier = KeywordRoleClassifier;
        assert_eq!(classifier.classify("MARKING_期中.pdf"), Role::Marking);
        assert_eq!(classifier.classify("Answer_sheet.png"), Role::Answer);
        assert_eq!(classifier.classify("QUESTION_1.txt"), Role::Question);
        assert_eq!(classifier.classify("scan_01.png"), Role::Unknown);
    }

    #[test]
    fn test_marking_wins_over_answer_and_question() {
        let classifier = KeywordRoleClassifier;
        assert_eq!(classifier.classify("标准答案.docx"), Role::Marking);
        assert_eq!(classifier.classify("题目答案.txt"), Role::Answer);
    }
}
