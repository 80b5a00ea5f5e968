//! 提示词模板
//!
//! 各阶段的系统消息和用户提示词。回复格式与 [`super::extraction`] 中的解析规则对应。

use crate::models::{BatchResult, BatchTask, Rubric, StructureReport};

pub const STRUCTURE_SYSTEM: &str = "你是一位专业的阅卷组织者，负责识别批改任务的结构：题目数量和学生名单。\
只做结构识别，不要批改。";

pub const GRADING_SYSTEM: &str = "你是一位严谨的阅卷老师。严格依据批改标准逐题批改学生答案，\
给出每题得分和扣分理由，最后单独一行写出“总分：X分”。";

pub const SUMMARY_SYSTEM: &str = "你是一位耐心的老师，根据批改结果为学生写一段简洁的总结：\
整体表现、主要问题和改进建议。";

pub const TRANSCRIBE_SYSTEM: &str = "你是一位文字识别助手。把图片中的文字、公式和作答内容按原顺序完整转写为纯文本，\
不要评价或批改。";

pub const RUBRIC_SYSTEM: &str = "你是一位阅卷组长，负责从批改标准文件中整理评分细则。";

pub const ANNOTATION_SYSTEM: &str = "你是一位阅卷老师，负责从批改结果中列出学生的扣分点，每行一条，以“- ”开头。";

pub const KNOWLEDGE_SYSTEM: &str = "你是一位教研老师，负责根据批改结果分析学生整体的薄弱知识点。";

/// 结构识别提示词
pub fn structure_prompt(labeled_text: &str) -> String {
    format!(
        r#"请分析以下作业文件，识别题目数量和学生信息。

{labeled_text}

请严格按照以下格式回答：
题目总数：[数字]
学生信息：[学生姓名，多个学生用逗号分隔；无法识别时写“无”]

也可以直接返回 JSON：{{"total_questions": 数字, "students": [{{"name": "姓名"}}]}}"#
    )
}

/// 批次批改提示词
pub fn grading_prompt(task: &BatchTask, rubric: Option<&Rubric>) -> String {
    let scope = if task.whole_submission {
        "请对该学生的全部作答进行整体批改。".to_string()
    } else {
        format!(
            "本批次只批改第 {} 题（共 {} 道），其余题目忽略。",
            task.question_range(),
            task.question_numbers.len()
        )
    };

    let rubric_text = rubric
        .filter(|r| !r.text.trim().is_empty())
        .map(|r| format!("\n\n【评分细则】\n{}", r.text.trim()))
        .unwrap_or_default();

    format!(
        "学生：{}\n{}{}\n\n以下是作业内容：\n{}",
        task.student_name,
        scope,
        rubric_text,
        task.content.labeled_text()
    )
}

/// 学生总结提示词（只包含成功的批次）
pub fn summary_prompt(display_name: &str, results: &[&BatchResult]) -> String {
    let sections: Vec<String> = results
        .iter()
        .map(|r| format!("【第 {} 题】\n{}", r.question_range(), r.raw_text))
        .collect();
    format!(
        "学生：{}\n以下是该学生各批次的批改结果：\n\n{}\n\n请写出总结。",
        display_name,
        sections.join("\n\n")
    )
}

/// 图像转写提示词
pub fn transcribe_prompt(image_count: usize) -> String {
    format!("请转写以下 {} 张图片中的全部内容。", image_count)
}

/// 评分细则提取提示词
pub fn rubric_prompt(marking_text: &str, report: Option<&StructureReport>) -> String {
    let hint = report
        .map(|r| format!("（共 {} 道题）", r.total_questions))
        .unwrap_or_default();
    format!(
        "请整理以下批改标准{}。先逐行列出每道题的满分，格式为“第n题：m分”，\
然后给出完整的评分细则。\n\n{}",
        hint, marking_text
    )
}

/// 扣分点提示词
pub fn annotation_prompt(display_name: &str, results: &[&BatchResult]) -> String {
    format!("{}\n\n请列出扣分点。", summary_prompt(display_name, results).trim_end_matches("请写出总结。").trim_end())
}

/// 知识点分析提示词
pub fn knowledge_prompt(results: &[&BatchResult]) -> String {
    let sections: Vec<String> = results
        .iter()
        .map(|r| format!("【{} 第 {} 题】\n{}", r.student_id, r.question_range(), r.raw_text))
        .collect();
    format!(
        "以下是全班的批改结果：\n\n{}\n\n请列出薄弱知识点，每行一条，以“- ”开头，最后给出教学建议。",
        sections.join("\n\n")
    )
}
