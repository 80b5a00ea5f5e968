//! 报告渲染
//!
//! 文本报告和 HTML 报告都由同一份 [`StudentSummary`] 列表生成，纯函数，无副作用。

use std::fmt::Write as _;

use crate::models::{Annotation, BatchResult, KnowledgeInsight, StudentSummary};

/// 报告需要的附加信息
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub processing_time_seconds: f64,
    pub total_batches: usize,
    pub total_students: usize,
    pub single_batch_mode: bool,
    pub annotations: &'a [Annotation],
    pub knowledge: Option<&'a KnowledgeInsight>,
}

/// 渲染文本报告
pub fn render_text(summaries: &[StudentSummary], ctx: &ReportContext<'_>) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();

    out.push_str("# 🎓 智能批改完整报告\n");
    let _ = writeln!(out, "\n处理时间: {:.2}秒", ctx.processing_time_seconds);
    let _ = writeln!(out, "批次数量: {}", ctx.total_batches);
    let _ = writeln!(out, "学生数量: {}", ctx.total_students);
    if ctx.single_batch_mode {
        out.push_str("⚠️ 未能识别作业结构，已按整体批改\n");
    }
    let _ = writeln!(out, "\n{rule}");

    for summary in summaries {
        for result in &summary.batch_results {
            let _ = writeln!(
                out,
                "\n## 学生: {} - 题目 {}",
                summary.display_name,
                result.question_range()
            );
            if result.succeeded {
                let _ = writeln!(out, "{}", result.raw_text);
            } else {
                let _ = writeln!(out, "❌ {}", result.raw_text);
            }
            let _ = writeln!(out, "\n{}", "-".repeat(40));
        }
    }

    let _ = writeln!(out, "\n\n{rule}\n# 📊 学习总结");
    for summary in summaries {
        let _ = writeln!(out, "\n## 🎯 {}", summary.display_name);
        if let Some(score) = summary.total_score {
            let _ = writeln!(out, "得分: {}", format_score(score));
        }
        let failed = summary.failed_batches();
        if failed > 0 {
            let _ = writeln!(out, "⚠️ {} 个批次批改失败", failed);
        }
        let _ = writeln!(out, "{}", summary.narrative);

        if let Some(annotation) = ctx.annotations.iter().find(|a| a.student_id == summary.student_id) {
            if !annotation.points.is_empty() {
                out.push_str("\n扣分点:\n");
                for point in &annotation.points {
                    let _ = writeln!(out, "- {}", point);
                }
            }
        }
        let _ = writeln!(out, "\n{rule}");
    }

    if let Some(knowledge) = ctx.knowledge {
        let _ = writeln!(out, "\n# 🧠 知识点分析\n{}", knowledge.text);
    }
    out
}

/// 渲染 HTML 报告
pub fn render_html(summaries: &[StudentSummary], ctx: &ReportContext<'_>) -> String {
    let mut html = String::new();
    html.push_str(concat!(
        "<div class=\"grading-report\" style=\"font-family: 'Microsoft YaHei', Arial, sans-serif; ",
        "max-width: 1400px; margin: 0 auto; padding: 20px; background-color: #f5f5f5;\">\n",
        "<style>\n",
        ".report-header { background: #4a90e2; color: white; padding: 25px 30px; border-radius: 8px; }\n",
        ".stat-item { display: inline-block; margin-right: 16px; }\n",
        ".student-section { background: white; border-radius: 8px; padding: 25px 30px; margin: 20px 0; }\n",
        ".batch { border-left: 4px solid #5cb85c; padding: 8px 16px; margin: 12px 0; white-space: pre-wrap; }\n",
        ".batch.failed { border-left-color: #d9534f; color: #a94442; }\n",
        ".score-badge { background: #f0ad4e; color: white; border-radius: 12px; padding: 2px 10px; }\n",
        ".narrative { white-space: pre-wrap; background: #f9f9f9; padding: 12px; }\n",
        "</style>\n",
    ));

    let _ = write!(
        html,
        concat!(
            "<div class=\"report-header\"><div class=\"report-title\">🎓 智能批改完整报告</div>",
            "<span class=\"stat-item\">⏱️ {:.2}秒</span>",
            "<span class=\"stat-item\">📦 {} 个批次</span>",
            "<span class=\"stat-item\">👥 {} 名学生</span>",
        ),
        ctx.processing_time_seconds, ctx.total_batches, ctx.total_students
    );
    if ctx.single_batch_mode {
        html.push_str("<span class=\"stat-item\">⚠️ 整体批改模式</span>");
    }
    html.push_str("</div>\n");

    for summary in summaries {
        html.push_str("<div class=\"student-section\">\n");
        let _ = write!(html, "<h2>🎯 {}", escape_html(&summary.display_name));
        if let Some(score) = summary.total_score {
            let _ = write!(html, " <span class=\"score-badge\">{}</span>", format_score(score));
        }
        html.push_str("</h2>\n");

        for result in &summary.batch_results {
            html.push_str(&render_batch_html(result));
        }

        let _ = writeln!(
            html,
            "<div class=\"narrative\">{}</div>",
            escape_html(&summary.narrative)
        );

        if let Some(annotation) = ctx.annotations.iter().find(|a| a.student_id == summary.student_id) {
            if !annotation.points.is_empty() {
                html.push_str("<ul class=\"annotations\">");
                for point in &annotation.points {
                    let _ = write!(html, "<li>{}</li>", escape_html(point));
                }
                html.push_str("</ul>\n");
            }
        }
        html.push_str("</div>\n");
    }

    if let Some(knowledge) = ctx.knowledge {
        let _ = writeln!(
            html,
            "<div class=\"student-section knowledge\"><h2>🧠 知识点分析</h2><div class=\"narrative\">{}</div></div>",
            escape_html(&knowledge.text)
        );
    }

    html.push_str("</div>\n");
    html
}

fn render_batch_html(result: &BatchResult) -> String {
    let class = if result.succeeded { "batch" } else { "batch failed" };
    let mut out = format!(
        "<div class=\"{}\"><h3>题目 {}",
        class,
        escape_html(&result.question_range())
    );
    if let Some(score) = result.extracted_score {
        let _ = write!(out, " <span class=\"score-badge\">{}</span>", format_score(score));
    }
    let _ = writeln!(out, "</h3>{}</div>", escape_html(&result.raw_text));
    out
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{:.0}分", score)
    } else {
        format!("{:.1}分", score)
    }
}

/// HTML 转义
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
