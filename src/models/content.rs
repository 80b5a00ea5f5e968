//! 内容模型
//!
//! 文件读取后统一转换为 [`ContentBlock`]，之后各阶段只依赖这一种表示。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::structure::Rubric;

/// 内容块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Image,
}

/// 标准化后的内容块
///
/// 图像块的 `payload` 是 base64 编码的数据。创建后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub payload: String,
    /// 图像 MIME 类型，文本块为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// 来源文件 ID
    pub origin: String,
}

impl ContentBlock {
    /// 创建文本块
    pub fn text(origin: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Text,
            payload: payload.into(),
            mime: None,
            origin: origin.into(),
        }
    }

    /// 创建图像块
    pub fn image(origin: impl Into<String>, mime: impl Into<String>, base64_data: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Image,
            payload: base64_data.into(),
            mime: Some(mime.into()),
            origin: origin.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind == BlockKind::Image
    }

    /// 图像块的 data URL，文本块返回 `None`
    pub fn data_url(&self) -> Option<String> {
        match self.kind {
            BlockKind::Image => Some(format!(
                "data:{};base64,{}",
                self.mime.as_deref().unwrap_or("image/jpeg"),
                self.payload
            )),
            BlockKind::Text => None,
        }
    }
}

/// 文件类型（由文件读取方分类）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Image,
    Document,
    StructuredText,
    PlainText,
    Unknown,
}

impl DocumentKind {
    /// 是否需要渲染为图像后才能提交
    pub fn requires_rendering(self) -> bool {
        matches!(self, DocumentKind::Image | DocumentKind::Document)
    }
}

/// 文件角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// 批改标准
    Marking,
    /// 题目
    Question,
    /// 学生答案
    Answer,
    Unknown,
}

impl Role {
    /// 获取显示名称
    pub fn label(self) -> &'static str {
        match self {
            Role::Marking => "批改标准文件",
            Role::Question => "题目文件",
            Role::Answer => "学生答案文件",
            Role::Unknown => "文件",
        }
    }

    /// 是否作为学生答案批改（未知文件当作答案）
    pub fn is_gradable(self) -> bool {
        matches!(self, Role::Answer | Role::Unknown)
    }
}

/// 调用方提供的文件元信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// 显示名称（默认使用文件名）
    #[serde(default)]
    pub name: Option<String>,
    /// 显式指定角色，优先于文件名推断
    #[serde(default)]
    pub role: Option<Role>,
}

/// 一个已分类的输入文件
#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    pub id: String,
    pub path: PathBuf,
    pub name: String,
    pub kind: DocumentKind,
    pub role: Role,
}

/// 一次作业共享的内容
///
/// 由批次任务通过 `Arc` 引用，只读。
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobContent {
    pub documents: Vec<SourceDocument>,
    pub blocks: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubric: Option<Rubric>,
}

impl JobContent {
    pub fn new(documents: Vec<SourceDocument>, blocks: Vec<ContentBlock>) -> Self {
        Self {
            documents,
            blocks,
            rubric: None,
        }
    }

    /// 根据来源 ID 查找文件角色
    pub fn role_of(&self, origin: &str) -> Role {
        self.documents
            .iter()
            .find(|d| d.id == origin)
            .map(|d| d.role)
            .unwrap_or(Role::Unknown)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.documents.iter().any(|d| d.role == role)
    }

    /// 全部图像块
    pub fn image_blocks(&self) -> Vec<ContentBlock> {
        self.blocks.iter().filter(|b| b.is_image()).cloned().collect()
    }

    /// 指定角色文件的图像块
    pub fn image_blocks_for(&self, role: Role) -> Vec<ContentBlock> {
        self.blocks
            .iter()
            .filter(|b| b.is_image() && self.role_of(&b.origin) == role)
            .cloned()
            .collect()
    }

    /// 指定角色文件的文本
    pub fn text_for(&self, role: Role) -> String {
        self.blocks
            .iter()
            .filter(|b| !b.is_image() && self.role_of(&b.origin) == role)
            .map(|b| b.payload.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 按角色分区的结构化文本
    ///
    /// 顺序固定为：批改标准 → 题目 → 学生答案（未知文件并入答案）。
    pub fn labeled_text(&self) -> String {
        let mut sections = Vec::new();
        for (title, roles) in [
            ("📊 批改标准文件（包含正确答案和评分标准）", &[Role::Marking][..]),
            ("📋 题目文件（包含考试题目）", &[Role::Question][..]),
            ("✏️ 学生答案文件（需要批改的内容）", &[Role::Answer, Role::Unknown][..]),
        ] {
            let mut parts = Vec::new();
            for doc in self.documents.iter().filter(|d| roles.contains(&d.role)) {
                let blocks: Vec<&ContentBlock> = self.blocks.iter().filter(|b| b.origin == doc.id).collect();
                let image_count = blocks.iter().filter(|b| b.is_image()).count();
                let text = blocks
                    .iter()
                    .filter(|b| !b.is_image())
                    .map(|b| b.payload.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");

                let mut part = format!("=== {}: {} ===", doc.role.label(), doc.name);
                if image_count > 0 {
                    part.push_str(&format!("\n[包含 {} 张图像，已随请求附上]", image_count));
                }
                if !text.is_empty() {
                    part.push('\n');
                    part.push_str(&text);
                }
                parts.push(part);
            }
            if parts.is_empty() {
                continue;
            }
            let rule = "=".repeat(60);
            sections.push(format!("{rule}\n{title}：\n{rule}\n{}\n{rule}", parts.join("\n\n")));
        }
        sections.join("\n")
    }
}
