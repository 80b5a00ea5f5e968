//! 文件读取 - 基础设施层
//!
//! 把输入文件转换为内容块。核心流程只依赖 [`DocumentIngestor`] 接口。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::renderer::ImageFileRenderer;
use super::rendering::RenderPipeline;
use crate::config::GradingConfig;
use crate::error::IngestError;
use crate::models::{ContentBlock, DocumentKind};

/// 文件读取接口
#[async_trait]
pub trait DocumentIngestor: Send + Sync {
    /// 判断文件类型
    fn classify(&self, path: &Path) -> DocumentKind;

    /// 读取文件并转换为内容块
    ///
    /// 多页文档返回多个图像块。读取失败时返回一条说明错误的文本块，不返回错误。
    async fn normalize(&self, path: &Path, origin: &str) -> Vec<ContentBlock>;
}

/// 根据扩展名判断文件类型
pub fn classify_by_extension(path: &Path) -> DocumentKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => DocumentKind::Image,
        "pdf" | "doc" | "docx" => DocumentKind::Document,
        "json" | "csv" | "toml" | "yaml" | "yml" => DocumentKind::StructuredText,
        "txt" | "md" => DocumentKind::PlainText,
        _ => DocumentKind::Unknown,
    }
}

/// 文件名（用于提示信息）
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// 基于本地文件系统的实现
#[derive(Clone)]
pub struct FsIngestor {
    pipeline: RenderPipeline,
}

impl FsIngestor {
    pub fn new(pipeline: RenderPipeline) -> Self {
        Self { pipeline }
    }

    /// 默认组件：图像文件渲染 + 文档文本提取
    pub fn from_config(config: &GradingConfig) -> Self {
        Self::new(RenderPipeline::new(Arc::new(ImageFileRenderer), config))
    }

    async fn read_text(&self, path: &Path, origin: &str) -> Vec<ContentBlock> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                debug!("读取文本文件 {}，{} 字符", path.display(), text.chars().count());
                vec![ContentBlock::text(origin, format!("{}\n{}", file_name(path), text))]
            }
            Err(e) => {
                warn!("⚠️ 读取文件失败 ({}): {}", path.display(), e);
                vec![error_note(
                    origin,
                    path,
                    IngestError::ReadFailed {
                        path: path.display().to_string(),
                        source: e,
                    },
                )]
            }
        }
    }

    async fn render(&self, path: &Path, origin: &str) -> Vec<ContentBlock> {
        let pipeline = self.pipeline.clone();
        let owned: PathBuf = path.to_path_buf();
        let images = match tokio::task::spawn_blocking(move || pipeline.render(&owned)).await {
            Ok(images) => images,
            Err(e) => {
                warn!("⚠️ 渲染任务异常 ({}): {}", path.display(), e);
                Vec::new()
            }
        };

        if !images.is_empty() {
            return RenderPipeline::to_blocks(origin, images);
        }

        // 渲染完全失败，改用文本提取
        match self.extract_text(path).await {
            Ok(text) => vec![ContentBlock::text(origin, format!("{}\n{}", file_name(path), text))],
            Err(e) => vec![error_note(origin, path, e)],
        }
    }

    /// PDF / Word 文档：渲染器能打开时先渲染，否则先提取文本，都不行再走占位图
    async fn read_document(&self, path: &Path, origin: &str) -> Vec<ContentBlock> {
        if self.pipeline.renderer().can_render(path) {
            return self.render(path, origin).await;
        }
        match self.extract_text(path).await {
            Ok(text) => {
                debug!("从 {} 提取到 {} 字符", path.display(), text.chars().count());
                vec![ContentBlock::text(origin, format!("{}\n{}", file_name(path), text))]
            }
            Err(e) => {
                warn!("⚠️ 文本提取失败 ({})，改为渲染: {}", path.display(), e);
                self.render(path, origin).await
            }
        }
    }

    async fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let renderer = self.pipeline.renderer().clone();
        let owned: PathBuf = path.to_path_buf();
        match tokio::task::spawn_blocking(move || renderer.extract_text(&owned)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(render_failed(path, e)),
            Err(e) => Err(render_failed(path, e)),
        }
    }
}

#[async_trait]
impl DocumentIngestor for FsIngestor {
    fn classify(&self, path: &Path) -> DocumentKind {
        classify_by_extension(path)
    }

    async fn normalize(&self, path: &Path, origin: &str) -> Vec<ContentBlock> {
        if !path.exists() {
            warn!("⚠️ 文件不存在: {}", path.display());
            return vec![error_note(
                origin,
                path,
                IngestError::NotFound {
                    path: path.display().to_string(),
                },
            )];
        }

        match self.classify(path) {
            DocumentKind::Image => self.render(path, origin).await,
            DocumentKind::Document => self.read_document(path, origin).await,
            // 未知类型按文本尝试读取
            DocumentKind::StructuredText | DocumentKind::PlainText | DocumentKind::Unknown => {
                self.read_text(path, origin).await
            }
        }
    }
}

fn render_failed(path: &Path, reason: impl std::fmt::Display) -> IngestError {
    IngestError::RenderFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn error_note(origin: &str, path: &Path, err: IngestError) -> ContentBlock {
    ContentBlock::text(origin, format!("[{} 处理失败: {}]", file_name(path), err))
}
