//! 渲染降级链
//!
//! 1. 全精度渲染每一页（最多 `page_cap` 页），单页失败不影响其他页
//! 2. 失败时只渲染第一页的低精度版本
//! 3. 仍然失败时生成占位图，失败原因以文字随图发送
//! 4. 占位图也无法生成时返回空列表，由调用方改用文本提取
//!
//! 超出大小预算的图像会循环降低质量、缩小尺寸，直到满足预算或到达质量下限。

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use super::renderer::{DocumentRenderer, RasterImage, RenderFidelity};
use crate::config::GradingConfig;
use crate::models::ContentBlock;

/// 重新压缩的起始 JPEG 质量
const START_QUALITY: u8 = 85;
/// 每轮降低的质量
const QUALITY_STEP: u8 = 10;
/// 缩小尺寸时的起始最长边
const START_DIMENSION: u32 = 1600;
/// 最长边下限
const MIN_DIMENSION: u32 = 512;

/// 渲染降级链
#[derive(Clone)]
pub struct RenderPipeline {
    renderer: Arc<dyn DocumentRenderer>,
    page_cap: usize,
    budget_bytes: usize,
    min_quality: u8,
}

impl RenderPipeline {
    pub fn new(renderer: Arc<dyn DocumentRenderer>, config: &GradingConfig) -> Self {
        Self {
            renderer,
            page_cap: config.page_cap.max(1),
            budget_bytes: config.image_budget_bytes,
            min_quality: config.min_jpeg_quality.clamp(1, START_QUALITY),
        }
    }

    pub fn renderer(&self) -> &Arc<dyn DocumentRenderer> {
        &self.renderer
    }

    /// 渲染文档，返回的图像已满足大小预算（或已压缩到下限）
    pub fn render(&self, path: &Path) -> Vec<RasterImage> {
        let name = path.display();

        // 第一级：全精度逐页渲染
        let full_error = match self.render_full(path) {
            Ok(pages) if !pages.is_empty() => return pages,
            Ok(_) => String::from("所有页面渲染失败"),
            Err(e) => e.to_string(),
        };
        warn!("⚠️ 全精度渲染失败 ({}): {}，尝试低精度单页渲染", name, full_error);

        // 第二级：低精度单页
        let minimal = self
            .renderer
            .render_page(path, 0, RenderFidelity::Minimal)
            .and_then(|image| self.fit_to_budget(image));
        let reason = match minimal {
            Ok(image) => return vec![image],
            Err(e) => e.to_string(),
        };
        warn!("⚠️ 低精度渲染失败 ({}): {}，生成占位图", name, reason);

        // 第三级：占位图
        match self.renderer.placeholder(&format!("{}: {}", name, reason)) {
            Ok(image) => vec![image],
            Err(e) => {
                // 第四级：交给调用方做文本提取
                warn!("⚠️ 占位图生成失败 ({}): {}", name, e);
                Vec::new()
            }
        }
    }

    fn render_full(&self, path: &Path) -> Result<Vec<RasterImage>> {
        let total = self.renderer.page_count(path)?;
        let count = total.min(self.page_cap);
        if total > count {
            warn!("⚠️ 文档共 {} 页，只渲染前 {} 页", total, count);
        }

        let mut pages = Vec::with_capacity(count);
        for page in 0..count {
            let rendered = self
                .renderer
                .render_page(path, page, RenderFidelity::Full)
                .and_then(|image| self.fit_to_budget(image));
            match rendered {
                Ok(image) => pages.push(image),
                Err(e) => warn!("⚠️ 第 {} 页渲染失败: {}", page + 1, e),
            }
        }
        Ok(pages)
    }

    /// 压缩图像直到满足大小预算
    ///
    /// 先以最大尺寸逐步降低质量，到达质量下限后再逐步缩小尺寸。
    /// 两者都到下限仍然超出预算时，返回最后一次的结果；
    /// 无法重新编码时保留已有的最好结果，不丢弃图像。
    pub fn fit_to_budget(&self, image: RasterImage) -> Result<RasterImage> {
        if image.len() <= self.budget_bytes {
            return Ok(image);
        }
        debug!("图像 {} 字节超出预算 {} 字节，开始压缩", image.len(), self.budget_bytes);

        let mut last = None;
        let mut quality = START_QUALITY;
        while quality >= self.min_quality {
            let Some(candidate) = self.try_reencode(&image, quality, START_DIMENSION) else {
                return Ok(last.unwrap_or(image));
            };
            if candidate.len() <= self.budget_bytes {
                debug!("压缩完成: 质量 {}，{} 字节", quality, candidate.len());
                return Ok(candidate);
            }
            last = Some(candidate);
            if quality < self.min_quality + QUALITY_STEP {
                break;
            }
            quality -= QUALITY_STEP;
        }

        let mut dimension = START_DIMENSION;
        while dimension >= MIN_DIMENSION {
            let Some(candidate) = self.try_reencode(&image, self.min_quality, dimension) else {
                return Ok(last.unwrap_or(image));
            };
            if candidate.len() <= self.budget_bytes {
                debug!("压缩完成: 最长边 {}，{} 字节", dimension, candidate.len());
                return Ok(candidate);
            }
            last = Some(candidate);
            dimension = dimension * 3 / 4;
        }

        let last = last.unwrap_or(image);
        warn!("⚠️ 图像已压缩到下限仍有 {} 字节，超出预算", last.len());
        Ok(last)
    }

    fn try_reencode(&self, image: &RasterImage, quality: u8, max_dimension: u32) -> Option<RasterImage> {
        match self.renderer.reencode(image, quality, max_dimension) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!("⚠️ 图像重新编码失败，保留当前结果: {}", e);
                None
            }
        }
    }

    /// 转换为内容块，图像附带的说明作为文本块紧随其后
    pub fn to_blocks(origin: &str, images: Vec<RasterImage>) -> Vec<ContentBlock> {
        let mut blocks = Vec::with_capacity(images.len());
        for image in images {
            blocks.push(ContentBlock::image(origin, image.mime, STANDARD.encode(&image.bytes)));
            if let Some(note) = image.note {
                blocks.push(ContentBlock::text(origin, format!("[{}]", note)));
            }
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRenderer;

    fn pipeline(renderer: FakeRenderer, budget: usize) -> RenderPipeline {
        let config = GradingConfig {
            image_budget_bytes: budget,
            page_cap: 20,
            ..GradingConfig::default()
        };
        RenderPipeline::new(Arc::new(renderer), &config)
    }

    #[test]
    fn test_failed_page_does_not_abort_others() {
        let renderer = FakeRenderer::with_pages(3).failing_pages(&[1]);
        let pages = pipeline(renderer, 1024).render(Path::new("exam.pdf"));
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_page_cap_is_respected() {
        let renderer = FakeRenderer::with_pages(25);
        let pages = pipeline(renderer, 1024).render(Path::new("exam.pdf"));
        assert_eq!(pages.len(), 20);
    }

    #[test]
    fn test_falls_back_to_minimal_then_placeholder() {
        let renderer = FakeRenderer::with_pages(2).failing_full();
        let pages = pipeline(renderer, 1024).render(Path::new("exam.pdf"));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime, "image/jpeg");

        let renderer = FakeRenderer::with_pages(2).failing_full().failing_minimal();
        let pages = pipeline(renderer, 1024).render(Path::new("exam.pdf"));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime, "image/png");
        assert!(pages[0].note.is_some());

        let renderer = FakeRenderer::with_pages(2)
            .failing_full()
            .failing_minimal()
            .failing_placeholder();
        assert!(pipeline(renderer, 1024).render(Path::new("exam.pdf")).is_empty());
    }

    #[test]
    fn test_oversized_image_is_recompressed_until_it_fits() {
        // 假渲染器：质量每降低一档，体积缩小一档
        let renderer = FakeRenderer::with_pages(1).page_size(5000);
        let pipeline = pipeline(renderer, 3000);
        let image = pipeline.fit_to_budget(RasterImage::new(vec![0; 5000], "image/png")).unwrap();
        assert!(image.len() <= 3000);
        assert_eq!(image.mime, "image/jpeg");
    }

    #[test]
    fn test_stops_at_floor_when_budget_unreachable() {
        let renderer = FakeRenderer::with_pages(1).page_size(5000);
        let pipeline = pipeline(renderer, 10);
        let image = pipeline.fit_to_budget(RasterImage::new(vec![0; 5000], "image/png")).unwrap();
        assert!(image.len() > 10);
    }

    #[test]
    fn test_reencode_failure_keeps_the_image() {
        let renderer = FakeRenderer::with_pages(1).failing_reencode();
        let pipeline = pipeline(renderer, 10);
        let image = pipeline.fit_to_budget(RasterImage::new(vec![7; 500], "image/png")).unwrap();
        assert_eq!(image.len(), 500);
        assert_eq!(image.mime, "image/png");
    }

    #[test]
    fn test_blocks_are_base64_encoded() {
        let blocks = RenderPipeline::to_blocks("doc_1", vec![RasterImage::new(b"hi".to_vec(), "image/png")]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].payload, "aGk=");
        assert_eq!(blocks[0].origin, "doc_1");

        let placeholder = RasterImage::new(b"hi".to_vec(), "image/png").with_note("文档渲染失败: exam.pdf");
        let blocks = RenderPipeline::to_blocks("doc_2", vec![placeholder]);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_image());
        assert_eq!(blocks[1].payload, "[文档渲染失败: exam.pdf]");
    }
}
