//! 文档渲染接口
//!
//! 文档栅格化由具体实现提供。默认实现处理图像文件，并负责 JPEG 重新编码、
//! PNG 占位图以及 PDF / Word 文档的文本提取。

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use regex::Regex;

/// 占位图尺寸
const PLACEHOLDER_WIDTH: u32 = 800;
const PLACEHOLDER_HEIGHT: u32 = 200;
/// 占位图说明最多保留的字符数
const PLACEHOLDER_REASON_CHARS: usize = 120;

/// 渲染精度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFidelity {
    /// 正常分辨率
    Full,
    /// 降低分辨率、去掉非必要元素
    Minimal,
}

/// 栅格化后的图像
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    /// 附带的文字说明（占位图用来携带失败原因）
    pub note: Option<String>,
}

impl RasterImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 文档渲染器
///
/// 渲染是 CPU 密集操作，接口是同步的，调用方决定放在哪个线程上执行。
pub trait DocumentRenderer: Send + Sync {
    /// 是否能栅格化该文件；不能时调用方优先提取文本
    fn can_render(&self, _path: &Path) -> bool {
        true
    }

    /// 文档页数
    fn page_count(&self, path: &Path) -> Result<usize>;

    /// 渲染第 `page` 页（从 0 开始）
    fn render_page(&self, path: &Path, page: usize, fidelity: RenderFidelity) -> Result<RasterImage>;

    /// 以指定 JPEG 质量和最长边重新编码
    fn reencode(&self, image: &RasterImage, quality: u8, max_dimension: u32) -> Result<RasterImage> {
        reencode_jpeg(image, quality, max_dimension)
    }

    /// 直接提取文本
    fn extract_text(&self, path: &Path) -> Result<String>;

    /// 生成说明失败原因的占位图
    fn placeholder(&self, reason: &str) -> Result<RasterImage> {
        placeholder_png(reason)
    }
}

/// 解码后按最长边缩放，再以指定质量编码为 JPEG
pub fn reencode_jpeg(image: &RasterImage, quality: u8, max_dimension: u32) -> Result<RasterImage> {
    let decoded = image::load_from_memory(&image.bytes)
        .with_context(|| format!("无法解码 {} 图像 ({} 字节)", image.mime, image.len()))?;
    let resized = if decoded.width().max(decoded.height()) > max_dimension {
        decoded.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        decoded
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&resized.to_rgb8())
        .context("JPEG 编码失败")?;
    Ok(RasterImage::new(bytes, "image/jpeg"))
}

/// PNG 占位图
///
/// 白底红色边框，失败原因通过 `note` 以文字形式随图发送。
pub fn placeholder_png(reason: &str) -> Result<RasterImage> {
    let border = Rgb([204, 0, 0]);
    let canvas = RgbImage::from_fn(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, |x, y| {
        let edge = x < 8 || y < 8 || x >= PLACEHOLDER_WIDTH - 8 || y >= PLACEHOLDER_HEIGHT - 8;
        if edge {
            border
        } else {
            Rgb([255, 255, 255])
        }
    });

    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut cursor, ImageFormat::Png)
        .context("占位图编码失败")?;
    let reason: String = reason.chars().take(PLACEHOLDER_REASON_CHARS).collect();
    Ok(RasterImage::new(cursor.into_inner(), "image/png").with_note(format!("文档渲染失败: {}", reason)))
}

/// 根据扩展名推断图像 MIME 类型
pub fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(mime)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// PDF 文本绘制操作：`(文本) Tj` 和 `[(文本) -20 (文本)] TJ`
static PDF_TEXT_OP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)(\((?:\\.|[^\\)])*\)\s*Tj|\[(?:[^\]])*\]\s*TJ)").ok());
static PDF_LITERAL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\(((?:\\.|[^\\)])*)\)").ok());
/// Word 段落结束和文本节点
static DOCX_PARAGRAPH_END: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"</w:p>").ok());
static DOCX_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

/// 从未压缩的 PDF 内容流中提取文本绘制操作里的字符串
pub fn pdf_text(bytes: &[u8]) -> Option<String> {
    let (Some(op), Some(literal)) = (PDF_TEXT_OP.as_ref(), PDF_LITERAL.as_ref()) else {
        return None;
    };
    let raw = String::from_utf8_lossy(bytes);
    let lines: Vec<String> = op
        .find_iter(&raw)
        .map(|m| {
            literal
                .captures_iter(m.as_str())
                .filter_map(|c| c.get(1))
                .map(|s| unescape_pdf(s.as_str()))
                .collect::<String>()
        })
        .filter(|line| !line.trim().is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn unescape_pdf(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// 读取 Word (.docx) 正文，每个段落一行
pub fn docx_text(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("打开文件失败: {}", path.display()))?;
    let mut archive =
        zip::ZipArchive::new(file).with_context(|| format!("不是有效的 docx 文件: {}", path.display()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("docx 中缺少 word/document.xml")?
        .read_to_string(&mut xml)
        .context("读取 docx 正文失败")?;

    let (Some(paragraph_end), Some(tag)) = (DOCX_PARAGRAPH_END.as_ref(), DOCX_TAG.as_ref()) else {
        bail!("文本提取规则不可用");
    };
    let with_breaks = paragraph_end.replace_all(&xml, "\n");
    let text = tag.replace_all(&with_breaks, "");
    Ok(text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&"))
}

/// 去掉控制字符后的宽松文本（旧版 .doc 等二进制格式）
fn lossy_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect()
}

/// 默认渲染器
///
/// 图像文件按单页读取，超出预算时用 JPEG 重新编码。
/// 没有接入 PDF / Word 栅格化，这类文档走文本提取。
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileRenderer;

impl DocumentRenderer for ImageFileRenderer {
    fn can_render(&self, path: &Path) -> bool {
        image_mime(path).is_some()
    }

    fn page_count(&self, path: &Path) -> Result<usize> {
        if image_mime(path).is_some() {
            Ok(1)
        } else {
            bail!("没有可用的文档渲染器: {}", path.display())
        }
    }

    fn render_page(&self, path: &Path, page: usize, _fidelity: RenderFidelity) -> Result<RasterImage> {
        let Some(mime) = image_mime(path) else {
            bail!("没有可用的文档渲染器: {}", path.display());
        };
        if page > 0 {
            bail!("图像文件只有一页，请求第 {} 页", page + 1);
        }
        let bytes = std::fs::read(path).with_context(|| format!("读取图像失败: {}", path.display()))?;
        Ok(RasterImage::new(bytes, mime))
    }

    fn extract_text(&self, path: &Path) -> Result<String> {
        let text = match extension(path).as_str() {
            "docx" => docx_text(path)?,
            "pdf" => {
                let bytes = std::fs::read(path).with_context(|| format!("读取文件失败: {}", path.display()))?;
                pdf_text(&bytes).unwrap_or_default()
            }
            _ => {
                let bytes = std::fs::read(path).with_context(|| format!("读取文件失败: {}", path.display()))?;
                lossy_text(&bytes)
            }
        };
        if text.trim().is_empty() {
            bail!("文件中没有可提取的文本: {}", path.display());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_file_renders_as_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.PNG");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let renderer = ImageFileRenderer;
        assert_eq!(renderer.page_count(&path).unwrap(), 1);
        let image = renderer.render_page(&path, 0, RenderFidelity::Full).unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.len(), 4);
        assert!(renderer.render_page(&path, 1, RenderFidelity::Full).is_err());
    }

    #[test]
    fn test_documents_need_a_real_renderer() {
        let renderer = ImageFileRenderer;
        assert!(renderer.page_count(Path::new("exam.pdf")).is_err());
    }

    #[test]
    fn test_placeholder_is_png_with_reason_note() {
        let image = ImageFileRenderer.placeholder("exam.pdf: 无法打开").unwrap();
        assert_eq!(image.mime, "image/png");
        assert!(image.bytes.starts_with(&[0x89, b'P', b'N', b'G']));
        assert!(image.note.as_deref().unwrap().contains("exam.pdf: 无法打开"));
    }

    #[test]
    fn test_reencode_shrinks_and_converts_to_jpeg() {
        let canvas = RgbImage::from_fn(400, 200, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(canvas).write_to(&mut cursor, ImageFormat::Png).unwrap();
        let png = RasterImage::new(cursor.into_inner(), "image/png");

        let jpeg = ImageFileRenderer.reencode(&png, 60, 100).unwrap();
        assert_eq!(jpeg.mime, "image/jpeg");
        let decoded = image::load_from_memory(&jpeg.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_reencode_rejects_undecodable_bytes() {
        let broken = RasterImage::new(vec![1, 2, 3], "image/png");
        assert!(ImageFileRenderer.reencode(&broken, 80, 1600).is_err());
    }

    #[test]
    fn test_pdf_text_operators_are_extracted() {
        let pdf = b"%PDF-1.4\n1 0 obj\nstream\nBT /F1 12 Tf (x=2) Tj ET\nBT [(y) -20 (=3)] TJ ET\nendstream";
        assert_eq!(pdf_text(pdf).as_deref(), Some("x=2\ny=3"));
        assert_eq!(pdf_text(b"%PDF-1.4 \x78\x9c compressed"), None);
        assert_eq!(unescape_pdf(r"a\(b\)\n"), "a(b)\n");
    }

    #[test]
    fn test_docx_paragraphs_become_lines() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.docx");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(
                "<w:document><w:body><w:p><w:r><w:t>张三：x=2</w:t></w:r></w:p>\
                 <w:p><w:r><w:t>a &amp; b</w:t></w:r></w:p></w:body></w:document>"
                    .as_bytes(),
            )
            .unwrap();
        writer.finish().unwrap();

        let text = ImageFileRenderer.extract_text(&path).unwrap();
        assert!(text.contains("张三：x=2\n"));
        assert!(text.contains("a & b"));
    }

    #[test]
    fn test_compressed_pdf_has_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4 stream \x78\x9c endstream").unwrap();
        assert!(ImageFileRenderer.extract_text(&path).is_err());
    }
}
