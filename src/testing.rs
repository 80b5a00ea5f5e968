//! 单元测试用的假 Oracle 和假渲染器

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::infrastructure::renderer::{placeholder_png, DocumentRenderer, RasterImage, RenderFidelity};
use crate::infrastructure::{OracleReply, OracleRequest, OracleTransport};

/// 可以发起调用的测试配置（重试等待 1 毫秒）
pub fn test_oracle_config() -> OracleConfig {
    OracleConfig {
        api_key: "sk-test".to_string(),
        max_retries: 3,
        retry_base_delay_ms: 1,
        ..OracleConfig::default()
    }
}

/// 假 Oracle 收到的一次请求
#[derive(Debug, Clone)]
pub struct FakeCall {
    pub system: Option<String>,
    pub text: String,
    pub images: usize,
}

type Handler = Box<dyn Fn(&FakeCall) -> Result<OracleReply, OracleError> + Send + Sync>;

/// 假 Oracle
///
/// 统计调用次数、同时进行中的最大调用数以及每种系统消息的调用次数。
pub struct FakeTransport {
    handler: Handler,
    script: Mutex<VecDeque<Result<OracleReply, OracleError>>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    by_system: Mutex<HashMap<String, usize>>,
}

impl FakeTransport {
    pub fn new(handler: impl Fn(&FakeCall) -> Result<OracleReply, OracleError> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            by_system: Mutex::new(HashMap::new()),
        }
    }

    /// 总是返回同一段文本
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(OracleReply::from_text(text.clone())))
    }

    /// 总是返回同一个错误
    pub fn failing(err: OracleError) -> Self {
        Self::new(move |_| Err(err.clone()))
    }

    /// 按顺序返回脚本中的结果，用完后回复 "ok"
    pub fn scripted(script: Vec<Result<OracleReply, OracleError>>) -> Self {
        let fake = Self::replying("ok");
        *fake.script.lock().unwrap() = script.into();
        fake
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls_with_system(&self, system: &str) -> usize {
        self.by_system.lock().unwrap().get(system).copied().unwrap_or(0)
    }
}

#[async_trait]
impl OracleTransport for FakeTransport {
    async fn complete(&self, request: &OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(system) = request.system_message {
            *self.by_system.lock().unwrap().entry(system.to_string()).or_default() += 1;
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let call = FakeCall {
            system: request.system_message.map(str::to_string),
            text: request.user_text(),
            images: request.image_urls().len(),
        };
        let scripted = self.script.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| (self.handler)(&call));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// 假渲染器
///
/// 重新编码后的体积 = 原体积 × 质量% × (最长边 / 1600)²
#[derive(Debug, Clone, Default)]
pub struct FakeRenderer {
    pages: usize,
    page_size: usize,
    failing_pages: Vec<usize>,
    fail_full: bool,
    fail_minimal: bool,
    fail_placeholder: bool,
    fail_reencode: bool,
}

impl FakeRenderer {
    pub fn with_pages(pages: usize) -> Self {
        Self {
            pages,
            page_size: 100,
            ..Self::default()
        }
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn failing_pages(mut self, pages: &[usize]) -> Self {
        self.failing_pages = pages.to_vec();
        self
    }

    pub fn failing_full(mut self) -> Self {
        self.fail_full = true;
        self
    }

    pub fn failing_minimal(mut self) -> Self {
        self.fail_minimal = true;
        self
    }

    pub fn failing_placeholder(mut self) -> Self {
        self.fail_placeholder = true;
        self
    }

    pub fn failing_reencode(mut self) -> Self {
        self.fail_reencode = true;
        self
    }
}

impl DocumentRenderer for FakeRenderer {
    fn page_count(&self, _path: &Path) -> Result<usize> {
        Ok(self.pages)
    }

    fn render_page(&self, _path: &Path, page: usize, fidelity: RenderFidelity) -> Result<RasterImage> {
        let failed = match fidelity {
            RenderFidelity::Full => self.fail_full || self.failing_pages.contains(&page),
            RenderFidelity::Minimal => self.fail_minimal,
        };
        if failed || page >= self.pages {
            bail!("第 {} 页渲染失败", page + 1);
        }
        Ok(RasterImage::new(vec![0; self.page_size], "image/jpeg"))
    }

    fn reencode(&self, image: &RasterImage, quality: u8, max_dimension: u32) -> Result<RasterImage> {
        if self.fail_reencode {
            bail!("无法解码图像");
        }
        let scale = (max_dimension as f64 / 1600.0).powi(2);
        let size = (image.len() as f64 * quality as f64 / 100.0 * scale) as usize;
        Ok(RasterImage::new(vec![0; size.max(1)], "image/jpeg"))
    }

    fn extract_text(&self, _path: &Path) -> Result<String> {
        Ok("提取的文本".to_string())
    }

    fn placeholder(&self, reason: &str) -> Result<RasterImage> {
        if self.fail_placeholder {
            bail!("占位图生成失败");
        }
        placeholder_png(reason)
    }
}
