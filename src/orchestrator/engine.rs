//! 批改引擎 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个库的入口，负责组装各层组件并执行批改作业。
//!
//! ## 核心功能
//!
//! 1. **组件装配**：Oracle 传输、文件读取器、角色识别器、内容缓存
//! 2. **作业执行**：为每次调用创建作业上下文，委托 WorkflowController 处理
//! 3. **失败转报告**：需要时把作业级错误转换成失败状态的报告
//!
//! ## 设计特点
//!
//! - **资源所有者**：持有 Oracle 连接和内容缓存，多次作业共享
//! - **向下委托**：不处理单个作业的细节

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{DocumentIngestor, FsIngestor, OpenAiTransport, OracleTransport};
use crate::models::{BatchGradingOutput, DocumentMeta};
use crate::services::{ContentCache, KeywordRoleClassifier, OracleClient, RoleClassifier};
use crate::workflow::{JobCtx, WorkflowController};

/// 批改引擎
pub struct GradingEngine {
    config: Config,
    oracle: OracleClient,
    ingestor: Arc<dyn DocumentIngestor>,
    classifier: Arc<dyn RoleClassifier>,
    cache: Arc<ContentCache>,
}

impl GradingEngine {
    /// 使用给定的 Oracle 传输和文件读取器创建引擎
    pub fn new(transport: Arc<dyn OracleTransport>, ingestor: Arc<dyn DocumentIngestor>, config: Config) -> Self {
        Self {
            oracle: OracleClient::new(transport, config.oracle.clone()),
            ingestor,
            classifier: Arc::new(KeywordRoleClassifier),
            cache: Arc::new(ContentCache::new()),
            config,
        }
    }

    /// 使用默认组件创建引擎：OpenAI 兼容接口 + 本地文件读取
    pub fn from_config(config: Config) -> Self {
        let transport = Arc::new(OpenAiTransport::new(&config.oracle));
        let ingestor = Arc::new(FsIngestor::from_config(&config.grading));
        Self::new(transport, ingestor, config)
    }

    /// 替换内容缓存（多个引擎共享同一个缓存）
    pub fn with_cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = cache;
        self
    }

    /// 替换文件角色识别器
    pub fn with_classifier(mut self, classifier: Arc<dyn RoleClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    fn controller(&self) -> WorkflowController {
        WorkflowController::new(
            self.oracle.clone(),
            Arc::clone(&self.ingestor),
            Arc::clone(&self.classifier),
            Arc::clone(&self.cache),
            self.config.grading.clone(),
        )
    }

    /// 执行一次批量批改
    ///
    /// # 参数
    /// - `paths`: 作业文件路径
    /// - `meta`: 文件元信息，为空或与 `paths` 一一对应
    /// - `batch_size`: 每批最多题目数（会被限制在 1..=10）
    /// - `max_concurrency`: 同时进行的 Oracle 调用上限
    ///
    /// # 返回
    /// 输入无效或没有任何可分析内容时返回错误
    pub async fn run_batch_grading(
        &self,
        paths: Vec<PathBuf>,
        meta: Vec<DocumentMeta>,
        batch_size: usize,
        max_concurrency: usize,
    ) -> AppResult<BatchGradingOutput> {
        let ctx = JobCtx::new(batch_size, max_concurrency);
        self.controller().run(&ctx, paths, meta).await
    }

    /// 执行一次批量批改，作业级错误转换为失败状态的报告
    pub async fn run_batch_grading_or_report(
        &self,
        paths: Vec<PathBuf>,
        meta: Vec<DocumentMeta>,
        batch_size: usize,
        max_concurrency: usize,
    ) -> BatchGradingOutput {
        let ctx = JobCtx::new(batch_size, max_concurrency);
        match self.controller().run(&ctx, paths, meta).await {
            Ok(output) => output,
            Err(e) => {
                if e.is_validation() {
                    warn!("{} ⚠️ 输入无效，作业未启动: {}", ctx, e);
                } else {
                    error!("{} ❌ 作业失败: {}", ctx, e);
                }
                BatchGradingOutput::failed(e.to_string(), ctx.elapsed_seconds())
            }
        }
    }
}
