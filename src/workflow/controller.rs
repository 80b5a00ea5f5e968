//! 批改流程 - 流程层
//!
//! 核心职责：定义"一个作业"的完整处理流程，决定哪些阶段需要执行
//!
//! 流程顺序：
//! 1. ingest：校验输入、识别文件角色、计算内容指纹
//! 2. vision | lightweight_text：有需要渲染的文件走视觉阶段，否则直接读文本（按指纹缓存）
//! 3. structure：识别题目数量和学生名单
//! 4. rubric（可选）：没有批改标准文件时跳过
//! 5. scoring：规划批次、并发批改、按学生汇总
//! 6. annotation / knowledge（可选，并行）：按批改结果决定是否执行
//! 7. assemble：生成文本和 HTML 报告

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::job_ctx::JobCtx;
use super::stage::{Stage, StageOutcome, StageTrace};
use crate::config::GradingConfig;
use crate::error::{AppResult, ValidationError};
use crate::infrastructure::ingestion::file_name;
use crate::infrastructure::DocumentIngestor;
use crate::models::{
    Annotation, BatchGradingOutput, ContentBlock, DocumentMeta, JobContent, JobStatus, KnowledgeInsight,
    Role, SourceDocument, StudentSummary,
};
use crate::orchestrator::Dispatcher;
use crate::services::post_review::score_ratio;
use crate::services::prompts::{transcribe_prompt, TRANSCRIBE_SYSTEM};
use crate::services::report_renderer::{render_html, render_text, ReportContext};
use crate::services::{
    Aggregator, BatchGrader, BatchPlanner, ContentCache, Fingerprint, OracleClient, PostReviewer,
    RoleClassifier, RubricExtractor, StructureAnalyzer,
};
use crate::utils::logging::{log_job_start, log_plan, truncate_text};

/// 批改流程
///
/// - 编排完整的作业处理流程
/// - 决定哪些阶段执行、哪些跳过、哪些复用缓存
/// - 只依赖业务能力（services）和调度器
pub struct WorkflowController {
    oracle: OracleClient,
    ingestor: Arc<dyn DocumentIngestor>,
    classifier: Arc<dyn RoleClassifier>,
    cache: Arc<ContentCache>,
    config: GradingConfig,
}

impl WorkflowController {
    pub fn new(
        oracle: OracleClient,
        ingestor: Arc<dyn DocumentIngestor>,
        classifier: Arc<dyn RoleClassifier>,
        cache: Arc<ContentCache>,
        config: GradingConfig,
    ) -> Self {
        Self {
            oracle,
            ingestor,
            classifier,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// 执行一个批改作业
    ///
    /// # 返回
    /// 输入校验失败或没有任何可分析内容时返回错误，其余失败都体现在报告中
    pub async fn run(
        &self,
        ctx: &JobCtx,
        paths: Vec<PathBuf>,
        meta: Vec<DocumentMeta>,
    ) -> AppResult<BatchGradingOutput> {
        log_job_start(&ctx.job_id, paths.len());
        let mut trace = StageTrace::new();

        // ========== ingest ==========
        let started = Instant::now();
        let documents = self.identify_documents(paths, meta)?;
        let fingerprint = self.fingerprint(&documents).await;
        debug!("{} 内容指纹: {}", ctx, fingerprint);
        trace.record(Stage::Ingest, StageOutcome::Ran, started.elapsed());

        // ========== vision | lightweight_text ==========
        let started = Instant::now();
        let needs_rendering = documents.iter().any(|d| d.kind.requires_rendering());
        let (content_stage, skipped_stage) = if needs_rendering {
            (Stage::Vision, Stage::LightweightText)
        } else {
            (Stage::LightweightText, Stage::Vision)
        };
        trace.record(skipped_stage, StageOutcome::skipped("路由到另一条读取路径"), std::time::Duration::ZERO);

        let blocks = match self.cache.get(&fingerprint) {
            Some(blocks) => {
                trace.record(content_stage, StageOutcome::CacheHit, started.elapsed());
                blocks
            }
            None => {
                let mut blocks = self.read_documents(&documents).await;
                let mut complete = true;
                if needs_rendering && self.config.vision_transcribe {
                    (blocks, complete) = self.transcribe(&documents, blocks, ctx.max_concurrency).await;
                }
                let blocks = Arc::new(blocks);
                if complete {
                    self.cache.insert(fingerprint, Arc::clone(&blocks));
                } else {
                    warn!("{} ⚠️ 部分图像转写失败，本次内容不写入缓存", ctx);
                }
                trace.record(content_stage, StageOutcome::Ran, started.elapsed());
                blocks
            }
        };
        let mut content = JobContent::new(documents, blocks.as_ref().clone());

        // ========== structure ==========
        let started = Instant::now();
        let analyzer = StructureAnalyzer::new(self.oracle.clone());
        let report = analyzer.analyze(&content).await?;
        trace.record(Stage::Structure, StageOutcome::Ran, started.elapsed());

        // ========== rubric ==========
        let started = Instant::now();
        if !self.config.enable_rubric_stage {
            trace.record(Stage::Rubric, StageOutcome::skipped("评分细则阶段已禁用"), started.elapsed());
        } else if !content.has_role(Role::Marking) {
            trace.record(Stage::Rubric, StageOutcome::skipped("没有批改标准文件"), started.elapsed());
        } else {
            content.rubric = RubricExtractor::new(self.oracle.clone())
                .extract(&content, Some(&report))
                .await;
            trace.record(Stage::Rubric, StageOutcome::Ran, started.elapsed());
        }

        // ========== scoring ==========
        let started = Instant::now();
        let content = Arc::new(content);
        let tasks = BatchPlanner::new(ctx.batch_size).plan(&report, &content);
        let total_batches = tasks.len();
        log_plan(report.students.len(), total_batches, report.single_batch_mode);

        let dispatcher = Dispatcher::new(BatchGrader::new(self.oracle.clone()));
        let results = dispatcher.dispatch_all(tasks, ctx.max_concurrency).await;
        if self.config.verbose_logging {
            for result in &results {
                debug!("批次 {} 回复: {}", result.batch_id, truncate_text(&result.raw_text, 80));
            }
        }
        let summaries = Aggregator::new(self.oracle.clone(), ctx.max_concurrency)
            .aggregate(results, &report)
            .await;
        trace.record(Stage::Scoring, StageOutcome::Ran, started.elapsed());

        // ========== annotation / knowledge ==========
        let (annotations, knowledge) = self.post_review(&summaries, &content, ctx, &mut trace).await;

        // ========== assemble ==========
        let started = Instant::now();
        let processing_time_seconds = ctx.elapsed_seconds();
        let report_ctx = ReportContext {
            processing_time_seconds,
            total_batches,
            total_students: summaries.len(),
            single_batch_mode: report.single_batch_mode,
            annotations: &annotations,
            knowledge: knowledge.as_ref(),
        };
        let narrative_text = render_text(&summaries, &report_ctx);
        let html_report = render_html(&summaries, &report_ctx);
        trace.record(Stage::Assemble, StageOutcome::Ran, started.elapsed());

        let batch_results: Vec<_> = summaries.iter().flat_map(|s| s.batch_results.iter()).collect();
        let raw_data = json!({
            "job_id": ctx.job_id,
            "fingerprint": fingerprint.to_string(),
            "structure": report,
            "documents": content.documents,
            "rubric": content.rubric,
            "batch_results": batch_results,
            "student_summaries": summaries,
            "annotations": annotations,
            "knowledge": knowledge,
            "stages": trace,
            "cache": self.cache.stats(),
        });

        info!("{} ✅ 批改完成，{} 名学生，{} 个批次", ctx, summaries.len(), total_batches);

        Ok(BatchGradingOutput {
            status: JobStatus::Success,
            narrative_text,
            html_report,
            raw_data,
            processing_time_seconds,
            total_batches,
            total_students: summaries.len(),
        })
    }

    /// 校验输入并识别每个文件的类型和角色
    fn identify_documents(&self, paths: Vec<PathBuf>, meta: Vec<DocumentMeta>) -> AppResult<Vec<SourceDocument>> {
        if paths.is_empty() {
            return Err(ValidationError::NoDocuments.into());
        }
        if !meta.is_empty() && meta.len() != paths.len() {
            return Err(ValidationError::MetaLengthMismatch {
                paths: paths.len(),
                meta: meta.len(),
            }
            .into());
        }

        let mut meta = meta.into_iter();
        let documents: Vec<SourceDocument> = paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                let meta = meta.next().unwrap_or_default();
                let name = meta.name.unwrap_or_else(|| file_name(&path));
                let role = meta.role.unwrap_or_else(|| self.classifier.classify(&name));
                let kind = self.ingestor.classify(&path);
                info!("📄 {} → {} ({:?})", name, role.label(), kind);
                SourceDocument {
                    id: format!("doc_{}", i + 1),
                    path,
                    name,
                    kind,
                    role,
                }
            })
            .collect();

        if !documents.iter().any(|d| d.role.is_gradable()) {
            return Err(ValidationError::MissingAnswerDocument.into());
        }
        Ok(documents)
    }

    /// 所有输入文件原始字节的指纹（读不到的文件按空内容计算）
    async fn fingerprint(&self, documents: &[SourceDocument]) -> Fingerprint {
        let reads = documents.iter().map(|d| tokio::fs::read(&d.path));
        let contents: Vec<Vec<u8>> = join_all(reads)
            .await
            .into_iter()
            .map(|r| r.unwrap_or_default())
            .collect();
        Fingerprint::of_documents(documents.iter().zip(&contents).map(|(d, bytes)| (d.kind, bytes.as_slice())))
    }

    async fn read_documents(&self, documents: &[SourceDocument]) -> Vec<ContentBlock> {
        let reads = documents.iter().map(|d| self.ingestor.normalize(&d.path, &d.id));
        join_all(reads).await.into_iter().flatten().collect()
    }

    /// 逐个文件转写图像内容，转写结果追加为同一来源的文本块
    ///
    /// 第二个返回值表示是否每个文件都转写成功。
    async fn transcribe(
        &self,
        documents: &[SourceDocument],
        blocks: Vec<ContentBlock>,
        max_concurrency: usize,
    ) -> (Vec<ContentBlock>, bool) {
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let calls = documents.iter().filter_map(|doc| {
            let images: Vec<ContentBlock> = blocks
                .iter()
                .filter(|b| b.origin == doc.id && b.is_image())
                .cloned()
                .collect();
            if images.is_empty() {
                return None;
            }
            let semaphore = Arc::clone(&semaphore);
            Some(async move {
                let _permit = semaphore.acquire().await.ok()?;
                let prompt = transcribe_prompt(images.len());
                match self.oracle.call_text(&prompt, &images, Some(TRANSCRIBE_SYSTEM)).await {
                    Ok(text) => Some(ContentBlock::text(&doc.id, format!("[{} 转写]\n{}", doc.name, text))),
                    Err(failure) => {
                        warn!("⚠️ {} 图像转写失败: {}", doc.name, failure);
                        None
                    }
                }
            })
        });
        let transcripts: Vec<Option<ContentBlock>> = join_all(calls).await;
        let complete = transcripts.iter().all(Option::is_some);

        let mut blocks = blocks;
        blocks.extend(transcripts.into_iter().flatten());
        (blocks, complete)
    }

    /// 扣分点标注和知识点挖掘，并行执行
    async fn post_review(
        &self,
        summaries: &[StudentSummary],
        content: &JobContent,
        ctx: &JobCtx,
        trace: &mut StageTrace,
    ) -> (Vec<Annotation>, Option<KnowledgeInsight>) {
        let started = Instant::now();
        let any_success = summaries
            .iter()
            .any(|s| s.batch_results.iter().any(|r| r.succeeded));
        let reviewer = PostReviewer::new(self.oracle.clone(), ctx.max_concurrency);

        let annotation_skip = if !self.config.enable_annotation_stage {
            Some("扣分点标注阶段已禁用".to_string())
        } else if !any_success {
            Some("没有成功的批改结果".to_string())
        } else {
            None
        };

        let knowledge_skip = if !self.config.enable_knowledge_stage {
            Some("知识点分析阶段已禁用".to_string())
        } else if !any_success {
            Some("没有成功的批改结果".to_string())
        } else {
            match score_ratio(summaries, content.rubric.as_ref()) {
                Some(ratio) if ratio >= self.config.near_perfect_ratio => {
                    Some(format!("得分率 {:.0}% 接近满分", ratio * 100.0))
                }
                _ => None,
            }
        };

        let annotate = async {
            match annotation_skip {
                None => reviewer.annotate(summaries).await,
                Some(_) => Vec::new(),
            }
        };
        let mine = async {
            match knowledge_skip {
                None => reviewer.mine_knowledge(summaries).await,
                Some(_) => None,
            }
        };
        let (annotations, knowledge) = tokio::join!(annotate, mine);
        let elapsed = started.elapsed();

        let outcome = |skip: Option<String>| match skip {
            None => StageOutcome::Ran,
            Some(reason) => StageOutcome::skipped(reason),
        };
        trace.record(Stage::Annotation, outcome(annotation_skip), elapsed);
        trace.record(Stage::Knowledge, outcome(knowledge_skip), elapsed);
        (annotations, knowledge)
    }
}
