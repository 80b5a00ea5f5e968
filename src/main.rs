use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use batch_grading::models::{load_job_manifest, DocumentMeta, JobStatus};
use batch_grading::utils::logging;
use batch_grading::{Config, GradingEngine};

/// batch-grading - 借助大模型批量批改学生作业
#[derive(Parser, Debug)]
#[command(name = "batch-grading")]
#[command(about = "批量批改作业：识别题目和学生，分批调用模型评分并汇总报告")]
#[command(version)]
struct Args {
    /// 作业清单（TOML），提供文件列表、文件角色和批改参数
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// 配置文件路径，未指定时只读取环境变量
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTML 报告输出路径
    #[arg(long)]
    html: Option<PathBuf>,

    /// 每批最多题目数（覆盖配置和清单）
    #[arg(long)]
    batch_size: Option<usize>,

    /// 同时进行的模型调用上限（覆盖配置和清单）
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// 作业文件
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    let args = Args::parse();

    // 加载配置
    let config = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::from_env(),
    };
    logging::log_startup(&config);
    if !config.oracle.is_valid() {
        warn!("⚠️ 未配置有效的 API Key，所有 Oracle 调用都会失败");
    }

    // 收集作业文件
    let mut batch_size = config.grading.batch_size;
    let mut max_concurrency = config.grading.max_concurrency;
    let (mut paths, mut meta) = (Vec::new(), Vec::new());
    if let Some(manifest_path) = &args.manifest {
        let manifest = load_job_manifest(manifest_path).await?;
        batch_size = manifest.batch_size.unwrap_or(batch_size);
        max_concurrency = manifest.max_concurrency.unwrap_or(max_concurrency);
        let base_dir = manifest_path.parent().unwrap_or(Path::new("."));
        (paths, meta) = manifest.into_parts(base_dir);
    }
    let batch_size = args.batch_size.unwrap_or(batch_size);
    let max_concurrency = args.max_concurrency.unwrap_or(max_concurrency);
    if !args.files.is_empty() {
        // 命令行文件没有元信息，清单中有元信息时补齐空值
        if !meta.is_empty() {
            meta.extend(args.files.iter().map(|_| DocumentMeta::default()));
        }
        paths.extend(args.files);
    }

    // 执行批改
    let engine = GradingEngine::from_config(config);
    let output = engine
        .run_batch_grading_or_report(paths, meta, batch_size, max_concurrency)
        .await;

    logging::print_final_stats(&output);
    println!("{}", output.narrative_text);

    if let Some(html_path) = &args.html {
        tokio::fs::write(html_path, &output.html_report)
            .await
            .with_context(|| format!("无法写入 HTML 报告: {}", html_path.display()))?;
        info!("📄 HTML 报告已写入 {}", html_path.display());
    }

    if output.status == JobStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
