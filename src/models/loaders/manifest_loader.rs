use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;

use crate::models::content::{DocumentMeta, Role};

/// 作业清单（TOML）
///
/// ```toml
/// batch_size = 10
/// max_concurrency = 3
///
/// [[documents]]
/// path = "MARKING_期中.pdf"
///
/// [[documents]]
/// path = "scan_01.png"
/// role = "answer"
/// name = "三班答卷"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobManifest {
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub documents: Vec<ManifestDocument>,
}

/// 清单中的一个文件
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestDocument {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl JobManifest {
    /// 拆分为文件路径和元信息两个列表
    ///
    /// 相对路径相对于清单所在目录解析。
    pub fn into_parts(self, base_dir: &Path) -> (Vec<PathBuf>, Vec<DocumentMeta>) {
        self.documents
            .into_iter()
            .map(|doc| {
                let path = if doc.path.is_absolute() {
                    doc.path
                } else {
                    base_dir.join(doc.path)
                };
                let meta = DocumentMeta {
                    name: doc.name,
                    role: doc.role,
                };
                (path, meta)
            })
            .unzip()
    }
}

/// 从 TOML 文件加载作业清单
pub async fn load_job_manifest(manifest_path: &Path) -> Result<JobManifest> {
    let content = fs::read_to_string(manifest_path)
        .await
        .with_context(|| format!("无法读取作业清单: {}", manifest_path.display()))?;

    let manifest: JobManifest = toml::from_str(&content)
        .with_context(|| format!("无法解析作业清单: {}", manifest_path.display()))?;

    if manifest.documents.is_empty() {
        tracing::warn!("作业清单中没有文件: {}", manifest_path.display());
    } else {
        tracing::info!("作业清单加载成功，共 {} 个文件", manifest.documents.len());
    }

    Ok(manifest)
}
