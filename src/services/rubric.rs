//! 评分细则提取
//!
//! 有批改标准文件时调用一次 Oracle，整理出评分细则和每题满分。

use tracing::{info, warn};

use super::extraction::extract_max_scores;
use super::oracle_client::OracleClient;
use super::prompts::{rubric_prompt, RUBRIC_SYSTEM};
use crate::models::{JobContent, Role, Rubric, StructureReport};

pub struct RubricExtractor {
    oracle: OracleClient,
}

impl RubricExtractor {
    pub fn new(oracle: OracleClient) -> Self {
        Self { oracle }
    }

    /// 提取评分细则，调用失败时返回 `None`
    pub async fn extract(&self, content: &JobContent, report: Option<&StructureReport>) -> Option<Rubric> {
        let marking_text = content.text_for(Role::Marking);
        let marking_images = content.image_blocks_for(Role::Marking);
        if marking_text.trim().is_empty() && marking_images.is_empty() {
            return None;
        }

        let prompt = rubric_prompt(&marking_text, report);
        match self.oracle.call_text(&prompt, &marking_images, Some(RUBRIC_SYSTEM)).await {
            Ok(text) => {
                let max_scores = extract_max_scores(&text);
                info!("📏 评分细则提取完成，{} 道题有满分信息", max_scores.len());
                Some(Rubric { text, max_scores })
            }
            Err(failure) => {
                warn!("⚠️ 评分细则提取失败: {}", failure);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::models::{ContentBlock, DocumentKind, SourceDocument};
    use crate::testing::{test_oracle_config, FakeTransport};

    fn content(role: Role) -> JobContent {
        JobContent::new(
            vec![SourceDocument {
                id: "doc_1".into(),
                path: PathBuf::from("MARKING.txt"),
                name: "MARKING.txt".into(),
                kind: DocumentKind::PlainText,
                role,
            }],
            vec![ContentBlock::text("doc_1", "1. 5分 2. 10分")],
        )
    }

    #[tokio::test]
    async fn test_extracts_max_scores() {
        let transport = FakeTransport::replying("第1题：5分\n第2题：10分\n细则：……");
        let rubric = RubricExtractor::new(OracleClient::new(Arc::new(transport), test_oracle_config()))
            .extract(&content(Role::Marking), None)
            .await
            .unwrap();
        assert_eq!(rubric.total(), Some(15.0));
    }

    #[tokio::test]
    async fn test_no_marking_content_skips_call() {
        let transport = Arc::new(FakeTransport::replying("第1题：5分"));
        let rubric = RubricExtractor::new(OracleClient::new(transport.clone(), test_oracle_config()))
            .extract(&content(Role::Answer), None)
            .await;
        assert!(rubric.is_none());
        assert_eq!(transport.calls(), 0);
    }
}
