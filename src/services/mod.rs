//! 业务能力层
//!
//! 每个服务只提供一种能力，不关心流程顺序。

pub mod aggregator;
pub mod batch_grader;
pub mod batch_planner;
pub mod content_cache;
pub mod extraction;
pub mod oracle_client;
pub mod post_review;
pub mod prompts;
pub mod report_renderer;
pub mod role_classifier;
pub mod rubric;
pub mod structure_analyzer;

pub use aggregator::Aggregator;
pub use batch_grader::BatchGrader;
pub use batch_planner::{BatchPlanner, MAX_BATCH_SIZE};
pub use content_cache::{CacheStats, ContentCache, Fingerprint};
pub use oracle_client::{OracleClient, OracleFailure};
pub use post_review::PostReviewer;
pub use report_renderer::ReportContext;
pub use role_classifier::{KeywordRoleClassifier, RoleClassifier};
pub use rubric::RubricExtractor;
pub use structure_analyzer::StructureAnalyzer;
