pub mod batch;
pub mod content;
pub mod loaders;
pub mod report;
pub mod structure;

pub use batch::{BatchResult, BatchTask};
pub use content::{BlockKind, ContentBlock, DocumentKind, DocumentMeta, JobContent, Role, SourceDocument};
pub use loaders::{load_job_manifest, JobManifest, ManifestDocument};
pub use report::{Annotation, BatchGradingOutput, JobStatus, KnowledgeInsight, StudentSummary};
pub use structure::{Confidence, Rubric, StructureReport, StudentRef};
