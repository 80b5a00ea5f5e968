//! 基础设施层
//!
//! 与外部世界打交道：Oracle 网络调用、文件读取、文档渲染。

pub mod ingestion;
pub mod oracle_transport;
pub mod renderer;
pub mod rendering;

pub use ingestion::{classify_by_extension, DocumentIngestor, FsIngestor};
pub use oracle_transport::{OpenAiTransport, OracleReply, OracleRequest, OracleTransport};
pub use renderer::{DocumentRenderer, ImageFileRenderer, RasterImage, RenderFidelity};
pub use rendering::RenderPipeline;
