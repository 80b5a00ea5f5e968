pub mod manifest_loader;

pub use manifest_loader::{load_job_manifest, JobManifest, ManifestDocument};
