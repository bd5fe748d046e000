pub mod output_store;
pub mod run_manifest;

pub use output_store::OutputStore;
pub use run_manifest::{MANIFEST_FILE, RunManifest};
