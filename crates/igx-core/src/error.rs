use std::path::PathBuf;

use thiserror::Error;

use crate::tools::ToolError;

/// Errors that stop a run before any file is processed.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("input directory not found: {0}")]
    InputMissing(PathBuf),

    #[error("cannot create output directory {path}: {source}")]
    OutputUncreatable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("required tool unavailable: {0}")]
    Tool(#[from] ToolError),

    #[error("cannot start worker pool: {0}")]
    Pool(String),
}
