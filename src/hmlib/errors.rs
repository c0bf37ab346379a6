use crate::hmlib::Stage;
use std::io;
use thiserror::Error;

/// Error taxonomy for the pipeline core.
///
/// `Config` failures are detected before any stage runs. `Tool` failures come
/// from collaborator invocations and are fatal for the affected sample only.
/// `Partition` failures are internal defects in contig accounting and always
/// surface loudly rather than dropping or duplicating data.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("{tool} invocation failed: {message}")]
    Tool { tool: String, message: String },

    #[error("{stage} failed for sample {sample}: {source}")]
    Stage {
        stage: Stage,
        sample: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("contig partition violated for sample {sample}: {detail}")]
    Partition { sample: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn partition(sample: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Partition {
            sample: sample.into(),
            detail: detail.into(),
        }
    }

    /// Attach the originating stage and sample. Errors already attributed to a
    /// stage keep their first attribution.
    pub fn at(self, stage: Stage, sample: &str) -> Self {
        match self {
            staged @ Self::Stage { .. } => staged,
            other => Self::Stage {
                stage,
                sample: sample.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
