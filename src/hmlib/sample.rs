use serde::Serialize;
use std::path::{Path, PathBuf};

/// Per-sample input handles, created once at pipeline start and immutable
/// thereafter. Outputs are always new artifacts; the alignment is never
/// rewritten in place.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub alias: String,
    pub alignment: PathBuf,
    pub reference: PathBuf,
    pub target_bed: Option<PathBuf>,
}

impl Sample {
    pub fn new(
        alias: String,
        alignment: PathBuf,
        reference: PathBuf,
        target_bed: Option<PathBuf>,
    ) -> Self {
        Self {
            alias,
            alignment,
            reference,
            target_bed,
        }
    }

    /// Default alias for an alignment file: its stem without the format suffix.
    pub fn alias_from_path(path: &Path) -> String {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }
}
