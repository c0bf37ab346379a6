mod aggregate;
pub use crate::hmlib::aggregate::{partition_contigs, Aggregator, ContigPartition};

mod artifacts;
pub use crate::hmlib::artifacts::{
    AlignmentFormat, AlignmentFragment, CallSet, Gvcf, HaplotaggedContigAlignment,
    HaplotypeBlocks, MergedAlignment, PhaseState, PipelineResult, ToolVersion, VersionManifest,
};

mod caller;
pub use crate::hmlib::caller::{
    make_caller, CallOutput, CallerKind, ChunkCall, ChunkedCaller, SingleStepCaller, VariantCaller,
};

mod chunker;
pub use crate::hmlib::chunker::{ChunkSpec, RegionChunker};

mod cli;
pub use crate::hmlib::cli::{
    Cli, Commands, IOParams, PipelineParams, PlanArgs, RunArgs, TrackParams,
};

mod contigs;
pub use crate::hmlib::contigs::{
    haplotag_eligible, is_mitochondrial, is_standard_contig, ContigPolicy, ContigSet,
};

mod driver;
pub use crate::hmlib::driver::{
    fai_path, ExecutionPlan, PipelineConfig, PipelineDriver, SampleRun, SampleSuccess, Stage,
};

mod errors;
pub use crate::hmlib::errors::{PipelineError, Result};

mod ops;
pub use crate::hmlib::ops::{PipelineOps, SystemOps, ToolPaths};

mod phasing;
pub use crate::hmlib::phasing::{PhaseOutput, PhasingStage};

mod regions;
pub use crate::hmlib::regions::{BedEntry, BedParser, RegionFilter};

mod report;
pub use crate::hmlib::report::{
    build_stats, call_set_record_count, contig_record_counts, CallSetSummary, RunStats,
};

mod sample;
pub use crate::hmlib::sample::Sample;

mod tracks;
pub use crate::hmlib::tracks::{resolve, CnvBackend, ResolveFlags, Track, TrackSet};

#[cfg(test)]
pub mod testutil;
