#[macro_use]
extern crate log;

mod hmlib;
pub use self::hmlib::{
    build_stats, call_set_record_count, haplotag_eligible, is_mitochondrial, is_standard_contig,
    make_caller, partition_contigs, resolve, Aggregator, AlignmentFormat, AlignmentFragment,
    BedParser, CallOutput, CallSet, CallSetSummary, CallerKind, ChunkCall, ChunkSpec,
    ChunkedCaller, Cli, CnvBackend, Commands, ContigPartition, ContigPolicy, ContigSet,
    ExecutionPlan, Gvcf, HaplotaggedContigAlignment, HaplotypeBlocks, IOParams, MergedAlignment,
    PhaseOutput, PhaseState, PhasingStage, PipelineConfig, PipelineDriver, PipelineError,
    PipelineOps, PipelineParams, PipelineResult, PlanArgs, RegionChunker, RegionFilter,
    ResolveFlags, Result, RunArgs, RunStats, Sample, SampleRun, SampleSuccess, SingleStepCaller,
    Stage, SystemOps, ToolPaths, ToolVersion, Track, TrackParams, TrackSet, VariantCaller,
    VersionManifest,
};
