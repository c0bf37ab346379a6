use crate::hmlib::aggregate::Aggregator;
use crate::hmlib::artifacts::{
    AlignmentFormat, CallSet, Gvcf, HaplotypeBlocks, MergedAlignment, PipelineResult,
    VersionManifest,
};
use crate::hmlib::caller::{make_caller, CallerKind};
use crate::hmlib::chunker::RegionChunker;
use crate::hmlib::contigs::{ContigPolicy, ContigSet};
use crate::hmlib::errors::{PipelineError, Result};
use crate::hmlib::ops::PipelineOps;
use crate::hmlib::phasing::PhasingStage;
use crate::hmlib::regions::RegionFilter;
use crate::hmlib::report;
use crate::hmlib::sample::Sample;
use crate::hmlib::tracks::{resolve, ResolveFlags, Track, TrackSet};
use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pipeline execution states. `Failed` is absorbing and carries the
/// originating stage and sample through `PipelineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    ContigsResolved,
    TracksResolved,
    Calling,
    Phasing,
    Aggregating,
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "init",
            Stage::ContigsResolved => "contigs-resolved",
            Stage::TracksResolved => "tracks-resolved",
            Stage::Calling => "calling",
            Stage::Phasing => "phasing",
            Stage::Aggregating => "aggregating",
            Stage::Reporting => "reporting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        })
    }
}

/// Everything the driver needs to know, computed once before any sample runs
/// and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub requested: TrackSet,
    pub flags: ResolveFlags,
    pub caller: CallerKind,
    pub gvcf: bool,
    pub policy: ContigPolicy,
    pub chunk_size: u64,
    pub threads: usize,
    pub out_format: AlignmentFormat,
    pub run_params: serde_json::Value,
}

/// The resolved execution plan: a pure function of the inputs, printable
/// without invoking any backend.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub enabled: TrackSet,
    pub contigs: ContigSet,
    pub chunk_count: usize,
    pub needs_phasing: bool,
    pub caller: CallerKind,
    pub policy: ContigPolicy,
}

impl ExecutionPlan {
    pub fn new(
        requested: TrackSet,
        flags: &ResolveFlags,
        policy: ContigPolicy,
        caller: CallerKind,
        chunk_size: u64,
        reference: &Path,
        bed: Option<&Path>,
    ) -> Result<Self> {
        let contigs = ContigSet::from_fai(&fai_path(reference), policy)?;
        let filter = match bed {
            Some(path) => RegionFilter::from_bed(path, &contigs)?,
            None => RegionFilter::none(),
        };
        let enabled = resolve(requested, flags);
        let chunk_count = RegionChunker::new(&contigs, &filter, chunk_size).len();
        Ok(Self {
            enabled,
            contigs,
            chunk_count,
            needs_phasing: flags.phased && enabled.contains(TrackSet::SNP),
            caller,
            policy,
        })
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracks = if self.enabled.is_empty() {
            "none (qc only)".to_string()
        } else {
            self.enabled.names().iter().join(", ")
        };
        writeln!(f, "enabled tracks: {}", tracks)?;
        writeln!(
            f,
            "contigs: {} ({})",
            self.contigs.len(),
            match self.policy {
                ContigPolicy::Standard => "standard chromosomes",
                ContigPolicy::All => "all contigs",
            }
        )?;
        writeln!(f, "caller backend: {}", self.caller)?;
        writeln!(f, "calling chunks: {}", self.chunk_count)?;
        write!(
            f,
            "phasing: {}",
            if self.needs_phasing { "yes" } else { "no" }
        )
    }
}

/// The outcome of one sample's run.
#[derive(Debug)]
pub struct SampleRun {
    pub alias: String,
    pub final_stage: Stage,
    pub outcome: Result<SampleSuccess>,
}

#[derive(Debug)]
pub struct SampleSuccess {
    pub result: Arc<PipelineResult>,
    pub track_calls: Vec<CallSet>,
}

/// Top-level state machine: contig enumeration, dependency resolution,
/// calling, optional phasing, aggregation, reporting, then downstream track
/// dispatch against the published result.
pub struct PipelineDriver {
    config: PipelineConfig,
    ops: Arc<dyn PipelineOps>,
}

impl PipelineDriver {
    pub fn new(config: PipelineConfig, ops: Arc<dyn PipelineOps>) -> Self {
        Self { config, ops }
    }

    /// Run every sample. One sample's failure never stops another's run.
    pub fn run(&self, samples: &[Sample]) -> Vec<SampleRun> {
        samples
            .iter()
            .map(|sample| {
                let outcome = self.run_sample(sample);
                let final_stage = match &outcome {
                    Ok(_) => Stage::Done,
                    Err(e) => {
                        error!(
                            "sample {} failed during {}: {}",
                            sample.alias,
                            e.stage().unwrap_or(Stage::Init),
                            e
                        );
                        Stage::Failed
                    }
                };
                SampleRun {
                    alias: sample.alias.clone(),
                    final_stage,
                    outcome,
                }
            })
            .collect()
    }

    fn run_sample(&self, sample: &Sample) -> Result<SampleSuccess> {
        let alias = sample.alias.as_str();
        let mut stage = Stage::Init;
        info!("sample {}: starting", alias);

        let contigs = ContigSet::from_fai(&fai_path(&sample.reference), self.config.policy)
            .map_err(|e| e.at(stage, alias))?;
        if contigs.is_empty() {
            return Err(
                PipelineError::config("reference has no contigs under the inclusion policy")
                    .at(stage, alias),
            );
        }
        stage = Stage::ContigsResolved;
        debug!("sample {}: {}, {} contigs", alias, stage, contigs.len());

        // dependency resolution is total; this transition cannot fail
        let enabled = resolve(self.config.requested, &self.config.flags);
        stage = Stage::TracksResolved;
        info!(
            "sample {}: {}, enabled tracks [{}]",
            alias,
            stage,
            enabled.names().iter().join(",")
        );

        let filter = match &sample.target_bed {
            Some(bed) => RegionFilter::from_bed(bed, &contigs).map_err(|e| e.at(stage, alias))?,
            None => RegionFilter::none(),
        };
        let chunk_count = RegionChunker::new(&contigs, &filter, self.config.chunk_size).len();

        let mut call_sets: Vec<CallSet> = Vec::new();
        let mut gvcf: Option<Gvcf> = None;
        let mut haplotype_blocks: Option<HaplotypeBlocks> = None;
        let mut haplotagged_alignment: Option<MergedAlignment> = None;
        let mut haplotagged_contigs = 0usize;

        if enabled.contains(TrackSet::SNP) {
            stage = Stage::Calling;
            let caller = make_caller(
                self.config.caller,
                self.ops.clone(),
                self.config.threads,
                self.config.chunk_size,
            );
            let output = caller
                .call(sample, &contigs, &filter, self.config.gvcf)
                .map_err(|e| e.at(stage, alias))?;
            gvcf = output.gvcf;

            if self.config.flags.phased {
                stage = Stage::Phasing;
                let phasing = PhasingStage::new(self.ops.clone(), self.config.threads);
                let phased = phasing
                    .run(sample, &contigs, output.calls)
                    .map_err(|e| e.at(stage, alias))?;
                haplotagged_contigs = phased.tagged.len();
                haplotype_blocks = Some(phased.blocks);

                stage = Stage::Aggregating;
                let merged = Aggregator::new(self.ops.clone(), self.config.out_format)
                    .merge(sample, &contigs, phased.tagged)
                    .map_err(|e| e.at(stage, alias))?;
                haplotagged_alignment = Some(merged);
                call_sets.push(phased.phased);
            } else {
                // nothing was haplotagged, so every contig passes through as is
                stage = Stage::Aggregating;
                debug!(
                    "sample {}: {}, phasing off, alignments pass through",
                    alias, stage
                );
                call_sets.push(output.calls);
            }
        }

        stage = Stage::Reporting;
        let manifest = VersionManifest::new(self.ops.tool_versions());
        let result = Arc::new(PipelineResult {
            sample: alias.to_string(),
            call_sets,
            gvcf,
            haplotype_blocks,
            haplotagged_alignment,
            manifest,
            run_params: self.config.run_params.clone(),
        });
        let stats = report::build_stats(
            &result,
            enabled,
            &contigs,
            chunk_count,
            haplotagged_contigs,
        );
        let report_path = self
            .ops
            .render_report(&result, &stats)
            .map_err(|e| e.at(stage, alias))?;
        info!("sample {}: report at {}", alias, report_path.display());
        stage = Stage::Done;

        // downstream tracks consume the published result read-only; a failed
        // track is reported without aborting its siblings
        let mut track_calls = Vec::new();
        for track in enabled.tracks() {
            if track == Track::Snp {
                continue;
            }
            match self.ops.run_track(track, sample, &result) {
                Ok(calls) => {
                    info!("sample {}: {} track done", alias, track);
                    track_calls.push(calls);
                }
                Err(e) => error!("sample {}: {} track failed: {}", alias, track, e),
            }
        }

        info!("sample {}: {}", alias, stage);
        Ok(SampleSuccess {
            result,
            track_calls,
        })
    }
}

/// Companion faidx path for a reference fasta.
pub fn fai_path(reference: &Path) -> PathBuf {
    let mut path = reference.to_path_buf();
    path.set_file_name(format!(
        "{}.fai",
        reference
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    path
}
