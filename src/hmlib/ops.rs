use crate::hmlib::artifacts::{
    AlignmentFormat, AlignmentFragment, CallSet, Gvcf, HaplotaggedContigAlignment,
    HaplotypeBlocks, MergedAlignment, PhaseState, PipelineResult, ToolVersion,
};
use crate::hmlib::caller::{CallOutput, ChunkCall};
use crate::hmlib::chunker::ChunkSpec;
use crate::hmlib::errors::{PipelineError, Result};
use crate::hmlib::report::{self, RunStats};
use crate::hmlib::sample::Sample;
use crate::hmlib::tracks::Track;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The collaborator operations the core depends on. Every method is a named
/// external operation with a declared input/output contract; the engines
/// behind them are opaque.
///
/// Implementations must be shareable across worker threads.
pub trait PipelineOps: Send + Sync {
    /// One chunk of small-variant calling with the chunked backend.
    fn call_chunk(&self, sample: &Sample, chunk: &ChunkSpec, gvcf: bool) -> Result<ChunkCall>;

    /// Merge per-chunk call files, given in region order, into the
    /// per-sample call set (and merged gVCF when requested).
    fn merge_chunk_calls(&self, sample: &Sample, chunks: &[ChunkCall], gvcf: bool)
        -> Result<CallOutput>;

    /// Whole-region small-variant calling with the single-step backend.
    fn call_whole(&self, sample: &Sample, gvcf: bool) -> Result<CallOutput>;

    /// Whether the accelerator the single-step backend needs is present.
    fn accelerator_available(&self) -> bool;

    /// Phase a call set against the sample alignment.
    fn phase(&self, sample: &Sample, calls: &CallSet) -> Result<(CallSet, HaplotypeBlocks)>;

    /// Phaseable sites per contig in a phased call set.
    fn phased_site_counts(&self, calls: &CallSet) -> Result<HashMap<String, usize>>;

    /// Haplotag one contig of the sample alignment.
    fn haplotag_contig(
        &self,
        sample: &Sample,
        calls: &CallSet,
        contig: &str,
    ) -> Result<HaplotaggedContigAlignment>;

    /// Per-contig pass-through fragments for exactly the named contigs.
    fn extract_contigs(&self, sample: &Sample, contigs: &[String])
        -> Result<Vec<AlignmentFragment>>;

    /// Concatenate ordered fragments into one per-sample alignment.
    fn concat_alignments(
        &self,
        sample: &Sample,
        fragments: &[AlignmentFragment],
        format: AlignmentFormat,
    ) -> Result<MergedAlignment>;

    /// Execute a downstream track against the published result.
    fn run_track(&self, track: Track, sample: &Sample, handoff: &PipelineResult)
        -> Result<CallSet>;

    /// Render the user-facing report.
    fn render_report(&self, result: &PipelineResult, stats: &RunStats) -> Result<PathBuf>;

    fn tool_versions(&self) -> Vec<ToolVersion>;
}

/// Names of the external tools, overridable for non-standard installs.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub chunked_caller: String,
    pub single_step_caller: String,
    pub accelerator_probe: String,
    pub phaser: String,
    pub samtools: String,
    pub bcftools: String,
    pub sv_caller: String,
    pub cnv_caller: String,
    pub str_caller: String,
    pub mod_caller: String,
    pub reporter: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            chunked_caller: "clair3".to_string(),
            single_step_caller: "deepvariant".to_string(),
            accelerator_probe: "nvidia-smi".to_string(),
            phaser: "whatshap".to_string(),
            samtools: "samtools".to_string(),
            bcftools: "bcftools".to_string(),
            sv_caller: "sniffles".to_string(),
            cnv_caller: "spectre".to_string(),
            str_caller: "straglr".to_string(),
            mod_caller: "modkit".to_string(),
            reporter: "vcfreport".to_string(),
        }
    }
}

fn tbi(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tbi", path.display()))
}

fn alignment_index(path: &Path, format: AlignmentFormat) -> PathBuf {
    let ext = match format {
        AlignmentFormat::Bam => "bai",
        AlignmentFormat::Cram => "crai",
    };
    PathBuf::from(format!("{}.{}", path.display(), ext))
}

/// Subprocess-backed production implementation. Output artifacts land under
/// one output directory per run.
pub struct SystemOps {
    out_dir: PathBuf,
    tools: ToolPaths,
    variant_db: Option<PathBuf>,
}

impl SystemOps {
    pub fn new(out_dir: PathBuf) -> Result<Self> {
        Self::with_tools(out_dir, ToolPaths::default())
    }

    pub fn with_tools(out_dir: PathBuf, tools: ToolPaths) -> Result<Self> {
        for sub in ["chunks", "haptag", "passthrough"] {
            fs::create_dir_all(out_dir.join(sub)).map_err(|e| {
                PipelineError::config(format!(
                    "unable to create output directory {}: {}",
                    out_dir.join(sub).display(),
                    e
                ))
            })?;
        }
        Ok(Self {
            out_dir,
            tools,
            variant_db: None,
        })
    }

    /// Known-variant annotations handed to the report renderer.
    pub fn with_variant_db(mut self, variant_db: Option<PathBuf>) -> Self {
        self.variant_db = variant_db;
        self
    }

    fn invoke(&self, tool: &str, cmd: &mut Command) -> Result<()> {
        debug!("invoking {:?}", cmd);
        let status = cmd
            .status()
            .map_err(|e| PipelineError::tool(tool, format!("unable to launch: {}", e)))?;
        if !status.success() {
            return Err(PipelineError::tool(tool, format!("exited with {}", status)));
        }
        Ok(())
    }

    fn version_of(&self, tool: &str) -> ToolVersion {
        let version = Command::new(tool)
            .arg("--version")
            .output()
            .ok()
            .filter(|out| out.status.success())
            .and_then(|out| {
                String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .next()
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown".to_string());
        ToolVersion {
            name: tool.to_string(),
            version,
        }
    }

    fn index_vcf(&self, path: &Path) -> Result<PathBuf> {
        self.invoke(
            &self.tools.bcftools,
            Command::new(&self.tools.bcftools).args(["index", "-t", "-f"]).arg(path),
        )?;
        Ok(tbi(path))
    }
}

impl PipelineOps for SystemOps {
    fn call_chunk(&self, sample: &Sample, chunk: &ChunkSpec, gvcf: bool) -> Result<ChunkCall> {
        let path = self
            .out_dir
            .join("chunks")
            .join(format!("{}.{:05}.vcf.gz", sample.alias, chunk.index));
        let gvcf_path = gvcf.then(|| {
            self.out_dir
                .join("chunks")
                .join(format!("{}.{:05}.g.vcf.gz", sample.alias, chunk.index))
        });

        let mut cmd = Command::new(&self.tools.chunked_caller);
        cmd.arg("call")
            .arg("--alignment")
            .arg(&sample.alignment)
            .arg("--reference")
            .arg(&sample.reference)
            .args(["--region", &chunk.to_string()])
            .arg("--output")
            .arg(&path);
        if let Some(g) = &gvcf_path {
            cmd.arg("--gvcf").arg(g);
        }
        self.invoke(&self.tools.chunked_caller, &mut cmd)?;

        Ok(ChunkCall {
            index: chunk.index,
            path,
            gvcf: gvcf_path,
        })
    }

    fn merge_chunk_calls(
        &self,
        sample: &Sample,
        chunks: &[ChunkCall],
        gvcf: bool,
    ) -> Result<CallOutput> {
        let path = self.out_dir.join(format!("{}.snp.vcf.gz", sample.alias));
        let mut cmd = Command::new(&self.tools.bcftools);
        cmd.args(["concat", "-O", "z", "-o"]).arg(&path);
        for chunk in chunks {
            cmd.arg(&chunk.path);
        }
        self.invoke(&self.tools.bcftools, &mut cmd)?;
        let index = self.index_vcf(&path)?;

        let gvcf_out = if gvcf {
            let gpath = self.out_dir.join(format!("{}.snp.g.vcf.gz", sample.alias));
            let mut cmd = Command::new(&self.tools.bcftools);
            cmd.args(["concat", "-O", "z", "-o"]).arg(&gpath);
            for chunk in chunks {
                match &chunk.gvcf {
                    Some(g) => {
                        cmd.arg(g);
                    }
                    None => {
                        return Err(PipelineError::tool(
                            &self.tools.chunked_caller,
                            format!("chunk {} produced no gvcf", chunk.index),
                        ))
                    }
                }
            }
            self.invoke(&self.tools.bcftools, &mut cmd)?;
            let gindex = self.index_vcf(&gpath)?;
            Some(Gvcf {
                sample: sample.alias.clone(),
                path: gpath,
                index: gindex,
            })
        } else {
            None
        };

        Ok(CallOutput {
            calls: CallSet {
                sample: sample.alias.clone(),
                track: Track::Snp,
                phase_state: PhaseState::Unphased,
                path,
                index,
            },
            gvcf: gvcf_out,
        })
    }

    fn call_whole(&self, sample: &Sample, gvcf: bool) -> Result<CallOutput> {
        let path = self.out_dir.join(format!("{}.snp.vcf.gz", sample.alias));
        let gvcf_path = gvcf.then(|| self.out_dir.join(format!("{}.snp.g.vcf.gz", sample.alias)));

        let mut cmd = Command::new(&self.tools.single_step_caller);
        cmd.arg("--alignment")
            .arg(&sample.alignment)
            .arg("--reference")
            .arg(&sample.reference)
            .arg("--output")
            .arg(&path);
        if let Some(bed) = &sample.target_bed {
            cmd.arg("--regions").arg(bed);
        }
        if let Some(g) = &gvcf_path {
            cmd.arg("--gvcf").arg(g);
        }
        self.invoke(&self.tools.single_step_caller, &mut cmd)?;
        let index = self.index_vcf(&path)?;

        let gvcf_out = match gvcf_path {
            Some(gpath) => {
                let gindex = self.index_vcf(&gpath)?;
                Some(Gvcf {
                    sample: sample.alias.clone(),
                    path: gpath,
                    index: gindex,
                })
            }
            None => None,
        };

        Ok(CallOutput {
            calls: CallSet {
                sample: sample.alias.clone(),
                track: Track::Snp,
                phase_state: PhaseState::Unphased,
                path,
                index,
            },
            gvcf: gvcf_out,
        })
    }

    fn accelerator_available(&self) -> bool {
        Command::new(&self.tools.accelerator_probe)
            .arg("-L")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn phase(&self, sample: &Sample, calls: &CallSet) -> Result<(CallSet, HaplotypeBlocks)> {
        let path = self.out_dir.join(format!("{}.phased.vcf.gz", sample.alias));
        self.invoke(
            &self.tools.phaser,
            Command::new(&self.tools.phaser)
                .arg("phase")
                .arg("-o")
                .arg(&path)
                .arg("--reference")
                .arg(&sample.reference)
                .arg(&calls.path)
                .arg(&sample.alignment),
        )?;
        let index = self.index_vcf(&path)?;

        let blocks_path = self.out_dir.join(format!("{}.blocks.gtf", sample.alias));
        self.invoke(
            &self.tools.phaser,
            Command::new(&self.tools.phaser)
                .arg("stats")
                .arg("--gtf")
                .arg(&blocks_path)
                .arg(&path),
        )?;

        Ok((
            CallSet {
                sample: sample.alias.clone(),
                track: Track::Snp,
                phase_state: PhaseState::Phased,
                path,
                index,
            },
            HaplotypeBlocks {
                sample: sample.alias.clone(),
                path: blocks_path,
            },
        ))
    }

    fn phased_site_counts(&self, calls: &CallSet) -> Result<HashMap<String, usize>> {
        report::contig_record_counts(&calls.path)
    }

    fn haplotag_contig(
        &self,
        sample: &Sample,
        calls: &CallSet,
        contig: &str,
    ) -> Result<HaplotaggedContigAlignment> {
        let path = self
            .out_dir
            .join("haptag")
            .join(format!("{}.{}.bam", sample.alias, contig));
        self.invoke(
            &self.tools.phaser,
            Command::new(&self.tools.phaser)
                .arg("haplotag")
                .arg("-o")
                .arg(&path)
                .arg("--reference")
                .arg(&sample.reference)
                .args(["--regions", contig])
                .arg(&calls.path)
                .arg(&sample.alignment),
        )?;

        let index = alignment_index(&path, AlignmentFormat::Bam);
        self.invoke(
            &self.tools.samtools,
            Command::new(&self.tools.samtools).arg("index").arg(&path),
        )?;

        Ok(HaplotaggedContigAlignment {
            sample: sample.alias.clone(),
            contig: contig.to_string(),
            path,
            index,
        })
    }

    fn extract_contigs(
        &self,
        sample: &Sample,
        contigs: &[String],
    ) -> Result<Vec<AlignmentFragment>> {
        let mut fragments = Vec::with_capacity(contigs.len());
        for contig in contigs {
            let path = self
                .out_dir
                .join("passthrough")
                .join(format!("{}.{}.bam", sample.alias, contig));
            self.invoke(
                &self.tools.samtools,
                Command::new(&self.tools.samtools)
                    .args(["view", "-b", "-o"])
                    .arg(&path)
                    .arg("-T")
                    .arg(&sample.reference)
                    .arg(&sample.alignment)
                    .arg(contig),
            )?;
            fragments.push(AlignmentFragment {
                contig: contig.clone(),
                path,
                haplotagged: false,
            });
        }
        Ok(fragments)
    }

    fn concat_alignments(
        &self,
        sample: &Sample,
        fragments: &[AlignmentFragment],
        format: AlignmentFormat,
    ) -> Result<MergedAlignment> {
        let path = self.out_dir.join(format!(
            "{}.haplotagged.{}",
            sample.alias,
            format.extension()
        ));
        let mut cmd = Command::new(&self.tools.samtools);
        cmd.arg("cat").arg("-o").arg(&path);
        if format == AlignmentFormat::Cram {
            cmd.arg("--reference").arg(&sample.reference);
        }
        for fragment in fragments {
            cmd.arg(&fragment.path);
        }
        self.invoke(&self.tools.samtools, &mut cmd)?;

        let index = alignment_index(&path, format);
        self.invoke(
            &self.tools.samtools,
            Command::new(&self.tools.samtools).arg("index").arg(&path),
        )?;

        Ok(MergedAlignment {
            sample: sample.alias.clone(),
            path,
            index,
        })
    }

    fn run_track(
        &self,
        track: Track,
        sample: &Sample,
        handoff: &PipelineResult,
    ) -> Result<CallSet> {
        // tracks that can use haplotype-resolved reads get them when present
        let alignment = handoff
            .haplotagged_alignment
            .as_ref()
            .map(|m| m.path.clone())
            .unwrap_or_else(|| sample.alignment.clone());
        let path = self
            .out_dir
            .join(format!("{}.{}.vcf.gz", sample.alias, track.name()));

        let tool = match track {
            Track::Snp => {
                return Err(PipelineError::config(
                    "the snp track is driven by the calling stage, not dispatched as a downstream track",
                ))
            }
            Track::Sv => &self.tools.sv_caller,
            Track::Cnv => &self.tools.cnv_caller,
            Track::Str => &self.tools.str_caller,
            Track::Mod => &self.tools.mod_caller,
        };

        let mut cmd = Command::new(tool);
        cmd.arg("--alignment")
            .arg(&alignment)
            .arg("--reference")
            .arg(&sample.reference)
            .arg("--output")
            .arg(&path);
        if let Some(phased) = handoff.call_set(Track::Snp, PhaseState::Phased) {
            cmd.arg("--phased-calls").arg(&phased.path);
        }
        self.invoke(tool, &mut cmd)?;
        let index = self.index_vcf(&path)?;

        Ok(CallSet {
            sample: sample.alias.clone(),
            track,
            phase_state: PhaseState::Unphased,
            path,
            index,
        })
    }

    fn render_report(&self, result: &PipelineResult, stats: &RunStats) -> Result<PathBuf> {
        let mut stats = stats.clone();
        for summary in &mut stats.call_sets {
            if summary.path.exists() {
                summary.records = report::call_set_record_count(&summary.path).ok();
            }
        }

        let stats_path = self.out_dir.join(format!("{}.stats.json", result.sample));
        let payload = serde_json::json!({
            "stats": stats,
            "manifest": result.manifest,
            "params": result.run_params,
        });
        fs::write(
            &stats_path,
            serde_json::to_string_pretty(&payload)
                .map_err(|e| PipelineError::tool("serde_json", e.to_string()))?,
        )?;

        let report_path = self.out_dir.join(format!("{}.report.html", result.sample));
        let mut cmd = Command::new(&self.tools.reporter);
        cmd.arg(&stats_path).arg("-o").arg(&report_path);
        if let Some(db) = &self.variant_db {
            cmd.arg("--variant-db").arg(db);
        }
        self.invoke(&self.tools.reporter, &mut cmd)?;
        Ok(report_path)
    }

    fn tool_versions(&self) -> Vec<ToolVersion> {
        [
            &self.tools.chunked_caller,
            &self.tools.single_step_caller,
            &self.tools.phaser,
            &self.tools.samtools,
            &self.tools.bcftools,
            &self.tools.sv_caller,
            &self.tools.cnv_caller,
            &self.tools.str_caller,
            &self.tools.mod_caller,
        ]
        .into_iter()
        .map(|tool| self.version_of(tool))
        .collect()
    }
}
