use crate::hmlib::artifacts::AlignmentFormat;
use crate::hmlib::caller::CallerKind;
use crate::hmlib::contigs::ContigPolicy;
use crate::hmlib::sample::Sample;
use crate::hmlib::tracks::{CnvBackend, ResolveFlags, TrackSet};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Parser, Clone, Debug)]
#[command(name = "haplomux")]
#[command(about = "Multi-track variant pipeline planner and aggregator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

pub trait PipelineParams: std::fmt::Debug {
    fn validate(&self) -> bool;
    fn debug(&self) -> bool;
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(about = "Run the pipeline")]
    Run(RunArgs),

    #[command(about = "Print the resolved execution plan without running anything")]
    Plan(PlanArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub io: IOParams,

    #[command(flatten)]
    pub tracks: TrackParams,
}

#[derive(clap::Args, Serialize, Clone, Debug)]
pub struct IOParams {
    /// Aligned reads to process (indexed .bam or .cram, repeatable)
    #[arg(short, long, required = true, help_heading = "I/O")]
    pub reads: Vec<std::path::PathBuf>,

    /// Sample alias per --reads entry (defaults to the file stem)
    #[arg(long, help_heading = "I/O")]
    pub sample: Vec<String>,

    /// Reference genome (faidx indexed)
    #[arg(short = 'f', long, help_heading = "I/O")]
    pub reference: std::path::PathBuf,

    /// Regions to analyze
    #[arg(long, help_heading = "I/O")]
    pub bed: Option<std::path::PathBuf>,

    /// Output directory
    #[arg(short, long, help_heading = "I/O")]
    pub out_dir: std::path::PathBuf,

    /// Known-variant database for report context
    #[arg(long, help_heading = "I/O")]
    pub variant_db: Option<std::path::PathBuf>,

    /// Merged alignment output format
    #[arg(long, value_enum, default_value_t = AlignmentFormat::Bam, help_heading = "I/O")]
    pub out_format: AlignmentFormat,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 1, help_heading = "I/O")]
    pub threads: usize,

    /// Verbose logging
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(clap::Args, Serialize, Clone, Debug)]
pub struct TrackParams {
    /// Small-variant calling track
    #[arg(long, default_value_t = false, help_heading = "Tracks")]
    pub snp: bool,

    /// Structural-variant calling track
    #[arg(long, default_value_t = false, help_heading = "Tracks")]
    pub sv: bool,

    /// Copy-number calling track
    #[arg(long, default_value_t = false, help_heading = "Tracks")]
    pub cnv: bool,

    /// Repeat-expansion genotyping track
    #[arg(long = "str", default_value_t = false, help_heading = "Tracks")]
    pub str_track: bool,

    /// Base-modification calling track
    #[arg(long = "mod", default_value_t = false, help_heading = "Tracks")]
    pub mod_track: bool,

    /// Phase small variants and haplotag alignments
    #[arg(long, default_value_t = false, help_heading = "Tracks")]
    pub phased: bool,

    /// Copy-number backend
    #[arg(long, value_enum, default_value_t = CnvBackend::Depth, help_heading = "Tracks")]
    pub cnv_backend: CnvBackend,

    /// Small-variant calling backend
    #[arg(long, value_enum, default_value_t = CallerKind::Chunked, help_heading = "Calling")]
    pub caller: CallerKind,

    /// Also emit a gVCF
    #[arg(long, default_value_t = false, help_heading = "Calling")]
    pub gvcf: bool,

    /// Chunk span for the chunked backend (bp)
    #[arg(long, default_value_t = 25_000_000, help_heading = "Calling")]
    pub chunk_size: u64,

    /// Process all contigs instead of standard chromosomes only
    #[arg(long, default_value_t = false, help_heading = "Calling")]
    pub all_contigs: bool,
}

impl TrackParams {
    pub fn requested(&self) -> TrackSet {
        let mut set = TrackSet::empty();
        if self.snp {
            set |= TrackSet::SNP;
        }
        if self.sv {
            set |= TrackSet::SV;
        }
        if self.cnv {
            set |= TrackSet::CNV;
        }
        if self.str_track {
            set |= TrackSet::STR;
        }
        if self.mod_track {
            set |= TrackSet::MOD;
        }
        set
    }

    pub fn resolve_flags(&self) -> ResolveFlags {
        ResolveFlags {
            phased: self.phased,
            cnv_backend: self.cnv_backend,
        }
    }

    pub fn policy(&self) -> ContigPolicy {
        if self.all_contigs {
            ContigPolicy::All
        } else {
            ContigPolicy::Standard
        }
    }

    /// Flag combinations no schedule can satisfy.
    fn validate(&self) -> bool {
        let mut is_ok = true;

        if self.str_track && !self.phased {
            error!("--str requires --phased (repeat genotyping reads the haplotagged alignment)");
            is_ok = false;
        }

        if self.cnv && self.cnv_backend == CnvBackend::PhaseAware && !self.phased {
            error!("--cnv-backend phase-aware requires --phased");
            is_ok = false;
        }

        if self.chunk_size < 100_000 {
            warn!("--chunk-size below 100kbp schedules very many chunks");
        }

        is_ok
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    /// Reference genome (faidx indexed)
    #[arg(short = 'f', long)]
    pub reference: std::path::PathBuf,

    /// Regions to analyze
    #[arg(long)]
    pub bed: Option<std::path::PathBuf>,

    #[command(flatten)]
    pub tracks: TrackParams,

    /// Verbose logging
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

impl RunArgs {
    /// One immutable sample handle per --reads entry.
    pub fn samples(&self) -> Vec<Sample> {
        self.io
            .reads
            .iter()
            .enumerate()
            .map(|(i, reads)| {
                let alias = self
                    .io
                    .sample
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| Sample::alias_from_path(reads));
                Sample::new(
                    alias,
                    reads.clone(),
                    self.io.reference.clone(),
                    self.io.bed.clone(),
                )
            })
            .collect()
    }

    /// The run parameters, serialized for the result manifest.
    pub fn run_params(&self) -> serde_json::Value {
        serde_json::json!({
            "io": self.io,
            "tracks": self.tracks,
        })
    }
}

impl PipelineParams for RunArgs {
    fn debug(&self) -> bool {
        self.io.debug
    }

    /// Validate command line arguments
    fn validate(&self) -> bool {
        let mut is_ok = true;

        for reads in &self.io.reads {
            is_ok &= validate_reads(reads);
        }

        if !self.io.sample.is_empty() && self.io.sample.len() != self.io.reads.len() {
            error!(
                "{} --sample aliases for {} --reads inputs",
                self.io.sample.len(),
                self.io.reads.len()
            );
            is_ok = false;
        }

        let mut aliases = HashSet::new();
        for sample in self.samples() {
            if !aliases.insert(sample.alias.clone()) {
                error!("duplicate sample alias {}", sample.alias);
                is_ok = false;
            }
        }

        is_ok &= validate_reference(&self.io.reference);

        if let Some(bed_file) = &self.io.bed {
            is_ok &= validate_file(bed_file, "--bed");
        }

        if let Some(db) = &self.io.variant_db {
            is_ok &= validate_file(db, "--variant-db");
        }

        if self.io.threads < 1 {
            error!("--threads must be at least 1");
            is_ok = false;
        }

        is_ok &= self.tracks.validate();

        is_ok
    }
}

impl PipelineParams for PlanArgs {
    fn debug(&self) -> bool {
        self.debug
    }

    fn validate(&self) -> bool {
        let mut is_ok = validate_reference(&self.reference);

        if let Some(bed_file) = &self.bed {
            is_ok &= validate_file(bed_file, "--bed");
        }

        is_ok &= self.tracks.validate();

        is_ok
    }
}

/// Helper function to validate a file's existence and type
fn validate_file(path: &Path, label: &str) -> bool {
    if !path.exists() {
        error!("{} does not exist", label);
        return false;
    }
    if !path.is_file() {
        error!("{} is not a file", label);
        return false;
    }
    true
}

/// Helper function to validate aligned reads (.bam or .cram) and their index
fn validate_reads(reads: &Path) -> bool {
    let mut is_ok = validate_file(reads, "--reads");

    let file_path = reads.to_str().unwrap_or_default();
    if file_path.ends_with(".bam") || file_path.ends_with(".cram") {
        let index_extensions = [".bai", ".crai"];
        let index_exists = index_extensions.iter().any(|ext| {
            let index_path = format!("{}{}", file_path, ext);
            let p = Path::new(&index_path);
            p.exists() & p.is_file()
        });

        if !index_exists {
            error!(
                "--reads index ({}) does not exist",
                index_extensions.join(", ")
            );
            is_ok = false;
        }
    } else {
        error!("unsupported reads file type: {}", file_path);
        is_ok = false;
    }

    is_ok
}

/// Checks reference and its .fai index
fn validate_reference(reference: &Path) -> bool {
    let mut is_ok = validate_file(reference, "--reference");

    let mut fai_path = reference.to_path_buf();
    fai_path.set_file_name(format!(
        "{}.fai",
        fai_path.file_name().unwrap_or_default().to_string_lossy()
    ));
    is_ok &= validate_file(&fai_path, "--reference index (.fai)");

    is_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmlib::tracks::Track;

    fn track_params() -> TrackParams {
        TrackParams {
            snp: false,
            sv: false,
            cnv: false,
            str_track: false,
            mod_track: false,
            phased: false,
            cnv_backend: CnvBackend::Depth,
            caller: CallerKind::Chunked,
            gvcf: false,
            chunk_size: 25_000_000,
            all_contigs: false,
        }
    }

    #[test]
    fn requested_set_mirrors_flags() {
        let mut params = track_params();
        params.snp = true;
        params.str_track = true;
        assert_eq!(params.requested(), TrackSet::SNP | TrackSet::STR);
        assert_eq!(params.requested().tracks(), vec![Track::Snp, Track::Str]);
    }

    #[test]
    fn str_without_phased_is_rejected() {
        let mut params = track_params();
        params.str_track = true;
        assert!(!params.validate());
        params.phased = true;
        assert!(params.validate());
    }

    #[test]
    fn phase_aware_cnv_without_phased_is_rejected() {
        let mut params = track_params();
        params.cnv = true;
        params.cnv_backend = CnvBackend::PhaseAware;
        assert!(!params.validate());
        params.phased = true;
        assert!(params.validate());
    }

    #[test]
    fn contig_policy_from_flag() {
        let mut params = track_params();
        assert_eq!(params.policy(), ContigPolicy::Standard);
        params.all_contigs = true;
        assert_eq!(params.policy(), ContigPolicy::All);
    }
}
