use crate::hmlib::tracks::Track;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Whether a call set has been through the phasing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    Unphased,
    Phased,
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhaseState::Unphased => "unphased",
            PhaseState::Phased => "phased",
        })
    }
}

/// Output format for the merged per-sample alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentFormat {
    Bam,
    Cram,
}

impl AlignmentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AlignmentFormat::Bam => "bam",
            AlignmentFormat::Cram => "cram",
        }
    }
}

impl fmt::Display for AlignmentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A coordinate-sorted, indexed variant call artifact. At most one call set
/// per (sample, track) pair is final at pipeline completion.
#[derive(Debug, Clone, Serialize)]
pub struct CallSet {
    pub sample: String,
    pub track: Track,
    pub phase_state: PhaseState,
    pub path: PathBuf,
    pub index: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct Gvcf {
    pub sample: String,
    pub path: PathBuf,
    pub index: PathBuf,
}

/// One contig's haplotagged alignment; produced only for contigs the phasing
/// stage actually processed.
#[derive(Debug, Clone)]
pub struct HaplotaggedContigAlignment {
    pub sample: String,
    pub contig: String,
    pub path: PathBuf,
    pub index: PathBuf,
}

/// A per-contig slice of alignment data waiting to be concatenated.
#[derive(Debug, Clone)]
pub struct AlignmentFragment {
    pub contig: String,
    pub path: PathBuf,
    pub haplotagged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedAlignment {
    pub sample: String,
    pub path: PathBuf,
    pub index: PathBuf,
}

/// Haplotype block summary emitted by the phasing collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct HaplotypeBlocks {
    pub sample: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersion {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionManifest {
    pub pipeline: String,
    pub version: String,
    pub tools: Vec<ToolVersion>,
}

impl VersionManifest {
    pub fn new(tools: Vec<ToolVersion>) -> Self {
        Self {
            pipeline: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools,
        }
    }
}

/// Everything one sample's run produced. Published once by the driver and
/// immutable afterwards; downstream tracks get shared read-only views.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub sample: String,
    pub call_sets: Vec<CallSet>,
    pub gvcf: Option<Gvcf>,
    pub haplotype_blocks: Option<HaplotypeBlocks>,
    pub haplotagged_alignment: Option<MergedAlignment>,
    pub manifest: VersionManifest,
    pub run_params: serde_json::Value,
}

impl PipelineResult {
    pub fn call_set(&self, track: Track, phase_state: PhaseState) -> Option<&CallSet> {
        self.call_sets
            .iter()
            .find(|cs| cs.track == track && cs.phase_state == phase_state)
    }

    /// The final call set for a track, preferring the phased one.
    pub fn final_call_set(&self, track: Track) -> Option<&CallSet> {
        self.call_set(track, PhaseState::Phased)
            .or_else(|| self.call_set(track, PhaseState::Unphased))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_set(track: Track, phase_state: PhaseState) -> CallSet {
        CallSet {
            sample: "S1".to_string(),
            track,
            phase_state,
            path: PathBuf::from("calls.vcf.gz"),
            index: PathBuf::from("calls.vcf.gz.tbi"),
        }
    }

    #[test]
    fn final_call_set_prefers_phased() {
        let result = PipelineResult {
            sample: "S1".to_string(),
            call_sets: vec![
                call_set(Track::Snp, PhaseState::Unphased),
                call_set(Track::Snp, PhaseState::Phased),
            ],
            gvcf: None,
            haplotype_blocks: None,
            haplotagged_alignment: None,
            manifest: VersionManifest::new(Vec::new()),
            run_params: serde_json::Value::Null,
        };
        assert_eq!(
            result.final_call_set(Track::Snp).map(|cs| cs.phase_state),
            Some(PhaseState::Phased)
        );
        assert!(result.final_call_set(Track::Sv).is_none());
    }
}
