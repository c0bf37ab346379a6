use crate::hmlib::artifacts::{PhaseState, PipelineResult};
use crate::hmlib::contigs::ContigSet;
use crate::hmlib::errors::Result;
use crate::hmlib::tracks::{Track, TrackSet};
use noodles_vcf::{self as vcf};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct CallSetSummary {
    pub track: Track,
    pub phase_state: PhaseState,
    pub path: PathBuf,
    pub records: Option<u64>,
}

/// Structured statistics handed to the report renderer and to downstream
/// exporters.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub sample: String,
    pub enabled_tracks: Vec<&'static str>,
    pub contigs: usize,
    pub chunks: usize,
    pub haplotagged_contigs: usize,
    pub pass_through_contigs: usize,
    pub call_sets: Vec<CallSetSummary>,
    pub gvcf_produced: bool,
}

pub fn build_stats(
    result: &PipelineResult,
    enabled: TrackSet,
    contigs: &ContigSet,
    chunks: usize,
    haplotagged_contigs: usize,
) -> RunStats {
    RunStats {
        sample: result.sample.clone(),
        enabled_tracks: enabled.names(),
        contigs: contigs.len(),
        chunks,
        haplotagged_contigs,
        pass_through_contigs: contigs.len() - haplotagged_contigs,
        call_sets: result
            .call_sets
            .iter()
            .map(|cs| CallSetSummary {
                track: cs.track,
                phase_state: cs.phase_state,
                path: cs.path.clone(),
                records: None,
            })
            .collect(),
        gvcf_produced: result.gvcf.is_some(),
    }
}

/// Per-contig record tallies for a call set.
pub fn contig_record_counts(path: &Path) -> Result<HashMap<String, usize>> {
    let mut reader = vcf::io::reader::Builder::default().build_from_path(path)?;
    let _header = reader.read_header()?;

    let mut counts = HashMap::new();
    let mut entry = vcf::Record::default();
    loop {
        match reader.read_record(&mut entry) {
            Ok(0) => break,
            Err(e) => {
                error!("skipping invalid record {:?}", e);
                continue;
            }
            Ok(_) => {
                *counts
                    .entry(entry.reference_sequence_name().to_string())
                    .or_insert(0) += 1;
            }
        }
    }
    Ok(counts)
}

pub fn call_set_record_count(path: &Path) -> Result<u64> {
    Ok(contig_record_counts(path)?.values().map(|n| *n as u64).sum())
}
