use crate::hmlib::artifacts::{
    AlignmentFormat, AlignmentFragment, CallSet, Gvcf, HaplotaggedContigAlignment,
    HaplotypeBlocks, MergedAlignment, PhaseState, PipelineResult, ToolVersion,
};
use crate::hmlib::caller::{CallOutput, ChunkCall};
use crate::hmlib::chunker::ChunkSpec;
use crate::hmlib::errors::{PipelineError, Result};
use crate::hmlib::ops::PipelineOps;
use crate::hmlib::report::RunStats;
use crate::hmlib::sample::Sample;
use crate::hmlib::tracks::Track;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Scripted collaborator for tests: fabricates artifact paths, records every
/// invocation, and misbehaves on demand.
pub struct ScriptedOps {
    pub phase_invocations: AtomicUsize,
    pub whole_invocations: AtomicUsize,
    pub chunk_invocations: AtomicUsize,
    pub haplotag_invocations: AtomicUsize,
    pub reports: AtomicUsize,
    pub merge_orders: Mutex<Vec<Vec<usize>>>,
    pub concat_orders: Mutex<Vec<Vec<String>>>,
    pub extract_requests: Mutex<Vec<Vec<String>>>,
    pub track_invocations: Mutex<Vec<(Track, String)>>,

    accelerator: bool,
    stagger: bool,
    sites: HashMap<String, usize>,
    fail_calling: Option<String>,
    fail_haplotag: Option<String>,
    fail_tracks: HashSet<Track>,
    extract_extra: Option<String>,
    extract_skip: Option<String>,
}

impl ScriptedOps {
    pub fn new() -> Self {
        Self {
            phase_invocations: AtomicUsize::new(0),
            whole_invocations: AtomicUsize::new(0),
            chunk_invocations: AtomicUsize::new(0),
            haplotag_invocations: AtomicUsize::new(0),
            reports: AtomicUsize::new(0),
            merge_orders: Mutex::new(Vec::new()),
            concat_orders: Mutex::new(Vec::new()),
            extract_requests: Mutex::new(Vec::new()),
            track_invocations: Mutex::new(Vec::new()),
            accelerator: true,
            stagger: false,
            sites: HashMap::new(),
            fail_calling: None,
            fail_haplotag: None,
            fail_tracks: HashSet::new(),
            extract_extra: None,
            extract_skip: None,
        }
    }

    /// Sleep inversely to chunk index so completion order differs from
    /// dispatch order.
    pub fn stagger_chunks(mut self) -> Self {
        self.stagger = true;
        self
    }

    pub fn without_accelerator(mut self) -> Self {
        self.accelerator = false;
        self
    }

    pub fn with_sites(mut self, sites: &[(&str, usize)]) -> Self {
        self.sites = sites
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect();
        self
    }

    pub fn fail_calling_for(mut self, alias: &str) -> Self {
        self.fail_calling = Some(alias.to_string());
        self
    }

    pub fn fail_haplotag_on(mut self, contig: &str) -> Self {
        self.fail_haplotag = Some(contig.to_string());
        self
    }

    pub fn fail_track(mut self, track: Track) -> Self {
        self.fail_tracks.insert(track);
        self
    }

    pub fn extract_extra(mut self, contig: &str) -> Self {
        self.extract_extra = Some(contig.to_string());
        self
    }

    pub fn extract_skip(mut self, contig: &str) -> Self {
        self.extract_skip = Some(contig.to_string());
        self
    }

    fn call_set(&self, sample: &Sample, phase_state: PhaseState) -> CallSet {
        let tag = match phase_state {
            PhaseState::Unphased => "snp",
            PhaseState::Phased => "phased",
        };
        CallSet {
            sample: sample.alias.clone(),
            track: Track::Snp,
            phase_state,
            path: PathBuf::from(format!("out/{}.{}.vcf.gz", sample.alias, tag)),
            index: PathBuf::from(format!("out/{}.{}.vcf.gz.tbi", sample.alias, tag)),
        }
    }

    fn gvcf(&self, sample: &Sample) -> Gvcf {
        Gvcf {
            sample: sample.alias.clone(),
            path: PathBuf::from(format!("out/{}.snp.g.vcf.gz", sample.alias)),
            index: PathBuf::from(format!("out/{}.snp.g.vcf.gz.tbi", sample.alias)),
        }
    }
}

impl PipelineOps for ScriptedOps {
    fn call_chunk(&self, sample: &Sample, chunk: &ChunkSpec, gvcf: bool) -> Result<ChunkCall> {
        if self.fail_calling.as_deref() == Some(sample.alias.as_str()) {
            return Err(PipelineError::tool("caller", format!("chunk {} boom", chunk.index)));
        }
        if self.stagger {
            thread::sleep(Duration::from_millis(((chunk.index % 5) * 3) as u64));
        }
        self.chunk_invocations.fetch_add(1, Ordering::Relaxed);
        Ok(ChunkCall {
            index: chunk.index,
            path: PathBuf::from(format!("out/{}.{:05}.vcf.gz", sample.alias, chunk.index)),
            gvcf: gvcf.then(|| {
                PathBuf::from(format!("out/{}.{:05}.g.vcf.gz", sample.alias, chunk.index))
            }),
        })
    }

    fn merge_chunk_calls(
        &self,
        sample: &Sample,
        chunks: &[ChunkCall],
        gvcf: bool,
    ) -> Result<CallOutput> {
        self.merge_orders
            .lock()
            .unwrap()
            .push(chunks.iter().map(|c| c.index).collect());
        Ok(CallOutput {
            calls: self.call_set(sample, PhaseState::Unphased),
            gvcf: gvcf.then(|| self.gvcf(sample)),
        })
    }

    fn call_whole(&self, sample: &Sample, gvcf: bool) -> Result<CallOutput> {
        if self.fail_calling.as_deref() == Some(sample.alias.as_str()) {
            return Err(PipelineError::tool("caller", "boom"));
        }
        self.whole_invocations.fetch_add(1, Ordering::Relaxed);
        Ok(CallOutput {
            calls: self.call_set(sample, PhaseState::Unphased),
            gvcf: gvcf.then(|| self.gvcf(sample)),
        })
    }

    fn accelerator_available(&self) -> bool {
        self.accelerator
    }

    fn phase(&self, sample: &Sample, _calls: &CallSet) -> Result<(CallSet, HaplotypeBlocks)> {
        self.phase_invocations.fetch_add(1, Ordering::Relaxed);
        Ok((
            self.call_set(sample, PhaseState::Phased),
            HaplotypeBlocks {
                sample: sample.alias.clone(),
                path: PathBuf::from(format!("out/{}.blocks.gtf", sample.alias)),
            },
        ))
    }

    fn phased_site_counts(&self, _calls: &CallSet) -> Result<HashMap<String, usize>> {
        Ok(self.sites.clone())
    }

    fn haplotag_contig(
        &self,
        sample: &Sample,
        _calls: &CallSet,
        contig: &str,
    ) -> Result<HaplotaggedContigAlignment> {
        if self.fail_haplotag.as_deref() == Some(contig) {
            return Err(PipelineError::tool("phaser", format!("{} boom", contig)));
        }
        self.haplotag_invocations.fetch_add(1, Ordering::Relaxed);
        Ok(HaplotaggedContigAlignment {
            sample: sample.alias.clone(),
            contig: contig.to_string(),
            path: PathBuf::from(format!("out/{}.{}.bam", sample.alias, contig)),
            index: PathBuf::from(format!("out/{}.{}.bam.bai", sample.alias, contig)),
        })
    }

    fn extract_contigs(
        &self,
        sample: &Sample,
        contigs: &[String],
    ) -> Result<Vec<AlignmentFragment>> {
        self.extract_requests
            .lock()
            .unwrap()
            .push(contigs.to_vec());

        let mut names: Vec<String> = contigs
            .iter()
            .filter(|name| self.extract_skip.as_deref() != Some(name.as_str()))
            .cloned()
            .collect();
        if let Some(extra) = &self.extract_extra {
            names.push(extra.clone());
        }

        Ok(names
            .into_iter()
            .map(|contig| AlignmentFragment {
                path: PathBuf::from(format!("out/{}.{}.pass.bam", sample.alias, contig)),
                contig,
                haplotagged: false,
            })
            .collect())
    }

    fn concat_alignments(
        &self,
        sample: &Sample,
        fragments: &[AlignmentFragment],
        format: AlignmentFormat,
    ) -> Result<MergedAlignment> {
        self.concat_orders
            .lock()
            .unwrap()
            .push(fragments.iter().map(|f| f.contig.clone()).collect());
        Ok(MergedAlignment {
            sample: sample.alias.clone(),
            path: PathBuf::from(format!(
                "out/{}.haplotagged.{}",
                sample.alias,
                format.extension()
            )),
            index: PathBuf::from(format!("out/{}.haplotagged.bai", sample.alias)),
        })
    }

    fn run_track(
        &self,
        track: Track,
        sample: &Sample,
        _handoff: &PipelineResult,
    ) -> Result<CallSet> {
        self.track_invocations
            .lock()
            .unwrap()
            .push((track, sample.alias.clone()));
        if self.fail_tracks.contains(&track) {
            return Err(PipelineError::tool(track.name(), "boom"));
        }
        Ok(CallSet {
            sample: sample.alias.clone(),
            track,
            phase_state: PhaseState::Unphased,
            path: PathBuf::from(format!("out/{}.{}.vcf.gz", sample.alias, track.name())),
            index: PathBuf::from(format!("out/{}.{}.vcf.gz.tbi", sample.alias, track.name())),
        })
    }

    fn render_report(&self, result: &PipelineResult, _stats: &RunStats) -> Result<PathBuf> {
        self.reports.fetch_add(1, Ordering::Relaxed);
        Ok(PathBuf::from(format!("out/{}.report.html", result.sample)))
    }

    fn tool_versions(&self) -> Vec<ToolVersion> {
        vec![ToolVersion {
            name: "scripted".to_string(),
            version: "0".to_string(),
        }]
    }
}
