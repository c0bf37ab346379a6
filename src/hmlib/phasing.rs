use crate::hmlib::artifacts::{CallSet, HaplotaggedContigAlignment, HaplotypeBlocks};
use crate::hmlib::contigs::{haplotag_eligible, ContigSet};
use crate::hmlib::errors::{PipelineError, Result};
use crate::hmlib::ops::PipelineOps;
use crate::hmlib::sample::Sample;
use crossbeam_channel::unbounded;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

/// What one pass of the phasing stage yields for a sample.
#[derive(Debug)]
pub struct PhaseOutput {
    pub phased: CallSet,
    pub blocks: HaplotypeBlocks,
    pub tagged: Vec<HaplotaggedContigAlignment>,
}

/// Phases a sample's calls and haplotags the eligible contigs.
///
/// The stage consumes the unphased call set, so a second phasing pass for the
/// same sample cannot be expressed; every track that wants haplotype-resolved
/// data shares this one output.
pub struct PhasingStage {
    ops: Arc<dyn PipelineOps>,
    threads: usize,
}

impl PhasingStage {
    pub fn new(ops: Arc<dyn PipelineOps>, threads: usize) -> Self {
        Self { ops, threads }
    }

    pub fn run(&self, sample: &Sample, contigs: &ContigSet, calls: CallSet) -> Result<PhaseOutput> {
        info!("sample {}: phasing", sample.alias);
        let (phased, blocks) = self.ops.phase(sample, &calls)?;

        let site_counts = self.ops.phased_site_counts(&phased)?;
        let eligible: Vec<String> = contigs
            .names()
            .filter(|name| {
                haplotag_eligible(name, site_counts.get(*name).copied().unwrap_or(0))
            })
            .map(str::to_string)
            .collect();
        debug!(
            "sample {}: {} of {} contigs eligible for haplotagging",
            sample.alias,
            eligible.len(),
            contigs.len()
        );
        if eligible.is_empty() {
            return Ok(PhaseOutput {
                phased,
                blocks,
                tagged: Vec::new(),
            });
        }

        let tagged = self.haplotag_all(sample, &phased, &eligible)?;
        Ok(PhaseOutput {
            phased,
            blocks,
            tagged,
        })
    }

    /// Haplotag each contig independently; there is no cross-contig state, so
    /// the invocations fan out across the worker pool.
    fn haplotag_all(
        &self,
        sample: &Sample,
        phased: &CallSet,
        eligible: &[String],
    ) -> Result<Vec<HaplotaggedContigAlignment>> {
        let threads = self.threads.max(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let (task_sender, task_receiver) = unbounded::<Option<String>>();
        let (result_sender, result_receiver) =
            unbounded::<Result<HaplotaggedContigAlignment>>();

        let handles: Vec<JoinHandle<()>> = (0..threads)
            .map(|_| {
                let m_receiver = task_receiver.clone();
                let m_result_sender = result_sender.clone();
                let m_ops = self.ops.clone();
                let m_cancel = cancel.clone();
                let m_sample = sample.clone();
                let m_phased = phased.clone();

                thread::spawn(move || loop {
                    match m_receiver.recv() {
                        Ok(None) | Err(_) => break,
                        Ok(Some(contig)) => {
                            if m_cancel.load(Ordering::Relaxed) {
                                continue;
                            }
                            let result = m_ops.haplotag_contig(&m_sample, &m_phased, &contig);
                            if result.is_err() {
                                m_cancel.store(true, Ordering::Relaxed);
                            }
                            let _ = m_result_sender.send(result);
                        }
                    }
                })
            })
            .collect();
        drop(result_sender);

        for contig in eligible {
            let _ = task_sender.send(Some(contig.clone()));
        }
        for _ in 0..threads {
            let _ = task_sender.send(None);
        }

        let sty = ProgressStyle::with_template(
            " [{elapsed_precise}] {bar:44.cyan/blue} > {pos} haplotagged",
        )
        .unwrap()
        .progress_chars("##-");
        let pbar = ProgressBar::new(eligible.len() as u64).with_style(sty);

        let mut tagged = Vec::with_capacity(eligible.len());
        let mut first_err: Option<PipelineError> = None;
        while let Ok(result) = result_receiver.recv() {
            match result {
                Ok(alignment) => {
                    pbar.inc(1);
                    tagged.push(alignment);
                }
                Err(e) => {
                    if first_err.is_none() {
                        warn!(
                            "sample {}: haplotagging failed, cancelling remaining contigs",
                            sample.alias
                        );
                        first_err = Some(e);
                    }
                }
            }
        }
        pbar.finish_and_clear();
        for handle in handles {
            let _ = handle.join();
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(tagged),
        }
    }
}
