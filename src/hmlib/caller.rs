use crate::hmlib::artifacts::{CallSet, Gvcf};
use crate::hmlib::chunker::{ChunkSpec, RegionChunker};
use crate::hmlib::contigs::ContigSet;
use crate::hmlib::errors::{PipelineError, Result};
use crate::hmlib::ops::PipelineOps;
use crate::hmlib::regions::RegionFilter;
use crate::hmlib::sample::Sample;
use crossbeam_channel::unbounded;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

/// Which small-variant backend drives the calling stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CallerKind {
    Chunked,
    SingleStep,
}

impl fmt::Display for CallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallerKind::Chunked => "chunked",
            CallerKind::SingleStep => "single-step",
        })
    }
}

/// One chunk's raw call file, tagged with its region-order index.
#[derive(Debug, Clone)]
pub struct ChunkCall {
    pub index: usize,
    pub path: PathBuf,
    pub gvcf: Option<PathBuf>,
}

/// What every backend hands back: exactly one coordinate-sorted indexed call
/// set, and a gVCF exactly when one was requested.
#[derive(Debug, Clone)]
pub struct CallOutput {
    pub calls: CallSet,
    pub gvcf: Option<Gvcf>,
}

/// Uniform interface over the interchangeable small-variant backends, so
/// phasing and aggregation never know which one ran.
pub trait VariantCaller {
    fn call(
        &self,
        sample: &Sample,
        contigs: &ContigSet,
        filter: &RegionFilter,
        gvcf: bool,
    ) -> Result<CallOutput>;
}

pub fn make_caller(
    kind: CallerKind,
    ops: Arc<dyn PipelineOps>,
    threads: usize,
    chunk_size: u64,
) -> Box<dyn VariantCaller> {
    match kind {
        CallerKind::Chunked => Box::new(ChunkedCaller {
            ops,
            threads,
            chunk_size,
        }),
        CallerKind::SingleStep => Box::new(SingleStepCaller { ops }),
    }
}

fn enforce_output_contract(output: CallOutput, gvcf_requested: bool) -> Result<CallOutput> {
    match (gvcf_requested, output.gvcf.is_some()) {
        (true, false) => Err(PipelineError::tool(
            "caller",
            "gvcf requested but the backend produced none",
        )),
        (false, true) => Err(PipelineError::tool(
            "caller",
            "backend produced a gvcf nobody asked for",
        )),
        _ => Ok(output),
    }
}

/// Backend that partitions the region set into chunks, calls them in
/// parallel, and merges in region order.
pub struct ChunkedCaller {
    pub ops: Arc<dyn PipelineOps>,
    pub threads: usize,
    pub chunk_size: u64,
}

impl VariantCaller for ChunkedCaller {
    fn call(
        &self,
        sample: &Sample,
        contigs: &ContigSet,
        filter: &RegionFilter,
        gvcf: bool,
    ) -> Result<CallOutput> {
        let chunker = RegionChunker::new(contigs, filter, self.chunk_size);
        if chunker.is_empty() {
            return Err(PipelineError::config(
                "region filter leaves no callable chunks",
            ));
        }
        let total = chunker.len();
        let threads = self.threads.max(1);
        info!(
            "sample {}: dispatching {} chunks across {} threads",
            sample.alias, total, threads
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let (task_sender, task_receiver) = unbounded::<Option<ChunkSpec>>();
        let (result_sender, result_receiver) = unbounded::<(usize, Result<ChunkCall>)>();

        let handles: Vec<JoinHandle<()>> = (0..threads)
            .map(|_| {
                let m_receiver = task_receiver.clone();
                let m_result_sender = result_sender.clone();
                let m_ops = self.ops.clone();
                let m_cancel = cancel.clone();
                let m_sample = sample.clone();

                thread::spawn(move || loop {
                    match m_receiver.recv() {
                        Ok(None) | Err(_) => break,
                        Ok(Some(chunk)) => {
                            // after a failure the queue drains without dispatching
                            if m_cancel.load(Ordering::Relaxed) {
                                continue;
                            }
                            let index = chunk.index;
                            let result = m_ops.call_chunk(&m_sample, &chunk, gvcf);
                            if result.is_err() {
                                m_cancel.store(true, Ordering::Relaxed);
                            }
                            let _ = m_result_sender.send((index, result));
                        }
                    }
                })
            })
            .collect();
        drop(result_sender);

        for chunk in chunker {
            let _ = task_sender.send(Some(chunk));
        }
        for _ in 0..threads {
            let _ = task_sender.send(None);
        }

        // collect keyed by index; completion order carries no meaning
        let mut slots: Vec<Option<ChunkCall>> = (0..total).map(|_| None).collect();
        let mut first_err: Option<PipelineError> = None;
        while let Ok((index, result)) = result_receiver.recv() {
            match result {
                Ok(call) => slots[index] = Some(call),
                Err(e) => {
                    if first_err.is_none() {
                        warn!(
                            "sample {}: chunk {} failed, cancelling remaining chunks",
                            sample.alias, index
                        );
                        first_err = Some(e);
                    }
                }
            }
        }
        for handle in handles {
            let _ = handle.join();
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        let mut ordered = Vec::with_capacity(total);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(call) => ordered.push(call),
                None => {
                    return Err(PipelineError::tool(
                        "caller",
                        format!("chunk {} produced no result", index),
                    ))
                }
            }
        }

        debug!("sample {}: merging {} chunk calls", sample.alias, total);
        self.ops
            .merge_chunk_calls(sample, &ordered, gvcf)
            .and_then(|output| enforce_output_contract(output, gvcf))
    }
}

/// Backend that makes one call across the whole region set. Its accelerator
/// is probed before any work is scheduled.
pub struct SingleStepCaller {
    pub ops: Arc<dyn PipelineOps>,
}

impl VariantCaller for SingleStepCaller {
    fn call(
        &self,
        sample: &Sample,
        _contigs: &ContigSet,
        _filter: &RegionFilter,
        gvcf: bool,
    ) -> Result<CallOutput> {
        if !self.ops.accelerator_available() {
            return Err(PipelineError::config(
                "single-step backend requires an accelerator and none was detected",
            ));
        }
        info!("sample {}: single-step call", sample.alias);
        self.ops
            .call_whole(sample, gvcf)
            .and_then(|output| enforce_output_contract(output, gvcf))
    }
}
