use crate::hmlib::errors::{PipelineError, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Which reference contigs participate in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContigPolicy {
    /// Standard chromosomes only (autosomes, X, Y, mitochondrion).
    Standard,
    /// Every contig in the reference index, decoys and alts included.
    All,
}

/// Ordered set of reference contigs for one run.
///
/// Order is the reference-index order so every downstream merge is
/// reproducible regardless of completion order.
#[derive(Debug, Clone)]
pub struct ContigSet {
    contigs: IndexMap<String, u64>,
}

impl ContigSet {
    /// Enumerate contigs from a faidx file, applying the inclusion policy.
    pub fn from_fai(path: &Path, policy: ContigPolicy) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::config(format!(
                "unable to read reference index {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut contigs = IndexMap::new();
        for (lineno, line) in io::BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 {
                return Err(PipelineError::config(format!(
                    "malformed faidx line {} in {}",
                    lineno + 1,
                    path.display()
                )));
            }
            let length: u64 = fields[1].parse().map_err(|_| {
                PipelineError::config(format!(
                    "malformed contig length on faidx line {} in {}",
                    lineno + 1,
                    path.display()
                ))
            })?;
            let name = fields[0].to_string();
            if policy == ContigPolicy::Standard && !is_standard_contig(&name) {
                continue;
            }
            if contigs.insert(name.clone(), length).is_some() {
                return Err(PipelineError::config(format!(
                    "duplicate contig {} in {}",
                    name,
                    path.display()
                )));
            }
        }

        Ok(Self { contigs })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            contigs: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contigs.contains_key(name)
    }

    pub fn length(&self, name: &str) -> Option<u64> {
        self.contigs.get(name).copied()
    }

    /// Position of a contig in reference-index order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.contigs.get_index_of(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contigs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.contigs.iter().map(|(name, len)| (name.as_str(), *len))
    }
}

lazy_static::lazy_static! {
    static ref STANDARD_CONTIGS: HashSet<String> = {
        let mut names = HashSet::new();
        for i in 1..=22u8 {
            names.insert(format!("chr{}", i));
            names.insert(i.to_string());
        }
        for tail in ["X", "Y", "M", "MT"] {
            names.insert(format!("chr{}", tail));
            names.insert(tail.to_string());
        }
        names
    };
}

/// Standard chromosomes in either naming convention (chr-prefixed or bare).
pub fn is_standard_contig(name: &str) -> bool {
    STANDARD_CONTIGS.contains(name)
}

pub fn is_mitochondrial(name: &str) -> bool {
    matches!(name, "chrM" | "chrMT" | "M" | "MT")
}

/// Whether a contig gets its own haplotagging invocation.
///
/// The mitochondrion is never haplotagged, and neither is a contig with no
/// sites to phase; both flow through aggregation as pass-through alignments.
pub fn haplotag_eligible(name: &str, phaseable_sites: usize) -> bool {
    !is_mitochondrial(name) && phaseable_sites > 0
}
