use crate::hmlib::contigs::ContigSet;
use crate::hmlib::errors::{PipelineError, Result};
use rust_lapper::{Interval, Lapper};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead},
    path::Path,
};

pub type Iv = Interval<u64, u64>;

type FileHandler = io::Result<io::Lines<io::BufReader<File>>>;

fn read_lines<P>(filename: P) -> FileHandler
where
    P: AsRef<Path>,
{
    let file = File::open(filename)?;
    Ok(io::BufReader::new(file).lines())
}

#[derive(Debug, PartialEq, Eq)]
pub struct BedEntry {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

/// Reads tab delimited bed files while ensuring entries have start < end and
/// are sorted within a chromosome.
pub struct BedParser {
    file: std::path::PathBuf,
    prev_chrom: String,
    prev_start: u64,
}

impl BedParser {
    pub fn new(path: &Path) -> Self {
        Self {
            file: path.to_path_buf(),
            prev_chrom: String::new(),
            prev_start: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Vec<BedEntry>> {
        let lines = read_lines(&self.file).map_err(|e| {
            PipelineError::config(format!("unable to read bed {}: {}", self.file.display(), e))
        })?;

        let mut entries = Vec::new();
        for line in lines.map_while(io::Result::ok) {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                return Err(PipelineError::config(format!(
                    "malformed bed line: {}",
                    line
                )));
            }
            let chrom = fields[0].to_string();
            let (start, end) = match (fields[1].parse::<u64>(), fields[2].parse::<u64>()) {
                (Ok(s), Ok(e)) => (s, e),
                _ => {
                    return Err(PipelineError::config(format!(
                        "malformed bed coordinates: {}",
                        line
                    )))
                }
            };

            if chrom != self.prev_chrom {
                self.prev_chrom.clone_from(&chrom);
                self.prev_start = 0;
            }

            if end <= start {
                return Err(PipelineError::config(format!(
                    "malformed bed line: stop <= start {}",
                    line
                )));
            }
            if start < self.prev_start {
                return Err(PipelineError::config(format!(
                    "bed file unordered `sort -k1,1 -k2,2n` offending line {}",
                    line
                )));
            }
            self.prev_start = start;

            entries.push(BedEntry { chrom, start, end });
        }

        Ok(entries)
    }
}

/// Optional restriction of the callable space.
///
/// An unrestricted filter covers every contig end to end. A restricted filter
/// holds one interval tree per contig; contigs absent from the bed contribute
/// no callable spans.
#[derive(Default)]
pub struct RegionFilter {
    trees: HashMap<String, Lapper<u64, u64>>,
}

impl RegionFilter {
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from a bed file, keeping only intervals on contigs in the set.
    pub fn from_bed(path: &Path, contigs: &ContigSet) -> Result<Self> {
        let mut parser = BedParser::new(path);
        let mut held = HashMap::<String, Vec<Iv>>::new();
        let mut dropped = 0usize;
        for entry in parser.parse()? {
            if !contigs.contains(&entry.chrom) {
                dropped += 1;
                continue;
            }
            held.entry(entry.chrom).or_default().push(Iv {
                start: entry.start,
                stop: entry.end,
                val: 0,
            });
        }
        if dropped != 0 {
            warn!("{} bed intervals on contigs outside the run", dropped);
        }

        let trees = held
            .into_iter()
            .map(|(chrom, ivs)| (chrom, Lapper::new(ivs)))
            .collect();
        Ok(Self { trees })
    }

    pub fn is_restricted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Callable spans on one contig, clamped to `[0, length)`.
    pub fn spans(&self, contig: &str, length: u64) -> Vec<(u64, u64)> {
        if !self.is_restricted() {
            return vec![(0, length)];
        }
        match self.trees.get(contig) {
            None => Vec::new(),
            Some(lapper) => lapper
                .find(0, length)
                .map(|iv| (iv.start, iv.stop.min(length)))
                .collect(),
        }
    }
}
