use crate::hmlib::contigs::ContigSet;
use crate::hmlib::regions::RegionFilter;
use std::fmt;

/// One unit of caller work: a half-open span on a single contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    pub index: usize,
    pub contig: String,
    pub start: u64,
    pub end: u64,
}

impl fmt::Display for ChunkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

/// Partitions the (optionally bed-restricted) contig space into fixed-span
/// work chunks.
///
/// Chunks are enumerated in contig-set order with dense indices, so the same
/// inputs always produce the same chunk list and the caller's merge can order
/// results by index instead of completion.
pub struct RegionChunker {
    chunks: Vec<ChunkSpec>,
    pub span_total: u64,
}

impl RegionChunker {
    pub fn new(contigs: &ContigSet, filter: &RegionFilter, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut span_total = 0;

        for (name, length) in contigs.iter() {
            for (start, end) in filter.spans(name, length) {
                let mut pos = start;
                while pos < end {
                    let stop = (pos + chunk_size).min(end);
                    chunks.push(ChunkSpec {
                        index: chunks.len(),
                        contig: name.to_string(),
                        start: pos,
                        end: stop,
                    });
                    span_total += stop - pos;
                    pos = stop;
                }
            }
        }

        Self { chunks, span_total }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[ChunkSpec] {
        &self.chunks
    }
}

impl IntoIterator for RegionChunker {
    type Item = ChunkSpec;
    type IntoIter = std::vec::IntoIter<ChunkSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn contigs() -> ContigSet {
        ContigSet::from_entries([("chr1".to_string(), 250), ("chr2".to_string(), 100)])
    }

    #[test]
    fn chunks_are_dense_and_ordered() {
        let chunker = RegionChunker::new(&contigs(), &RegionFilter::none(), 100);
        let specs: Vec<String> = chunker.chunks().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            specs,
            vec!["chr1:0-100", "chr1:100-200", "chr1:200-250", "chr2:0-100"]
        );
        for (i, chunk) in chunker.chunks().iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
        assert_eq!(chunker.span_total, 350);
    }

    #[test]
    fn same_inputs_same_chunks() {
        let a = RegionChunker::new(&contigs(), &RegionFilter::none(), 64);
        let b = RegionChunker::new(&contigs(), &RegionFilter::none(), 64);
        assert_eq!(a.chunks(), b.chunks());
    }

    #[test]
    fn bed_restriction_limits_chunks() {
        let mut bed = NamedTempFile::new().unwrap();
        writeln!(bed, "chr1\t50\t120").unwrap();
        let filter = RegionFilter::from_bed(bed.path(), &contigs()).unwrap();

        let chunker = RegionChunker::new(&contigs(), &filter, 50);
        let specs: Vec<String> = chunker.chunks().iter().map(|c| c.to_string()).collect();
        assert_eq!(specs, vec!["chr1:50-100", "chr1:100-120"]);
        assert_eq!(chunker.span_total, 70);
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        let chunker = RegionChunker::new(&contigs(), &RegionFilter::none(), 0);
        // one chunk per base is silly but well defined
        assert_eq!(chunker.len(), 350);
    }
}
