use crate::hmlib::artifacts::{
    AlignmentFormat, AlignmentFragment, HaplotaggedContigAlignment, MergedAlignment,
};
use crate::hmlib::contigs::ContigSet;
use crate::hmlib::errors::{PipelineError, Result};
use crate::hmlib::ops::PipelineOps;
use crate::hmlib::sample::Sample;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::Arc;

/// The contig accounting for one sample at merge time: every contig in the
/// run appears in exactly one of the two lists, both in contig-set order.
#[derive(Debug, PartialEq, Eq)]
pub struct ContigPartition {
    pub tagged: Vec<String>,
    pub pass_through: Vec<String>,
}

/// Reconcile the haplotagged contigs against the full contig set.
///
/// Violations are internal defects, not user errors: a haplotagged contig
/// the run never resolved, the same contig tagged twice, or an accounting
/// mismatch all abort the sample rather than silently dropping or
/// duplicating alignment data.
pub fn partition_contigs(
    sample: &str,
    contigs: &ContigSet,
    tagged: &[String],
) -> Result<ContigPartition> {
    let mut seen: IndexSet<&str> = IndexSet::new();
    for name in tagged {
        if !contigs.contains(name) {
            return Err(PipelineError::partition(
                sample,
                format!("haplotagged contig {} is not in the contig set", name),
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::partition(
                sample,
                format!("contig {} haplotagged more than once", name),
            ));
        }
    }

    let tagged_ordered: Vec<String> = contigs
        .names()
        .filter(|name| seen.contains(name))
        .map(str::to_string)
        .collect();
    let pass_through: Vec<String> = contigs
        .names()
        .filter(|name| !seen.contains(name))
        .map(str::to_string)
        .collect();

    if tagged_ordered.len() + pass_through.len() != contigs.len() {
        return Err(PipelineError::partition(
            sample,
            format!(
                "{} tagged + {} pass-through != {} contigs",
                tagged_ordered.len(),
                pass_through.len(),
                contigs.len()
            ),
        ));
    }

    Ok(ContigPartition {
        tagged: tagged_ordered,
        pass_through,
    })
}

/// Fans per-contig alignment fragments back into one artifact per sample.
pub struct Aggregator {
    ops: Arc<dyn PipelineOps>,
    format: AlignmentFormat,
}

impl Aggregator {
    pub fn new(ops: Arc<dyn PipelineOps>, format: AlignmentFormat) -> Self {
        Self { ops, format }
    }

    /// Merge haplotagged contigs with pass-through extractions of everything
    /// else, concatenated in contig-set order.
    pub fn merge(
        &self,
        sample: &Sample,
        contigs: &ContigSet,
        tagged: Vec<HaplotaggedContigAlignment>,
    ) -> Result<MergedAlignment> {
        let tagged_names: Vec<String> = tagged.iter().map(|t| t.contig.clone()).collect();
        let partition = partition_contigs(&sample.alias, contigs, &tagged_names)?;
        info!(
            "sample {}: merging {} haplotagged + {} pass-through contigs",
            sample.alias,
            partition.tagged.len(),
            partition.pass_through.len()
        );

        // tagged contigs are never re-extracted from the original alignment
        let extracted = if partition.pass_through.is_empty() {
            Vec::new()
        } else {
            self.ops.extract_contigs(sample, &partition.pass_through)?
        };

        let mut by_contig: HashMap<String, AlignmentFragment> = HashMap::new();
        for t in tagged {
            by_contig.insert(
                t.contig.clone(),
                AlignmentFragment {
                    contig: t.contig,
                    path: t.path,
                    haplotagged: true,
                },
            );
        }
        for fragment in extracted {
            if !partition
                .pass_through
                .iter()
                .any(|name| name == &fragment.contig)
            {
                return Err(PipelineError::partition(
                    &sample.alias,
                    format!(
                        "extractor returned contig {} outside the pass-through set",
                        fragment.contig
                    ),
                ));
            }
            if by_contig.insert(fragment.contig.clone(), fragment).is_some() {
                return Err(PipelineError::partition(
                    &sample.alias,
                    "extractor returned a contig twice",
                ));
            }
        }

        let ordered: Vec<AlignmentFragment> = contigs
            .names()
            .filter_map(|name| by_contig.remove(name))
            .collect();
        if ordered.len() != contigs.len() {
            let missing: Vec<&str> = contigs
                .names()
                .filter(|name| {
                    !ordered.iter().any(|fragment| fragment.contig == *name)
                })
                .collect();
            return Err(PipelineError::partition(
                &sample.alias,
                format!("no alignment fragment for contigs: {}", missing.join(", ")),
            ));
        }

        self.ops.concat_alignments(sample, &ordered, self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmlib::testutil::ScriptedOps;
    use std::path::PathBuf;

    fn contigs() -> ContigSet {
        ContigSet::from_entries([
            ("chr1".to_string(), 1000),
            ("chr2".to_string(), 800),
            ("chrM".to_string(), 16569),
        ])
    }

    fn tagged(contig: &str) -> HaplotaggedContigAlignment {
        HaplotaggedContigAlignment {
            sample: "S1".to_string(),
            contig: contig.to_string(),
            path: PathBuf::from(format!("S1.{}.bam", contig)),
            index: PathBuf::from(format!("S1.{}.bam.bai", contig)),
        }
    }

    fn sample() -> Sample {
        Sample::new(
            "S1".to_string(),
            PathBuf::from("S1.bam"),
            PathBuf::from("ref.fa"),
            None,
        )
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let set = contigs();
        let partition =
            partition_contigs("S1", &set, &["chr1".to_string(), "chr2".to_string()]).unwrap();
        assert_eq!(partition.tagged, vec!["chr1", "chr2"]);
        assert_eq!(partition.pass_through, vec!["chrM"]);
        assert_eq!(
            partition.tagged.len() + partition.pass_through.len(),
            set.len()
        );
        for name in &partition.tagged {
            assert!(!partition.pass_through.contains(name));
        }
    }

    #[test]
    fn partition_orders_tagged_by_contig_set() {
        // arrival order is completion order; the partition reorders it
        let partition = partition_contigs(
            "S1",
            &contigs(),
            &["chr2".to_string(), "chr1".to_string()],
        )
        .unwrap();
        assert_eq!(partition.tagged, vec!["chr1", "chr2"]);
    }

    #[test]
    fn empty_tagging_passes_everything_through() {
        let partition = partition_contigs("S1", &contigs(), &[]).unwrap();
        assert!(partition.tagged.is_empty());
        assert_eq!(partition.pass_through, vec!["chr1", "chr2", "chrM"]);
    }

    #[test]
    fn duplicate_tagging_is_a_partition_violation() {
        let err = partition_contigs(
            "S1",
            &contigs(),
            &["chr1".to_string(), "chr1".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Partition { .. }));
    }

    #[test]
    fn unknown_contig_is_a_partition_violation() {
        let err = partition_contigs("S1", &contigs(), &["chr7".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::Partition { .. }));
    }

    #[test]
    fn merge_concatenates_in_contig_set_order() {
        let ops = Arc::new(ScriptedOps::new());
        let aggregator = Aggregator::new(ops.clone(), AlignmentFormat::Bam);
        // completion order deliberately scrambled
        let merged = aggregator
            .merge(&sample(), &contigs(), vec![tagged("chr2"), tagged("chr1")])
            .unwrap();
        assert_eq!(merged.sample, "S1");

        let orders = ops.concat_orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0], vec!["chr1", "chr2", "chrM"]);

        let requests = ops.extract_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], vec!["chrM"]);
    }

    #[test]
    fn merge_with_no_tagging_extracts_everything() {
        let ops = Arc::new(ScriptedOps::new());
        let aggregator = Aggregator::new(ops.clone(), AlignmentFormat::Bam);
        aggregator.merge(&sample(), &contigs(), Vec::new()).unwrap();

        let requests = ops.extract_requests.lock().unwrap();
        assert_eq!(requests[0], vec!["chr1", "chr2", "chrM"]);
    }

    #[test]
    fn rogue_extractor_is_a_partition_violation() {
        let ops = Arc::new(ScriptedOps::new().extract_extra("chr1"));
        let aggregator = Aggregator::new(ops, AlignmentFormat::Bam);
        let err = aggregator
            .merge(&sample(), &contigs(), vec![tagged("chr1"), tagged("chr2")])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Partition { .. }));
    }

    #[test]
    fn short_extractor_is_a_partition_violation() {
        let ops = Arc::new(ScriptedOps::new().extract_skip("chrM"));
        let aggregator = Aggregator::new(ops, AlignmentFormat::Bam);
        let err = aggregator
            .merge(&sample(), &contigs(), vec![tagged("chr1"), tagged("chr2")])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Partition { .. }));
    }
}
