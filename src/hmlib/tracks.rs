use bitflags::bitflags;
use serde::Serialize;
use std::fmt;

bitflags! {
    /// The independently toggleable analysis tracks.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct TrackSet: u8 {
        const SNP = 1 << 0; // small variants
        const SV  = 1 << 1; // structural variants
        const CNV = 1 << 2; // copy number
        const STR = 1 << 3; // repeat expansions
        const MOD = 1 << 4; // base modifications
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Snp,
    Sv,
    Cnv,
    Str,
    Mod,
}

impl Track {
    pub const ALL: [Track; 5] = [Track::Snp, Track::Sv, Track::Cnv, Track::Str, Track::Mod];

    pub fn flag(&self) -> TrackSet {
        match self {
            Track::Snp => TrackSet::SNP,
            Track::Sv => TrackSet::SV,
            Track::Cnv => TrackSet::CNV,
            Track::Str => TrackSet::STR,
            Track::Mod => TrackSet::MOD,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Track::Snp => "snp",
            Track::Sv => "sv",
            Track::Cnv => "cnv",
            Track::Str => "str",
            Track::Mod => "mod",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TrackSet {
    /// Member tracks in fixed declaration order.
    pub fn tracks(&self) -> Vec<Track> {
        Track::ALL
            .iter()
            .copied()
            .filter(|t| self.contains(t.flag()))
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tracks().iter().map(Track::name).collect()
    }
}

/// Backend selector for the copy-number track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CnvBackend {
    Depth,
    PhaseAware,
}

impl fmt::Display for CnvBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CnvBackend::Depth => "depth",
            CnvBackend::PhaseAware => "phase-aware",
        })
    }
}

/// Flags that participate in dependency resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveFlags {
    pub phased: bool,
    pub cnv_backend: CnvBackend,
}

/// One activation rule: when `when` holds for the current enabled set, the
/// tracks in `adds` must also run.
struct Rule {
    name: &'static str,
    when: fn(TrackSet, &ResolveFlags) -> bool,
    adds: TrackSet,
}

fn str_needs_haplotagging(enabled: TrackSet, _flags: &ResolveFlags) -> bool {
    enabled.contains(TrackSet::STR)
}

fn phase_aware_cnv_needs_calls(enabled: TrackSet, flags: &ResolveFlags) -> bool {
    enabled.contains(TrackSet::CNV) && flags.cnv_backend == CnvBackend::PhaseAware
}

fn phased_sv_needs_calls(enabled: TrackSet, flags: &ResolveFlags) -> bool {
    enabled.contains(TrackSet::SV) && flags.phased
}

const RULES: &[Rule] = &[
    Rule {
        name: "str requires snp",
        when: str_needs_haplotagging,
        adds: TrackSet::SNP,
    },
    Rule {
        name: "phase-aware cnv requires snp",
        when: phase_aware_cnv_needs_calls,
        adds: TrackSet::SNP,
    },
    Rule {
        name: "phased sv requires snp",
        when: phased_sv_needs_calls,
        adds: TrackSet::SNP,
    },
];

/// Expand a requested track set into the set that must actually execute.
///
/// Pure and total: requesting nothing yields nothing, and invalid flag
/// combinations are a validation concern upstream of this function. The rule
/// table is applied until no rule adds a new track, so chained dependencies
/// settle in one call.
pub fn resolve(requested: TrackSet, flags: &ResolveFlags) -> TrackSet {
    let mut enabled = requested;
    loop {
        let before = enabled;
        for rule in RULES {
            if (rule.when)(enabled, flags) && !enabled.contains(rule.adds) {
                debug!("activation rule fired: {}", rule.name);
                enabled |= rule.adds;
            }
        }
        if enabled == before {
            return enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_flag_combos() -> Vec<ResolveFlags> {
        let mut combos = Vec::new();
        for phased in [false, true] {
            for cnv_backend in [CnvBackend::Depth, CnvBackend::PhaseAware] {
                combos.push(ResolveFlags { phased, cnv_backend });
            }
        }
        combos
    }

    fn all_subsets() -> impl Iterator<Item = TrackSet> {
        (0u8..32).map(TrackSet::from_bits_truncate)
    }

    #[test]
    fn str_pulls_in_snp() {
        let flags = ResolveFlags {
            phased: false,
            cnv_backend: CnvBackend::Depth,
        };
        let enabled = resolve(TrackSet::STR, &flags);
        assert_eq!(enabled, TrackSet::STR | TrackSet::SNP);
    }

    #[test]
    fn phased_sv_pulls_in_snp() {
        let flags = ResolveFlags {
            phased: true,
            cnv_backend: CnvBackend::Depth,
        };
        let enabled = resolve(TrackSet::SV, &flags);
        assert_eq!(enabled, TrackSet::SV | TrackSet::SNP);
    }

    #[test]
    fn unphased_sv_stays_alone() {
        let flags = ResolveFlags {
            phased: false,
            cnv_backend: CnvBackend::Depth,
        };
        assert_eq!(resolve(TrackSet::SV, &flags), TrackSet::SV);
    }

    #[test]
    fn phase_aware_cnv_pulls_in_snp() {
        let flags = ResolveFlags {
            phased: false,
            cnv_backend: CnvBackend::PhaseAware,
        };
        assert_eq!(resolve(TrackSet::CNV, &flags), TrackSet::CNV | TrackSet::SNP);
    }

    #[test]
    fn depth_cnv_stays_alone() {
        let flags = ResolveFlags {
            phased: false,
            cnv_backend: CnvBackend::Depth,
        };
        assert_eq!(resolve(TrackSet::CNV, &flags), TrackSet::CNV);
    }

    #[test]
    fn empty_request_is_valid() {
        for flags in all_flag_combos() {
            assert_eq!(resolve(TrackSet::empty(), &flags), TrackSet::empty());
        }
    }

    #[test]
    fn requested_is_subset_of_enabled() {
        for flags in all_flag_combos() {
            for requested in all_subsets() {
                assert!(resolve(requested, &flags).contains(requested));
            }
        }
    }

    #[test]
    fn resolve_is_idempotent() {
        for flags in all_flag_combos() {
            for requested in all_subsets() {
                let once = resolve(requested, &flags);
                assert_eq!(resolve(once, &flags), once);
            }
        }
    }

    #[test]
    fn resolve_is_monotone() {
        for flags in all_flag_combos() {
            for small in all_subsets() {
                for big in all_subsets() {
                    if big.contains(small) {
                        assert!(resolve(big, &flags).contains(resolve(small, &flags)));
                    }
                }
            }
        }
    }

    #[test]
    fn track_roundtrip() {
        let set = TrackSet::SNP | TrackSet::STR;
        assert_eq!(set.tracks(), vec![Track::Snp, Track::Str]);
        assert_eq!(set.names(), vec!["snp", "str"]);
    }
}
