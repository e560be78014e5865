//! Best-candidate search over a node's samples.
//!
//! A node's candidate budget is split into shares. Each share draws its
//! candidates from its own ChaCha8 stream of the node seed, so the outcome
//! depends only on the seed and the share layout, never on scheduling.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::candidate::{CandidateSampler, ScoredCandidate, SplitCandidate};
use crate::config::TrainConfig;
use crate::distribution::LabelCounts;
use crate::error::RfError;
use crate::sample::Sample;

/// Split `budget` into `parts` shares, handing the remainder to the lowest
/// indices.
#[must_use]
pub fn split_budget(budget: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = budget / parts;
    let extra = budget % parts;
    (0..parts).map(|i| base + usize::from(i < extra)).collect()
}

/// Keep the first candidate with strictly greatest gain.
pub fn reduce_best(
    proposals: impl IntoIterator<Item = Option<ScoredCandidate>>,
) -> Option<ScoredCandidate> {
    proposals
        .into_iter()
        .flatten()
        .fold(None, |best: Option<ScoredCandidate>, p| match best {
            Some(b) if p.gain <= b.gain => Some(b),
            _ => Some(p),
        })
}

/// Draw `budget` candidates from `rng` and return the first one with the
/// strictly highest positive gain.
pub fn sequential_best<S: Sample>(
    samples: &[S],
    parent: &LabelCounts,
    sampler: &CandidateSampler,
    budget: usize,
    rng: &mut ChaCha8Rng,
) -> Option<ScoredCandidate> {
    let mut best: Option<ScoredCandidate> = None;
    let mut best_gain = 0.0;
    for _ in 0..budget {
        let candidate = SplitCandidate::generate(sampler, rng);
        let gain = candidate.gain_against(parent, samples);
        if gain > best_gain {
            best_gain = gain;
            best = Some(ScoredCandidate { candidate, gain });
        }
    }
    best
}

/// Candidate search settings shared by every node of a tree.
#[derive(Debug, Clone)]
pub struct SplitSearch {
    sampler: CandidateSampler,
    budget: usize,
    threads: usize,
}

impl SplitSearch {
    /// Create a search drawing `budget` candidates per node across `threads`
    /// workers.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::InvalidCandidateCount`] | `budget` is zero |
    /// | [`RfError::InvalidThreadCount`] | `threads` is zero |
    pub fn new(sampler: CandidateSampler, budget: usize, threads: usize) -> Result<Self, RfError> {
        if budget == 0 {
            return Err(RfError::InvalidCandidateCount { candidates: budget });
        }
        if threads == 0 {
            return Err(RfError::InvalidThreadCount { threads });
        }
        Ok(Self {
            sampler,
            budget,
            threads,
        })
    }

    /// Create the search described by `config`.
    ///
    /// # Errors
    ///
    /// Propagates range, budget and thread-count errors from `config`.
    pub fn from_config(config: &TrainConfig) -> Result<Self, RfError> {
        Self::new(
            config.candidate_sampler()?,
            config.candidates_per_node(),
            config.search_threads(),
        )
    }

    /// Candidates drawn per node.
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Workers per participant.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Best candidate for `samples` using the whole budget.
    #[must_use]
    pub fn best<S: Sample>(&self, samples: &[S], node_seed: u64) -> Option<ScoredCandidate> {
        self.best_in_share(samples, node_seed, 0, 1)
    }

    /// Best candidate within participant `rank`'s share of the budget when
    /// `participants` processes search the same node.
    ///
    /// Worker `t` of participant `r` draws from stream `r * threads + t`, so
    /// `P` participants with `T` threads each search exactly the candidates
    /// a single participant with `P * T` threads would when the budget
    /// divides evenly.
    #[must_use]
    pub fn best_in_share<S: Sample>(
        &self,
        samples: &[S],
        node_seed: u64,
        rank: usize,
        participants: usize,
    ) -> Option<ScoredCandidate> {
        let share = split_budget(self.budget, participants.max(1))
            .get(rank)
            .copied()
            .unwrap_or(0);
        if share == 0 || samples.is_empty() {
            return None;
        }
        let parent = LabelCounts::of_samples(samples);
        let budgets = split_budget(share, self.threads);
        let first_stream = (rank * self.threads) as u64;

        let run = |(t, budget): (usize, usize)| {
            let mut rng = ChaCha8Rng::seed_from_u64(node_seed);
            rng.set_stream(first_stream + t as u64);
            sequential_best(samples, &parent, &self.sampler, budget, &mut rng)
        };

        if self.threads == 1 {
            return run((0, share));
        }
        let proposals: Vec<Option<ScoredCandidate>> =
            budgets.into_par_iter().enumerate().map(run).collect();
        reduce_best(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Spread;
    use crate::sample::testing::{ScalarSample, two_clusters};

    fn search(budget: usize, threads: usize) -> SplitSearch {
        let sampler = CandidateSampler::new(-3..=3, 0.0..=20.0, Spread::Uniform).unwrap();
        SplitSearch::new(sampler, budget, threads).unwrap()
    }

    fn scored(gain: f64, threshold: f64) -> ScoredCandidate {
        let o = crate::sample::Offset::ORIGIN;
        ScoredCandidate {
            candidate: SplitCandidate::new(o, o, threshold),
            gain,
        }
    }

    #[test]
    fn budget_remainder_goes_to_low_indices() {
        assert_eq!(split_budget(10, 3), vec![4, 3, 3]);
        assert_eq!(split_budget(2, 4), vec![1, 1, 0, 0]);
        assert!(split_budget(5, 0).is_empty());
    }

    #[test]
    fn reduce_keeps_first_of_equal_gains() {
        let best = reduce_best([
            None,
            Some(scored(0.5, 1.0)),
            Some(scored(0.5, 2.0)),
            Some(scored(0.25, 3.0)),
        ])
        .unwrap();
        assert_eq!(best.candidate.threshold, 1.0);
        assert!(reduce_best([None, None]).is_none());
    }

    #[test]
    fn finds_separating_candidate() {
        let samples = two_clusters(5);
        let best = search(200, 1).best(&samples, 3).unwrap();
        assert!((best.gain - 1.0).abs() < 1e-12, "gain = {}", best.gain);
    }

    #[test]
    fn pure_samples_yield_no_candidate() {
        let samples: Vec<ScalarSample> = (0..6).map(|i| ScalarSample::new(i as f64, 1)).collect();
        assert!(search(100, 2).best(&samples, 3).is_none());
    }

    #[test]
    fn parallel_search_is_deterministic() {
        let samples = two_clusters(20);
        let a = search(64, 4).best(&samples, 17);
        let b = search(64, 4).best(&samples, 17);
        assert_eq!(a, b);
    }

    #[test]
    fn participant_shares_match_wider_local_search() {
        let samples = two_clusters(20);
        let local = search(60, 6).best(&samples, 99);
        let shared = search(60, 2);
        let proposals: Vec<_> = (0..3)
            .map(|rank| shared.best_in_share(&samples, 99, rank, 3))
            .collect();
        assert_eq!(reduce_best(proposals), local);
    }

    #[test]
    fn zero_budget_or_threads_rejected() {
        let sampler = CandidateSampler::new(0..=1, 0.0..=1.0, Spread::Uniform).unwrap();
        assert!(SplitSearch::new(sampler.clone(), 0, 1).is_err());
        assert!(SplitSearch::new(sampler, 1, 0).is_err());
    }
}
