//! Configuration builder for forest training.

use std::ops::RangeInclusive;

use crate::candidate::{CandidateSampler, Spread};
use crate::error::RfError;

/// Configuration for forest training.
///
/// Construct via [`TrainConfig::new`], then chain `with_*` methods. Setters do
/// not validate; [`TrainConfig::validate`] runs before every training call.
///
/// # Defaults
///
/// | Parameter              | Default        |
/// |------------------------|----------------|
/// | `min_samples_per_node` | 2              |
/// | `max_depth`            | 20             |
/// | `candidates_per_node`  | 2000           |
/// | `offset_range`         | `-60..=60`     |
/// | `threshold_range`      | `-0.5..=0.5`   |
/// | `spread`               | `Uniform`      |
/// | `seed`                 | 42             |
/// | `search_threads`       | 1              |
/// | `parallel_subtrees`    | `false`        |
///
/// Deserializing fills missing fields from these defaults (with one tree).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub(crate) number_of_trees: usize,
    pub(crate) min_samples_per_node: usize,
    pub(crate) max_depth: usize,
    pub(crate) candidates_per_node: usize,
    pub(crate) offset_range: RangeInclusive<i32>,
    pub(crate) threshold_range: RangeInclusive<f64>,
    pub(crate) spread: Spread,
    pub(crate) seed: u64,
    pub(crate) search_threads: usize,
    pub(crate) parallel_subtrees: bool,
}

impl TrainConfig {
    /// Create a new config for a forest of `number_of_trees` trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidTreeCount`] if `number_of_trees` is zero.
    pub fn new(number_of_trees: usize) -> Result<Self, RfError> {
        if number_of_trees == 0 {
            return Err(RfError::InvalidTreeCount { number_of_trees });
        }
        Ok(Self {
            number_of_trees,
            min_samples_per_node: 2,
            max_depth: 20,
            candidates_per_node: 2000,
            offset_range: -60..=60,
            threshold_range: -0.5..=0.5,
            spread: Spread::Uniform,
            seed: 42,
            search_threads: 1,
            parallel_subtrees: false,
        })
    }

    // --- Setters ---

    /// Set the number of trees.
    #[must_use]
    pub fn with_number_of_trees(mut self, number_of_trees: usize) -> Self {
        self.number_of_trees = number_of_trees;
        self
    }

    /// Set the smallest node size that may still be split.
    #[must_use]
    pub fn with_min_samples_per_node(mut self, min_samples_per_node: usize) -> Self {
        self.min_samples_per_node = min_samples_per_node;
        self
    }

    /// Set the maximum tree depth. The root is depth 0; nodes at `max_depth`
    /// are always leaves.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the number of random candidates evaluated per node.
    #[must_use]
    pub fn with_candidates_per_node(mut self, candidates_per_node: usize) -> Self {
        self.candidates_per_node = candidates_per_node;
        self
    }

    /// Set the inclusive range for each offset component.
    #[must_use]
    pub fn with_offset_range(mut self, offset_range: RangeInclusive<i32>) -> Self {
        self.offset_range = offset_range;
        self
    }

    /// Set the inclusive range for split thresholds.
    #[must_use]
    pub fn with_threshold_range(mut self, threshold_range: RangeInclusive<f64>) -> Self {
        self.threshold_range = threshold_range;
        self
    }

    /// Set how offsets and thresholds are drawn from their ranges.
    #[must_use]
    pub fn with_spread(mut self, spread: Spread) -> Self {
        self.spread = spread;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of rayon workers sharing each node's candidate budget.
    #[must_use]
    pub fn with_search_threads(mut self, search_threads: usize) -> Self {
        self.search_threads = search_threads;
        self
    }

    /// Build left and right subtrees concurrently.
    #[must_use]
    pub fn with_parallel_subtrees(mut self, parallel_subtrees: bool) -> Self {
        self.parallel_subtrees = parallel_subtrees;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn number_of_trees(&self) -> usize {
        self.number_of_trees
    }

    /// Return the smallest node size that may still be split.
    #[must_use]
    pub fn min_samples_per_node(&self) -> usize {
        self.min_samples_per_node
    }

    /// Return the maximum tree depth.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Return the candidate budget per node.
    #[must_use]
    pub fn candidates_per_node(&self) -> usize {
        self.candidates_per_node
    }

    /// Return the offset range.
    #[must_use]
    pub fn offset_range(&self) -> RangeInclusive<i32> {
        self.offset_range.clone()
    }

    /// Return the threshold range.
    #[must_use]
    pub fn threshold_range(&self) -> RangeInclusive<f64> {
        self.threshold_range.clone()
    }

    /// Return the draw spread.
    #[must_use]
    pub fn spread(&self) -> Spread {
        self.spread
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the number of search workers per node.
    #[must_use]
    pub fn search_threads(&self) -> usize {
        self.search_threads
    }

    /// Return whether subtrees are built concurrently.
    #[must_use]
    pub fn parallel_subtrees(&self) -> bool {
        self.parallel_subtrees
    }

    /// Check every parameter.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::InvalidTreeCount`] | `number_of_trees` is zero |
    /// | [`RfError::InvalidMinSamples`] | `min_samples_per_node` is zero |
    /// | [`RfError::InvalidCandidateCount`] | `candidates_per_node` is zero |
    /// | [`RfError::InvalidThreadCount`] | `search_threads` is zero |
    /// | [`RfError::InvalidOffsetRange`] | offset range is empty |
    /// | [`RfError::InvalidThresholdRange`] | threshold range is empty or not finite |
    pub fn validate(&self) -> Result<(), RfError> {
        if self.number_of_trees == 0 {
            return Err(RfError::InvalidTreeCount {
                number_of_trees: self.number_of_trees,
            });
        }
        if self.min_samples_per_node == 0 {
            return Err(RfError::InvalidMinSamples {
                min_samples: self.min_samples_per_node,
            });
        }
        if self.candidates_per_node == 0 {
            return Err(RfError::InvalidCandidateCount {
                candidates: self.candidates_per_node,
            });
        }
        if self.search_threads == 0 {
            return Err(RfError::InvalidThreadCount {
                threads: self.search_threads,
            });
        }
        self.candidate_sampler().map(|_| ())
    }

    /// Build the candidate sampler for these ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidOffsetRange`] or
    /// [`RfError::InvalidThresholdRange`] for unusable ranges.
    pub fn candidate_sampler(&self) -> Result<CandidateSampler, RfError> {
        CandidateSampler::new(
            self.offset_range.clone(),
            self.threshold_range.clone(),
            self.spread,
        )
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            number_of_trees: 1,
            min_samples_per_node: 2,
            max_depth: 20,
            candidates_per_node: 2000,
            offset_range: -60..=60,
            threshold_range: -0.5..=0.5,
            spread: Spread::Uniform,
            seed: 42,
            search_threads: 1,
            parallel_subtrees: false,
        }
    }
}
