//! Recursive tree induction.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument, trace};

use crate::candidate::{Side, SplitCandidate};
use crate::config::TrainConfig;
use crate::distribution::LabelCounts;
use crate::error::RfError;
use crate::node::Node;
use crate::sample::Sample;
use crate::search::SplitSearch;
use crate::tree::Tree;

/// Why a node became a leaf before any search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    MaxDepth,
    TooFewSamples,
    Pure,
}

/// Check the stopping rules that need no candidate search.
pub(crate) fn stop_reason(
    counts: &LabelCounts,
    depth: usize,
    config: &TrainConfig,
) -> Option<StopReason> {
    if depth >= config.max_depth() {
        Some(StopReason::MaxDepth)
    } else if counts.total() < config.min_samples_per_node() {
        Some(StopReason::TooFewSamples)
    } else if counts.is_pure() {
        Some(StopReason::Pure)
    } else {
        None
    }
}

/// Seeds for one node: its own search and each child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeSeeds {
    pub(crate) search: u64,
    pub(crate) left: u64,
    pub(crate) right: u64,
}

impl NodeSeeds {
    pub(crate) fn derive(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            search: rng.r#gen(),
            left: rng.r#gen(),
            right: rng.r#gen(),
        }
    }
}

/// Partition `samples` in place so every sample routed [`Side::Left`]
/// precedes every sample routed [`Side::Right`]. Returns the left count.
pub fn partition<S: Sample>(samples: &mut [S], candidate: &SplitCandidate) -> usize {
    let mut i = 0;
    let mut j = samples.len();
    while i < j {
        if candidate.classify(&samples[i]) == Side::Left {
            i += 1;
        } else {
            j -= 1;
            samples.swap(i, j);
        }
    }
    i
}

/// Builds single trees from a batch of samples.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    config: TrainConfig,
    search: SplitSearch,
}

impl TreeBuilder {
    /// Create a builder for `config`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`TrainConfig::validate`].
    pub fn new(config: &TrainConfig) -> Result<Self, RfError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            search: SplitSearch::from_config(config)?,
        })
    }

    /// Grow a tree over `samples`, reordering them in place.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::EmptyDataset`] if `samples` is empty.
    #[instrument(skip_all, fields(n_samples = samples.len(), seed = seed))]
    pub fn build<S: Sample>(&self, samples: &mut [S], seed: u64) -> Result<Tree, RfError> {
        if samples.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        let root = self.build_node(samples, 0, seed)?;
        let tree = Tree::new(root);
        debug!(
            n_nodes = tree.n_nodes(),
            depth = tree.depth(),
            "tree built"
        );
        Ok(tree)
    }

    /// Grow the subtree for `samples` at `depth`.
    ///
    /// The result depends only on the samples, their order, `depth` and `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::EmptySampleSet`] if `samples` is empty.
    pub fn build_node<S: Sample>(
        &self,
        samples: &mut [S],
        depth: usize,
        seed: u64,
    ) -> Result<Node, RfError> {
        let counts = LabelCounts::of_samples(samples);
        let make_leaf = |counts: &LabelCounts| counts.to_distribution().map(Node::leaf);

        if let Some(reason) = stop_reason(&counts, depth, &self.config) {
            trace!(depth, n_samples = counts.total(), ?reason, "leaf");
            return make_leaf(&counts);
        }

        let seeds = NodeSeeds::derive(seed);
        let Some(best) = self.search.best(samples, seeds.search) else {
            trace!(depth, n_samples = counts.total(), "leaf: no informative candidate");
            return make_leaf(&counts);
        };

        let n_left = partition(samples, &best.candidate);
        if n_left == 0 || n_left == samples.len() {
            return make_leaf(&counts);
        }
        trace!(depth, n_left, n_right = samples.len() - n_left, gain = best.gain, "split");

        let (left, right) = samples.split_at_mut(n_left);
        let (left, right) = if self.config.parallel_subtrees() {
            rayon::join(
                || self.build_node(left, depth + 1, seeds.left),
                || self.build_node(right, depth + 1, seeds.right),
            )
        } else {
            (
                self.build_node(left, depth + 1, seeds.left),
                self.build_node(right, depth + 1, seeds.right),
            )
        };
        Ok(Node::split(best.candidate, left?, right?))
    }
}
