//! Forest training and voting.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use crate::builder::TreeBuilder;
use crate::config::TrainConfig;
use crate::distribution::LabelDistribution;
use crate::error::RfError;
use crate::label::Label;
use crate::sample::{Sample, TrainSet};
use crate::tree::Tree;

/// Seeds for one tree: its batch draw and its root node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TreeSeeds {
    pub(crate) batch: u64,
    pub(crate) root: u64,
}

/// Derive per-tree seeds from the forest seed.
pub(crate) fn tree_seeds(seed: u64, number_of_trees: usize) -> Vec<TreeSeeds> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..number_of_trees)
        .map(|_| TreeSeeds {
            batch: rng.r#gen(),
            root: rng.r#gen(),
        })
        .collect()
}

/// Number of dense label ids needed to cover every label in `samples`.
pub(crate) fn label_span<S: Sample>(samples: &[S]) -> usize {
    samples
        .iter()
        .map(|s| s.true_label().index() + 1)
        .max()
        .unwrap_or(0)
}

/// An ensemble of trees whose leaf distributions are averaged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Forest {
    pub(crate) trees: Vec<Tree>,
    pub(crate) label_count: usize,
}

impl Forest {
    /// Assemble a forest from trained trees.
    ///
    /// `label_count` bounds the label ids the trees may predict; it fixes the
    /// width of leaf lines when the forest is written to disk.
    #[must_use]
    pub fn from_trees(trees: Vec<Tree>, label_count: usize) -> Self {
        Self { trees, label_count }
    }

    /// Train `config.number_of_trees()` trees, each on a fresh batch drawn
    /// from `train_set`.
    ///
    /// The validation set is accepted for interface compatibility and is not
    /// used; trees are never pruned.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | any config error | [`TrainConfig::validate`] fails |
    /// | [`RfError::EmptyDataset`] | a batch draw returns no samples |
    #[instrument(skip_all, fields(n_trees = config.number_of_trees(), seed = config.seed()))]
    pub fn train<S: Sample>(
        train_set: &mut dyn TrainSet<S>,
        validation_set: Option<&dyn TrainSet<S>>,
        config: &TrainConfig,
    ) -> Result<Self, RfError> {
        let builder = TreeBuilder::new(config)?;
        if validation_set.is_some() {
            debug!("validation set supplied; ignored");
        }

        let mut trees = Vec::with_capacity(config.number_of_trees());
        let mut label_count = 0;
        for (tree_index, seeds) in tree_seeds(config.seed(), config.number_of_trees())
            .into_iter()
            .enumerate()
        {
            let mut batch = train_set.sample(&mut ChaCha8Rng::seed_from_u64(seeds.batch));
            if batch.is_empty() {
                return Err(RfError::EmptyDataset);
            }
            label_count = label_count.max(label_span(&batch));
            debug!(tree_index, n_samples = batch.len(), "training tree");
            trees.push(builder.build(&mut batch, seeds.root)?);
        }

        info!(
            n_trees = trees.len(),
            n_nodes = trees.iter().map(Tree::n_nodes).sum::<usize>(),
            label_count,
            "forest training complete"
        );
        Ok(Self { trees, label_count })
    }

    /// Average the leaf distributions of every tree for `sample`.
    #[must_use]
    pub fn classify<S: Sample + ?Sized>(&self, sample: &S) -> LabelDistribution {
        let mut votes = LabelDistribution::empty();
        for tree in &self.trees {
            votes.combine(tree.classify(sample));
        }
        votes
    }

    /// Most probable label for `sample`, or `None` for an empty forest.
    #[must_use]
    pub fn predict<S: Sample + ?Sized>(&self, sample: &S) -> Option<Label> {
        self.classify(sample).predicted().map(|(label, _)| label)
    }

    /// The trees, in training order.
    #[must_use]
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of dense label ids this forest covers.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.label_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::InMemorySet;
    use crate::sample::testing::{ScalarSample, two_clusters};

    fn config(n_trees: usize) -> TrainConfig {
        TrainConfig::new(n_trees)
            .unwrap()
            .with_offset_range(-3..=3)
            .with_threshold_range(0.0..=20.0)
            .with_candidates_per_node(100)
    }

    #[test]
    fn separable_clusters_are_learned() {
        let mut set = InMemorySet::new(two_clusters(10));
        let forest = Forest::train::<ScalarSample>(&mut set, None, &config(5)).unwrap();
        assert_eq!(forest.n_trees(), 5);
        assert_eq!(forest.label_count(), 3);
        assert_eq!(forest.predict(&ScalarSample::new(0.5, 0)), Some(Label::new(1)));
        assert_eq!(forest.predict(&ScalarSample::new(10.5, 0)), Some(Label::new(2)));
    }

    #[test]
    fn single_tree_forest_matches_tree() {
        let mut set = InMemorySet::new(two_clusters(10));
        let forest = Forest::train::<ScalarSample>(&mut set, None, &config(1)).unwrap();
        let tree = &forest.trees()[0];
        for v in [0.0, 0.7, 5.0, 9.9, 10.3, 42.0] {
            let probe = ScalarSample::new(v, 0);
            let from_forest = forest.classify(&probe);
            let from_tree = tree.classify(&probe);
            for (label, p) in from_tree.iter() {
                assert!((from_forest.probability(label) - p).abs() < 1e-12);
            }
            assert_eq!(from_forest.len(), from_tree.len());
        }
    }

    #[test]
    fn same_seed_same_forest() {
        let samples = two_clusters(15);
        let a = Forest::train::<ScalarSample>(&mut InMemorySet::new(samples.clone()), None, &config(3)).unwrap();
        let b = Forest::train::<ScalarSample>(&mut InMemorySet::new(samples), None, &config(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn validation_set_is_ignored() {
        let samples = two_clusters(8);
        let validation = InMemorySet::new(vec![ScalarSample::new(3.0, 7)]);
        let with = Forest::train::<ScalarSample>(
            &mut InMemorySet::new(samples.clone()),
            Some(&validation as &dyn TrainSet<ScalarSample>),
            &config(2),
        )
        .unwrap();
        let without = Forest::train::<ScalarSample>(&mut InMemorySet::new(samples), None, &config(2)).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn single_leaf_trees_when_depth_is_zero() {
        let mut set = InMemorySet::new(two_clusters(10));
        let cfg = config(4).with_min_samples_per_node(1).with_max_depth(0);
        let forest = Forest::train::<ScalarSample>(&mut set, None, &cfg).unwrap();
        assert!(forest.trees().iter().all(|t| t.root().is_leaf()));
    }

    #[test]
    fn empty_train_set_errors() {
        let mut set: InMemorySet<ScalarSample> = InMemorySet::new(Vec::new());
        let err = Forest::train::<ScalarSample>(&mut set, None, &config(2)).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }

    #[test]
    fn invalid_config_errors() {
        let mut set = InMemorySet::new(two_clusters(3));
        let err = Forest::train::<ScalarSample>(&mut set, None, &config(1).with_candidates_per_node(0)).unwrap_err();
        assert!(matches!(err, RfError::InvalidCandidateCount { .. }));
    }

    #[test]
    fn empty_forest_predicts_nothing() {
        let forest = Forest::from_trees(Vec::new(), 0);
        assert_eq!(forest.predict(&ScalarSample::new(1.0, 1)), None);
        assert!(forest.classify(&ScalarSample::new(1.0, 1)).is_empty());
    }
}
