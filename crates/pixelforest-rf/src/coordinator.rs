//! Distributed training: one coordinator and any number of workers.
//!
//! Every participant holds an identical replica of the training data and
//! draws the same batch from it, so no samples cross a link. For each node
//! the coordinator announces the batch range and a node seed; every
//! participant searches its share of the candidate budget; the coordinator
//! reduces the proposals (its own first, then workers by rank) and
//! broadcasts the winner, which every participant applies to its own copy.
//!
//! With `P` participants and `T` search threads each, the trees are the
//! ones a local build with `P * T` threads produces whenever the candidate
//! budget is a multiple of `P * T`.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument, trace};

use crate::builder::{NodeSeeds, partition, stop_reason};
use crate::candidate::ScoredCandidate;
use crate::config::TrainConfig;
use crate::distribution::LabelCounts;
use crate::error::RfError;
use crate::forest::{Forest, label_span, tree_seeds};
use crate::link::{Link, ToCoordinator, ToWorker};
use crate::node::Node;
use crate::sample::{Sample, TrainSet};
use crate::search::{SplitSearch, reduce_best};
use crate::tree::Tree;

/// Rank of the coordinator. Workers are ranked `1..=n_workers`.
pub const COORDINATOR_RANK: usize = 0;

/// Drives tree induction across a set of worker links.
#[derive(Debug)]
pub struct Coordinator<L> {
    config: TrainConfig,
    search: SplitSearch,
    workers: Vec<L>,
}

impl<L: Link<ToWorker, ToCoordinator>> Coordinator<L> {
    /// Create a coordinator; `workers[i]` must lead to the worker of rank `i + 1`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`TrainConfig::validate`].
    pub fn new(config: &TrainConfig, workers: Vec<L>) -> Result<Self, RfError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            search: SplitSearch::from_config(config)?,
            workers,
        })
    }

    /// Number of participants, the coordinator included.
    #[must_use]
    pub fn participants(&self) -> usize {
        self.workers.len() + 1
    }

    /// Train a forest together with the workers, then shut them down.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | a batch draw returns no samples |
    /// | [`RfError::ReplicaMismatch`] | a worker drew a batch of a different size |
    /// | [`RfError::LinkClosed`] / [`RfError::LinkIo`] | a worker link failed |
    /// | [`RfError::ProtocolViolation`] | a worker replied out of order |
    #[instrument(skip_all, fields(
        n_trees = self.config.number_of_trees(),
        participants = self.participants()
    ))]
    pub fn train<S: Sample>(&mut self, train_set: &mut dyn TrainSet<S>) -> Result<Forest, RfError> {
        let mut trees = Vec::with_capacity(self.config.number_of_trees());
        let mut label_count = 0;

        for (tree_index, seeds) in tree_seeds(self.config.seed(), self.config.number_of_trees())
            .into_iter()
            .enumerate()
        {
            self.broadcast(&ToWorker::BeginTree {
                tree_index,
                batch_seed: seeds.batch,
            })?;
            let mut batch = train_set.sample(&mut ChaCha8Rng::seed_from_u64(seeds.batch));
            self.await_ready(batch.len())?;
            if batch.is_empty() {
                return Err(RfError::EmptyDataset);
            }
            label_count = label_count.max(label_span(&batch));

            let root = self.build_node(&mut batch, 0, 0, seeds.root)?;
            let tree = Tree::new(root);
            debug!(tree_index, n_nodes = tree.n_nodes(), "distributed tree built");
            trees.push(tree);
            self.broadcast(&ToWorker::TreeDone)?;
        }

        self.broadcast(&ToWorker::Shutdown)?;
        info!(n_trees = trees.len(), "distributed training complete");
        Ok(Forest::from_trees(trees, label_count))
    }

    fn broadcast(&mut self, message: &ToWorker) -> Result<(), RfError> {
        for link in &mut self.workers {
            link.send(message.clone())?;
        }
        Ok(())
    }

    fn await_ready(&mut self, expected: usize) -> Result<(), RfError> {
        for link in &mut self.workers {
            match link.recv()? {
                ToCoordinator::Ready { n_samples } if n_samples == expected => {}
                ToCoordinator::Ready { n_samples } => {
                    return Err(RfError::ReplicaMismatch {
                        rank: link.peer(),
                        expected,
                        found: n_samples,
                    });
                }
                other => {
                    return Err(RfError::ProtocolViolation {
                        rank: COORDINATOR_RANK,
                        reason: format!("expected Ready from {}, got {other:?}", link.peer()),
                    });
                }
            }
        }
        Ok(())
    }

    fn gather_proposals(&mut self) -> Result<Vec<Option<ScoredCandidate>>, RfError> {
        let mut proposals = Vec::with_capacity(self.workers.len());
        for link in &mut self.workers {
            match link.recv()? {
                ToCoordinator::Proposal { best } => proposals.push(best),
                other => {
                    return Err(RfError::ProtocolViolation {
                        rank: COORDINATOR_RANK,
                        reason: format!("expected Proposal from {}, got {other:?}", link.peer()),
                    });
                }
            }
        }
        Ok(proposals)
    }

    /// Grow the node stored at `samples`, which starts at batch position `start`.
    fn build_node<S: Sample>(
        &mut self,
        samples: &mut [S],
        start: usize,
        depth: usize,
        seed: u64,
    ) -> Result<Node, RfError> {
        let counts = LabelCounts::of_samples(samples);
        if stop_reason(&counts, depth, &self.config).is_some() {
            return counts.to_distribution().map(Node::leaf);
        }

        let seeds = NodeSeeds::derive(seed);
        self.broadcast(&ToWorker::Search {
            start,
            end: start + samples.len(),
            node_seed: seeds.search,
        })?;
        let own = self
            .search
            .best_in_share(samples, seeds.search, COORDINATOR_RANK, self.participants());
        let remote = self.gather_proposals()?;
        let best = reduce_best(std::iter::once(own).chain(remote));
        self.broadcast(&ToWorker::Apply { best })?;

        let Some(best) = best else {
            return counts.to_distribution().map(Node::leaf);
        };
        let n_left = partition(samples, &best.candidate);
        if n_left == 0 || n_left == samples.len() {
            return counts.to_distribution().map(Node::leaf);
        }
        trace!(depth, start, n_left, gain = best.gain, "distributed split");

        let (left, right) = samples.split_at_mut(n_left);
        let left = self.build_node(left, start, depth + 1, seeds.left)?;
        let right = self.build_node(right, start + n_left, depth + 1, seeds.right)?;
        Ok(Node::split(best.candidate, left, right))
    }
}

/// A worker: follows coordinator instructions over its own replica.
#[derive(Debug)]
pub struct Worker<S, T, L> {
    rank: usize,
    participants: usize,
    search: SplitSearch,
    train_set: T,
    link: L,
    batch: Vec<S>,
}

impl<S, T, L> Worker<S, T, L>
where
    S: Sample,
    T: TrainSet<S>,
    L: Link<ToCoordinator, ToWorker>,
{
    /// Create worker `rank` of `participants`, searching with `config`'s
    /// candidate settings.
    ///
    /// # Errors
    ///
    /// Returns any error from [`TrainConfig::validate`].
    pub fn new(
        rank: usize,
        participants: usize,
        config: &TrainConfig,
        train_set: T,
        link: L,
    ) -> Result<Self, RfError> {
        config.validate()?;
        Ok(Self {
            rank,
            participants,
            search: SplitSearch::from_config(config)?,
            train_set,
            link,
            batch: Vec::new(),
        })
    }

    /// The batch of the last tree, in its final partitioned order.
    #[must_use]
    pub fn batch(&self) -> &[S] {
        &self.batch
    }

    fn violation(&self, reason: String) -> RfError {
        RfError::ProtocolViolation {
            rank: self.rank,
            reason,
        }
    }

    /// Serve the coordinator until it sends `Shutdown`. Returns the number of
    /// trees the worker took part in.
    ///
    /// # Errors
    ///
    /// Returns link errors, or [`RfError::ProtocolViolation`] when a message
    /// arrives out of order or names a range outside the batch.
    #[instrument(skip_all, fields(rank = self.rank))]
    pub fn run(&mut self) -> Result<usize, RfError> {
        let mut n_trees = 0;
        loop {
            match self.link.recv()? {
                ToWorker::BeginTree {
                    tree_index,
                    batch_seed,
                } => {
                    self.batch = self
                        .train_set
                        .sample(&mut ChaCha8Rng::seed_from_u64(batch_seed));
                    debug!(tree_index, n_samples = self.batch.len(), "replica batch drawn");
                    self.link.send(ToCoordinator::Ready {
                        n_samples: self.batch.len(),
                    })?;
                }
                ToWorker::Search {
                    start,
                    end,
                    node_seed,
                } => self.search_node(start, end, node_seed)?,
                ToWorker::TreeDone => n_trees += 1,
                ToWorker::Shutdown => {
                    debug!(n_trees, "worker shut down");
                    return Ok(n_trees);
                }
                ToWorker::Apply { .. } => {
                    return Err(self.violation("Apply without a preceding Search".into()));
                }
            }
        }
    }

    fn search_node(&mut self, start: usize, end: usize, node_seed: u64) -> Result<(), RfError> {
        if start > end || end > self.batch.len() {
            return Err(self.violation(format!(
                "range {start}..{end} outside batch of {}",
                self.batch.len()
            )));
        }
        let best = self.search.best_in_share(
            &self.batch[start..end],
            node_seed,
            self.rank,
            self.participants,
        );
        self.link.send(ToCoordinator::Proposal { best })?;

        match self.link.recv()? {
            ToWorker::Apply { best: Some(best) } => {
                partition(&mut self.batch[start..end], &best.candidate);
                Ok(())
            }
            ToWorker::Apply { best: None } => Ok(()),
            other => Err(self.violation(format!("expected Apply, got {other:?}"))),
        }
    }
}
