//! Label counts, label probability distributions and entropy.

use std::collections::BTreeMap;

use crate::error::RfError;
use crate::label::Label;
use crate::sample::Sample;

/// Largest deviation from one that a probability sum may show without being renormalized.
const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// Per-label sample counts for one node or one side of a split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCounts {
    counts: BTreeMap<Label, usize>,
    total: usize,
}

impl LabelCounts {
    /// Create an empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally the true labels of `samples`.
    #[must_use]
    pub fn of_samples<S: Sample>(samples: &[S]) -> Self {
        let mut counts = Self::new();
        for s in samples {
            counts.add(s.true_label());
        }
        counts
    }

    /// Count one more sample with `label`.
    pub fn add(&mut self, label: Label) {
        *self.counts.entry(label).or_insert(0) += 1;
        self.total += 1;
    }

    /// Total number of samples counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of distinct labels seen.
    #[must_use]
    pub fn n_labels(&self) -> usize {
        self.counts.len()
    }

    /// Return `true` when at most one distinct label was counted.
    #[must_use]
    pub fn is_pure(&self) -> bool {
        self.counts.len() <= 1
    }

    /// Shannon entropy of the counted labels, in bits.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::EmptySampleSet`] when nothing was counted.
    pub fn entropy(&self) -> Result<f64, RfError> {
        if self.total == 0 {
            return Err(RfError::EmptySampleSet);
        }
        Ok(self.entropy_unchecked())
    }

    /// Entropy of a tally the caller knows to be non-empty.
    pub(crate) fn entropy_unchecked(&self) -> f64 {
        debug_assert!(self.total > 0, "entropy of an empty tally");
        let n = self.total as f64;
        self.counts
            .values()
            .map(|&c| c as f64 / n)
            .filter(|&p| p > 0.0)
            .map(|p| -p * p.log2())
            .sum()
    }

    /// Convert the tally into a probability distribution with a vote weight of one.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::EmptySampleSet`] when nothing was counted.
    pub fn to_distribution(&self) -> Result<LabelDistribution, RfError> {
        if self.total == 0 {
            return Err(RfError::EmptySampleSet);
        }
        let n = self.total as f64;
        Ok(LabelDistribution {
            probabilities: self
                .counts
                .iter()
                .map(|(&label, &c)| (label, c as f64 / n))
                .collect(),
            weight: 1.0,
        })
    }
}

/// A probability distribution over labels, as stored in a leaf or produced
/// by combining tree votes.
///
/// Each distribution carries the number of votes folded into it: a leaf
/// distribution has weight one, [`LabelDistribution::empty`] has weight zero.
/// [`combine`](LabelDistribution::combine) averages by weight, so folding any
/// number of leaf distributions into an empty one yields their plain mean.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct LabelDistribution {
    probabilities: BTreeMap<Label, f64>,
    weight: f64,
}

impl LabelDistribution {
    /// The distribution with no labels and no votes.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Relative frequencies of the true labels of `samples`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::EmptySampleSet`] when `samples` is empty.
    pub fn from_samples<S: Sample>(samples: &[S]) -> Result<Self, RfError> {
        LabelCounts::of_samples(samples).to_distribution()
    }

    /// Relative frequencies of `labels`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::EmptySampleSet`] when `labels` yields nothing.
    pub fn from_labels(labels: impl IntoIterator<Item = Label>) -> Result<Self, RfError> {
        let mut counts = LabelCounts::new();
        for label in labels {
            counts.add(label);
        }
        counts.to_distribution()
    }

    /// Build a leaf distribution from explicit probabilities.
    ///
    /// Zero entries are dropped. The rest are renormalized when their sum is
    /// off from one by more than rounding, so stored leaves reload unchanged.
    /// Returns `None` when no entry is positive.
    #[must_use]
    pub fn from_probabilities(entries: impl IntoIterator<Item = (Label, f64)>) -> Option<Self> {
        let probabilities: BTreeMap<Label, f64> =
            entries.into_iter().filter(|&(_, p)| p > 0.0).collect();
        let sum: f64 = probabilities.values().sum();
        if probabilities.is_empty() || !sum.is_finite() {
            return None;
        }
        let mut dist = Self {
            probabilities,
            weight: 1.0,
        };
        if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
            dist.probabilities.values_mut().for_each(|p| *p /= sum);
        }
        Some(dist)
    }

    /// Fold `other` into `self` as a weighted average and renormalize.
    ///
    /// Combining with an empty distribution leaves `self` unchanged.
    pub fn combine(&mut self, other: &LabelDistribution) {
        if other.probabilities.is_empty() || other.weight <= 0.0 {
            return;
        }
        let own = self.weight;
        self.probabilities.values_mut().for_each(|p| *p *= own);
        for (&label, &p) in &other.probabilities {
            *self.probabilities.entry(label).or_insert(0.0) += p * other.weight;
        }
        let mass: f64 = self.probabilities.values().sum();
        if mass > 0.0 {
            self.probabilities.values_mut().for_each(|p| *p /= mass);
        }
        self.weight += other.weight;
    }

    /// Shannon entropy in bits.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::EmptySampleSet`] for the empty distribution.
    pub fn entropy(&self) -> Result<f64, RfError> {
        if self.probabilities.is_empty() {
            return Err(RfError::EmptySampleSet);
        }
        Ok(self
            .probabilities
            .values()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.log2())
            .sum())
    }

    /// The most probable label and its probability.
    ///
    /// Ties go to the smallest label. `None` for the empty distribution.
    #[must_use]
    pub fn predicted(&self) -> Option<(Label, f64)> {
        let mut best: Option<(Label, f64)> = None;
        for (&label, &p) in &self.probabilities {
            if best.is_none_or(|(_, best_p)| p > best_p) {
                best = Some((label, p));
            }
        }
        best
    }

    /// Probability of `label`; zero when absent.
    #[must_use]
    pub fn probability(&self, label: Label) -> f64 {
        self.probabilities.get(&label).copied().unwrap_or(0.0)
    }

    /// Iterate `(label, probability)` pairs in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = (Label, f64)> + '_ {
        self.probabilities.iter().map(|(&l, &p)| (l, p))
    }

    /// Number of labels with non-zero probability.
    #[must_use]
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    /// Return `true` if no label has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Number of votes folded into this distribution.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Sum of all probabilities: one when non-empty, zero otherwise.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.probabilities.values().sum()
    }

    /// Dense probability vector indexed by label id.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::LabelOutOfRange`] if any label id is `>= label_count`.
    pub fn to_dense(&self, label_count: usize) -> Result<Vec<f64>, RfError> {
        let mut dense = vec![0.0; label_count];
        for (&label, &p) in &self.probabilities {
            let slot = dense
                .get_mut(label.index())
                .ok_or(RfError::LabelOutOfRange {
                    label: label.id(),
                    label_count,
                })?;
            *slot = p;
        }
        Ok(dense)
    }
}
