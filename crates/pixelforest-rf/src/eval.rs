//! Error-rate evaluation of trees and forests over a test set.

use rayon::prelude::*;
use tracing::{info, instrument};

use crate::confusion::ConfusionMatrix;
use crate::distribution::LabelDistribution;
use crate::error::RfError;
use crate::forest::Forest;
use crate::label::Label;
use crate::sample::{Sample, TrainSet};
use crate::tree::Tree;

/// Anything that maps a sample to a label distribution.
pub trait Classifier: Sync {
    /// Label distribution for `sample`.
    fn distribution<S: Sample>(&self, sample: &S) -> LabelDistribution;

    /// Most probable label for `sample`, if any.
    fn predict<S: Sample>(&self, sample: &S) -> Option<Label> {
        self.distribution(sample).predicted().map(|(label, _)| label)
    }
}

impl Classifier for Tree {
    fn distribution<S: Sample>(&self, sample: &S) -> LabelDistribution {
        self.classify(sample).clone()
    }
}

impl Classifier for Forest {
    fn distribution<S: Sample>(&self, sample: &S) -> LabelDistribution {
        self.classify(sample)
    }

    fn predict<S: Sample>(&self, sample: &S) -> Option<Label> {
        Forest::predict(self, sample)
    }
}

/// Fraction of samples in `test_set` whose predicted label differs from
/// the true label, in one pass over its cursor.
///
/// A sample with no prediction counts as a mismatch.
///
/// # Errors
///
/// Returns [`RfError::EmptyDataset`] if the cursor yields nothing.
pub fn evaluate<C, S>(classifier: &C, test_set: &dyn TrainSet<S>) -> Result<f64, RfError>
where
    C: Classifier + ?Sized,
    S: Sample,
{
    let mut cursor = test_set.iter();
    let (mut total, mut mismatches) = (0usize, 0usize);
    while let Some((sample, truth)) = cursor.value() {
        total += 1;
        mismatches += usize::from(classifier.predict(&sample) != Some(truth));
        cursor.next();
    }
    if total == 0 {
        return Err(RfError::EmptyDataset);
    }
    Ok(mismatches as f64 / total as f64)
}

/// Outcome of an [`Evaluation`] run.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// Mismatches over evaluated samples.
    pub error_rate: f64,
    /// Samples that were classified.
    pub n_evaluated: usize,
    /// Background samples left out by [`Evaluation::with_skip_background`].
    pub n_skipped: usize,
    /// Truth against prediction over the evaluated samples.
    pub confusion: ConfusionMatrix,
}

/// Evaluation settings.
///
/// Construct via [`Evaluation::new`], then chain `with_skip_background` if
/// desired.
///
/// # Defaults
///
/// | Parameter | Default |
/// |---|---|
/// | `skip_background` | `false` |
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    skip_background: bool,
}

impl Evaluation {
    /// Create settings that evaluate every sample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave out samples whose true label is [`Label::BACKGROUND`].
    #[must_use]
    pub fn with_skip_background(mut self, skip_background: bool) -> Self {
        self.skip_background = skip_background;
        self
    }

    /// Classify every sample of `test_set` in parallel and tally the results.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | no sample is left to evaluate |
    #[instrument(skip_all, fields(skip_background = self.skip_background))]
    pub fn run<C, S>(
        &self,
        classifier: &C,
        test_set: &dyn TrainSet<S>,
    ) -> Result<EvaluationReport, RfError>
    where
        C: Classifier + ?Sized,
        S: Sample,
    {
        let mut samples = Vec::new();
        let mut n_skipped = 0;
        let mut cursor = test_set.iter();
        while let Some((sample, truth)) = cursor.value() {
            if self.skip_background && truth.is_background() {
                n_skipped += 1;
            } else {
                samples.push((sample, truth));
            }
            cursor.next();
        }
        if samples.is_empty() {
            return Err(RfError::EmptyDataset);
        }

        let outcomes: Vec<(Label, Option<Label>)> = samples
            .par_iter()
            .map(|(sample, truth)| (*truth, classifier.predict(sample)))
            .collect();

        let label_count = outcomes
            .iter()
            .flat_map(|&(truth, predicted)| std::iter::once(truth).chain(predicted))
            .map(|label| label.index() + 1)
            .max()
            .unwrap_or(0);
        let mut confusion = ConfusionMatrix::new(label_count);
        for &(truth, predicted) in &outcomes {
            confusion.record(truth, predicted)?;
        }

        let n_evaluated = outcomes.len();
        let error_rate = (n_evaluated - confusion.correct()) as f64 / n_evaluated as f64;
        info!(n_evaluated, n_skipped, error_rate, "evaluation complete");
        Ok(EvaluationReport {
            error_rate,
            n_evaluated,
            n_skipped,
            confusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::SplitCandidate;
    use crate::node::Node;
    use crate::sample::testing::ScalarSample;
    use crate::sample::{InMemorySet, Offset};

    /// Predicts label 1 below value 5 (feature `value - 1 < 4`), else label 2.
    fn threshold_tree() -> Tree {
        let leaf = |id: u32| Node::leaf(LabelDistribution::from_labels([Label::new(id)]).unwrap());
        let split = SplitCandidate::new(Offset::new(1, 0), Offset::ORIGIN, 4.0);
        Tree::new(Node::split(split, leaf(1), leaf(2)))
    }

    fn test_set() -> InMemorySet<ScalarSample> {
        InMemorySet::new(vec![
            ScalarSample::new(1.0, 1),
            ScalarSample::new(2.0, 1),
            ScalarSample::new(7.0, 2),
            ScalarSample::new(8.0, 1),
            ScalarSample::new(3.0, 0),
        ])
    }

    #[test]
    fn error_rate_counts_mismatches() {
        let rate = evaluate(&threshold_tree(), &test_set()).unwrap();
        assert!((rate - 2.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn forest_and_tree_agree_for_single_tree() {
        let tree = threshold_tree();
        let forest = Forest::from_trees(vec![tree.clone()], 3);
        assert_eq!(
            evaluate(&tree, &test_set()).unwrap(),
            evaluate(&forest, &test_set()).unwrap()
        );
    }

    #[test]
    fn empty_forest_mispredicts_everything() {
        let forest = Forest::from_trees(Vec::new(), 0);
        assert_eq!(evaluate(&forest, &test_set()).unwrap(), 1.0);
    }

    #[test]
    fn empty_test_set_errors() {
        let empty: InMemorySet<ScalarSample> = InMemorySet::new(Vec::new());
        assert!(matches!(
            evaluate(&threshold_tree(), &empty),
            Err(RfError::EmptyDataset)
        ));
    }

    #[test]
    fn report_skips_background() {
        let report = Evaluation::new()
            .with_skip_background(true)
            .run(&threshold_tree(), &test_set())
            .unwrap();
        assert_eq!(report.n_evaluated, 4);
        assert_eq!(report.n_skipped, 1);
        assert!((report.error_rate - 0.25).abs() < 1e-12);
        assert_eq!(report.confusion.as_rows()[1], vec![0, 2, 1]);
    }

    #[test]
    fn report_matches_plain_evaluation() {
        let report = Evaluation::new().run(&threshold_tree(), &test_set()).unwrap();
        assert_eq!(report.n_skipped, 0);
        assert_eq!(report.confusion.total(), 5);
        assert_eq!(
            report.error_rate,
            evaluate(&threshold_tree(), &test_set()).unwrap()
        );
    }

    #[test]
    fn only_background_left_is_empty() {
        let set = InMemorySet::new(vec![ScalarSample::new(1.0, 0)]);
        let err = Evaluation::new()
            .with_skip_background(true)
            .run(&threshold_tree(), &set)
            .unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }
}
