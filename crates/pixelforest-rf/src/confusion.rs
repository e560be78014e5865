//! Confusion matrix and per-label classification metrics.

use std::fmt;

use crate::error::RfError;
use crate::label::Label;

/// Confusion counts over dense label ids.
///
/// Entry `rows[truth][predicted]` counts samples with true label `truth`
/// that were predicted as `predicted`. Samples for which no label could be
/// predicted are counted separately and never appear as correct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    rows: Vec<Vec<usize>>,
    unpredicted: Vec<usize>,
}

/// Per-label precision, recall, and F1 score.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMetrics {
    /// The label these metrics describe.
    pub label: Label,
    /// TP / (TP + FP). 0.0 if the label was never predicted.
    pub precision: f64,
    /// TP / support. 0.0 if the label never occurs.
    pub recall: f64,
    /// Harmonic mean of precision and recall. 0.0 if both are zero.
    pub f1: f64,
    /// Number of samples whose true label is `label`.
    pub support: usize,
}

impl ConfusionMatrix {
    /// An all-zero matrix for labels `0..label_count`.
    #[must_use]
    pub fn new(label_count: usize) -> Self {
        Self {
            rows: vec![vec![0; label_count]; label_count],
            unpredicted: vec![0; label_count],
        }
    }

    /// Build a matrix from parallel slices of true and predicted labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | zero labels provided |
    /// | [`RfError::LabelOutOfRange`] | a label id is `>= label_count` |
    pub fn from_labels(
        truth: &[Label],
        predicted: &[Label],
        label_count: usize,
    ) -> Result<Self, RfError> {
        if truth.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        let mut matrix = Self::new(label_count);
        for (&t, &p) in truth.iter().zip(predicted) {
            matrix.record(t, Some(p))?;
        }
        Ok(matrix)
    }

    /// Count one sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::LabelOutOfRange`] if either label id is
    /// `>= label_count`.
    pub fn record(&mut self, truth: Label, predicted: Option<Label>) -> Result<(), RfError> {
        let label_count = self.label_count();
        let out_of_range = |label: Label| RfError::LabelOutOfRange {
            label: label.id(),
            label_count,
        };
        let row = self.rows.get_mut(truth.index()).ok_or(out_of_range(truth))?;
        match predicted {
            Some(p) => *row.get_mut(p.index()).ok_or(out_of_range(p))? += 1,
            None => self.unpredicted[truth.index()] += 1,
        }
        Ok(())
    }

    /// Number of counted samples.
    #[must_use]
    pub fn total(&self) -> usize {
        self.rows.iter().flatten().sum::<usize>() + self.unpredicted.iter().sum::<usize>()
    }

    /// Number of samples whose prediction matched the truth.
    #[must_use]
    pub fn correct(&self) -> usize {
        self.rows.iter().enumerate().map(|(i, row)| row[i]).sum()
    }

    /// Proportion of correct predictions; 0.0 for an empty matrix.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.correct() as f64 / total as f64,
        }
    }

    /// Per-label precision, recall, F1, and support, in label order.
    #[must_use]
    pub fn label_metrics(&self) -> Vec<LabelMetrics> {
        (0..self.label_count())
            .map(|c| {
                let tp = self.rows[c][c];
                let predicted_as_c: usize = self.rows.iter().map(|row| row[c]).sum();
                let support = self.rows[c].iter().sum::<usize>() + self.unpredicted[c];
                let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
                let precision = ratio(tp, predicted_as_c);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                LabelMetrics {
                    label: Label::new(c as u32),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Matrix rows, indexed `[truth][predicted]`.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    /// Samples of each true label that received no prediction.
    #[must_use]
    pub fn unpredicted(&self) -> &[usize] {
        &self.unpredicted
    }

    /// Number of labels covered.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.rows.len()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.label_count() {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f, "     none")?;
        for (i, row) in self.rows.iter().enumerate() {
            write!(f, "true_{i:>3}")?;
            for val in row {
                write!(f, " {val:>8}")?;
            }
            writeln!(f, " {:>8}", self.unpredicted[i])?;
        }
        Ok(())
    }
}
