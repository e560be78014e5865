//! Sample access: the narrow interface between the engine and a dataset.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::label::Label;

/// A pixel displacement relative to a sample's anchor position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    serde::Serialize, serde::Deserialize,
)]
pub struct Offset {
    /// Column displacement.
    pub dx: i32,
    /// Row displacement.
    pub dy: i32,
}

impl Offset {
    /// The anchor position itself.
    pub const ORIGIN: Offset = Offset { dx: 0, dy: 0 };

    /// Create an offset.
    #[must_use]
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// Divide both components by `depth` and round to whole pixels.
    ///
    /// `depth` must be finite and positive.
    #[must_use]
    pub fn scaled_by_depth(self, depth: f64) -> Self {
        let scale = |v: i32| {
            let scaled = (f64::from(v) / depth).round();
            scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
        };
        Self {
            dx: scale(self.dx),
            dy: scale(self.dy),
        }
    }
}

/// A classifiable unit: one pixel plus enough context to read its neighbourhood.
pub trait Sample: Send + Sync {
    /// Value of the underlying data at `offset` from the anchor.
    ///
    /// Must be total: positions outside the data map to one fixed sentinel.
    fn feature_at(&self, offset: Offset) -> f64;

    /// Ground-truth label of the anchor.
    fn true_label(&self) -> Label;
}

/// Forward-only cursor over labeled samples, used for evaluation passes.
pub trait SampleCursor<S> {
    /// Current `(sample, label)` pair, or `None` once exhausted.
    fn value(&self) -> Option<(S, Label)>;

    /// Advance to the next pair. No-op once exhausted.
    fn next(&mut self);
}

/// Source of training and evaluation samples.
pub trait TrainSet<S: Sample> {
    /// Draw a fresh training batch.
    ///
    /// Draws must depend only on the dataset and `rng`, so that replicas
    /// seeded identically produce identical batches.
    fn sample(&mut self, rng: &mut ChaCha8Rng) -> Vec<S>;

    /// Start a single pass over every labeled sample.
    fn iter(&self) -> Box<dyn SampleCursor<S> + '_>;
}

/// A train set over an explicit list of samples.
///
/// Every draw returns all samples in a shuffled order.
#[derive(Debug, Clone)]
pub struct InMemorySet<S> {
    samples: Vec<S>,
}

impl<S: Sample + Clone> InMemorySet<S> {
    /// Wrap a list of samples.
    #[must_use]
    pub fn new(samples: Vec<S>) -> Self {
        Self { samples }
    }

    /// Number of samples held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Return `true` if the set holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<S: Sample + Clone> TrainSet<S> for InMemorySet<S> {
    fn sample(&mut self, rng: &mut ChaCha8Rng) -> Vec<S> {
        let mut batch = self.samples.clone();
        batch.shuffle(rng);
        batch
    }

    fn iter(&self) -> Box<dyn SampleCursor<S> + '_> {
        Box::new(SliceCursor {
            samples: &self.samples,
            position: 0,
        })
    }
}

struct SliceCursor<'a, S> {
    samples: &'a [S],
    position: usize,
}

impl<S: Sample + Clone> SampleCursor<S> for SliceCursor<'_, S> {
    fn value(&self) -> Option<(S, Label)> {
        self.samples
            .get(self.position)
            .map(|s| (s.clone(), s.true_label()))
    }

    fn next(&mut self) {
        if self.position < self.samples.len() {
            self.position += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Synthetic samples with a directly readable feature table.

    use super::{Offset, Sample};
    use crate::label::Label;

    /// A sample whose `feature_at` reads a fixed value per x-offset sign.
    ///
    /// `feature_at(ORIGIN)` returns 1.0 so depth normalization is the identity.
    /// Offsets with `dx > 0` read `value`, all others read 0.0.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct ScalarSample {
        pub(crate) value: f64,
        pub(crate) label: Label,
    }

    impl ScalarSample {
        pub(crate) fn new(value: f64, label: u32) -> Self {
            Self {
                value,
                label: Label::new(label),
            }
        }
    }

    impl Sample for ScalarSample {
        fn feature_at(&self, offset: Offset) -> f64 {
            if offset == Offset::ORIGIN {
                1.0
            } else if offset.dx > 0 {
                self.value
            } else {
                0.0
            }
        }

        fn true_label(&self) -> Label {
            self.label
        }
    }

    /// Two well-separated clusters: label 1 at values 0..n, label 2 at 10..10+n.
    pub(crate) fn two_clusters(n: usize) -> Vec<ScalarSample> {
        let mut samples = Vec::with_capacity(2 * n);
        for i in 0..n {
            samples.push(ScalarSample::new(i as f64 * 0.1, 1));
        }
        for i in 0..n {
            samples.push(ScalarSample::new(10.0 + i as f64 * 0.1, 2));
        }
        samples
    }
}
