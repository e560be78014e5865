//! Randomized depth-difference split candidates.
//!
//! A candidate compares the depth at two offsets around a pixel. Offsets are
//! divided by the pixel's own depth before use, so a candidate probes the
//! same physical neighbourhood whether the object is near or far.

use std::ops::RangeInclusive;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::distribution::LabelCounts;
use crate::error::RfError;
use crate::sample::{Offset, Sample};

/// Smallest depth used to normalize offsets.
///
/// Anchor depths below this (or not finite) are clamped to it, which keeps
/// the scaled offsets bounded.
pub const MIN_NORMALIZATION_DEPTH: f64 = 0.1;

/// Which child a sample is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Feature value strictly below the threshold.
    Left,
    /// Feature value at or above the threshold.
    Right,
}

/// How offsets and thresholds are drawn from their configured ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Spread {
    /// Every value in the range is equally likely.
    #[default]
    Uniform,
    /// Gaussian centred on the range midpoint with a standard deviation of a
    /// quarter of the range width, clamped into the range.
    Normal,
}

#[derive(Debug, Clone, Copy)]
enum Draw {
    Uniform,
    Normal {
        offset: Normal<f64>,
        threshold: Normal<f64>,
    },
}

/// Draws split candidates from fixed offset and threshold ranges.
#[derive(Debug, Clone)]
pub struct CandidateSampler {
    offsets: RangeInclusive<i32>,
    thresholds: RangeInclusive<f64>,
    draw: Draw,
}

impl CandidateSampler {
    /// Create a sampler over inclusive ranges.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::InvalidOffsetRange`] | `offsets` is empty |
    /// | [`RfError::InvalidThresholdRange`] | `thresholds` is empty or has a non-finite bound |
    pub fn new(
        offsets: RangeInclusive<i32>,
        thresholds: RangeInclusive<f64>,
        spread: Spread,
    ) -> Result<Self, RfError> {
        let (omin, omax) = (*offsets.start(), *offsets.end());
        if omin > omax {
            return Err(RfError::InvalidOffsetRange {
                min: omin,
                max: omax,
            });
        }
        let (tmin, tmax) = (*thresholds.start(), *thresholds.end());
        let bad_thresholds = || RfError::InvalidThresholdRange {
            min: tmin,
            max: tmax,
        };
        if !(tmin.is_finite() && tmax.is_finite()) || tmin > tmax {
            return Err(bad_thresholds());
        }

        let draw = match spread {
            Spread::Uniform => Draw::Uniform,
            Spread::Normal => {
                let owidth = f64::from(omax) - f64::from(omin);
                let offset = Normal::new(f64::from(omin) + owidth / 2.0, owidth / 4.0).map_err(
                    |_| RfError::InvalidOffsetRange {
                        min: omin,
                        max: omax,
                    },
                )?;
                let threshold = Normal::new(tmin + (tmax - tmin) / 2.0, (tmax - tmin) / 4.0)
                    .map_err(|_| bad_thresholds())?;
                Draw::Normal { offset, threshold }
            }
        };

        Ok(Self {
            offsets,
            thresholds,
            draw,
        })
    }

    /// The inclusive offset range.
    #[must_use]
    pub fn offsets(&self) -> &RangeInclusive<i32> {
        &self.offsets
    }

    /// The inclusive threshold range.
    #[must_use]
    pub fn thresholds(&self) -> &RangeInclusive<f64> {
        &self.thresholds
    }

    fn offset_component<R: Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        match self.draw {
            Draw::Uniform => rng.gen_range(self.offsets.clone()),
            Draw::Normal { offset, .. } => {
                let v = offset.sample(rng).round();
                v.clamp(f64::from(*self.offsets.start()), f64::from(*self.offsets.end())) as i32
            }
        }
    }

    fn offset<R: Rng + ?Sized>(&self, rng: &mut R) -> Offset {
        let dx = self.offset_component(rng);
        let dy = self.offset_component(rng);
        Offset::new(dx, dy)
    }

    fn threshold<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self.draw {
            Draw::Uniform => rng.gen_range(self.thresholds.clone()),
            Draw::Normal { threshold, .. } => threshold
                .sample(rng)
                .clamp(*self.thresholds.start(), *self.thresholds.end()),
        }
    }
}

/// A binary test: compare the normalized depth difference at two offsets
/// against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SplitCandidate {
    /// First probe offset.
    pub offset1: Offset,
    /// Second probe offset.
    pub offset2: Offset,
    /// Samples whose feature is below this value go left.
    pub threshold: f64,
}

impl SplitCandidate {
    /// Create a candidate from explicit parts.
    #[must_use]
    pub fn new(offset1: Offset, offset2: Offset, threshold: f64) -> Self {
        Self {
            offset1,
            offset2,
            threshold,
        }
    }

    /// Draw a random candidate: offset1, then offset2, then threshold.
    #[must_use]
    pub fn generate<R: Rng + ?Sized>(sampler: &CandidateSampler, rng: &mut R) -> Self {
        let offset1 = sampler.offset(rng);
        let offset2 = sampler.offset(rng);
        let threshold = sampler.threshold(rng);
        Self {
            offset1,
            offset2,
            threshold,
        }
    }

    /// Depth-normalized difference between the two probes.
    #[must_use]
    pub fn feature<S: Sample + ?Sized>(&self, sample: &S) -> f64 {
        let depth = normalization_depth(sample.feature_at(Offset::ORIGIN));
        sample.feature_at(self.offset1.scaled_by_depth(depth))
            - sample.feature_at(self.offset2.scaled_by_depth(depth))
    }

    /// Route `sample` to a child.
    #[must_use]
    pub fn classify<S: Sample + ?Sized>(&self, sample: &S) -> Side {
        if self.feature(sample) < self.threshold {
            Side::Left
        } else {
            Side::Right
        }
    }

    /// Entropy reduction, in bits, from splitting `samples` with this candidate.
    ///
    /// Zero when either side would be empty, including for an empty `samples`.
    #[must_use]
    pub fn information_gain<S: Sample>(&self, samples: &[S]) -> f64 {
        let parent = LabelCounts::of_samples(samples);
        self.gain_against(&parent, samples)
    }

    /// Gain against a precomputed tally of `samples`.
    pub(crate) fn gain_against<S: Sample>(&self, parent: &LabelCounts, samples: &[S]) -> f64 {
        let mut left = LabelCounts::new();
        let mut right = LabelCounts::new();
        for s in samples {
            match self.classify(s) {
                Side::Left => left.add(s.true_label()),
                Side::Right => right.add(s.true_label()),
            }
        }
        if left.total() == 0 || right.total() == 0 {
            return 0.0;
        }
        let n = parent.total() as f64;
        let weighted = (left.total() as f64 / n) * left.entropy_unchecked()
            + (right.total() as f64 / n) * right.entropy_unchecked();
        parent.entropy_unchecked() - weighted
    }
}

/// A candidate together with the gain it achieved on a node's samples.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoredCandidate {
    /// The winning test.
    pub candidate: SplitCandidate,
    /// Its information gain in bits.
    pub gain: f64,
}

/// Depth used to scale offsets for a pixel whose own depth is `anchor`.
#[must_use]
pub fn normalization_depth(anchor: f64) -> f64 {
    if anchor.is_finite() && anchor >= MIN_NORMALIZATION_DEPTH {
        anchor
    } else {
        MIN_NORMALIZATION_DEPTH
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::label::Label;
    use crate::sample::testing::{ScalarSample, two_clusters};

    fn separating() -> SplitCandidate {
        SplitCandidate::new(Offset::new(1, 0), Offset::new(-1, 0), 5.0)
    }

    #[test]
    fn perfect_split_gains_one_bit() {
        let samples = two_clusters(5);
        let gain = separating().information_gain(&samples);
        assert!((gain - 1.0).abs() < 1e-12, "gain = {gain}");
        let left = samples
            .iter()
            .filter(|s| separating().classify(*s) == Side::Left)
            .count();
        assert_eq!(left, 5);
    }

    #[test]
    fn one_sided_split_gains_nothing() {
        let samples = two_clusters(5);
        let c = SplitCandidate::new(Offset::new(1, 0), Offset::new(-1, 0), 100.0);
        assert_eq!(c.information_gain(&samples), 0.0);
    }

    #[test]
    fn empty_samples_gain_nothing() {
        let samples: Vec<ScalarSample> = Vec::new();
        assert_eq!(separating().information_gain(&samples), 0.0);
    }

    #[test]
    fn threshold_is_exclusive_on_the_left() {
        let s = ScalarSample::new(5.0, 1);
        assert_eq!(separating().classify(&s), Side::Right);
        let s = ScalarSample::new(4.999, 1);
        assert_eq!(separating().classify(&s), Side::Left);
    }

    #[test]
    fn gain_is_never_nan() {
        let samples = vec![ScalarSample::new(f64::MAX, 1), ScalarSample::new(0.0, 2)];
        let gain = separating().information_gain(&samples);
        assert!(!gain.is_nan());
    }

    #[test]
    fn normalization_clamps_small_and_invalid_depths() {
        assert_eq!(normalization_depth(2.5), 2.5);
        assert_eq!(normalization_depth(0.0), MIN_NORMALIZATION_DEPTH);
        assert_eq!(normalization_depth(-3.0), MIN_NORMALIZATION_DEPTH);
        assert_eq!(normalization_depth(f64::NAN), MIN_NORMALIZATION_DEPTH);
        assert_eq!(normalization_depth(f64::INFINITY), MIN_NORMALIZATION_DEPTH);
    }

    #[test]
    fn uniform_draws_stay_in_range() {
        let sampler = CandidateSampler::new(-3..=3, -0.5..=0.5, Spread::Uniform).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..500 {
            let c = SplitCandidate::generate(&sampler, &mut rng);
            for o in [c.offset1, c.offset2] {
                assert!((-3..=3).contains(&o.dx) && (-3..=3).contains(&o.dy));
            }
            assert!((-0.5..=0.5).contains(&c.threshold));
        }
    }

    #[test]
    fn normal_draws_stay_in_range() {
        let sampler = CandidateSampler::new(-10..=10, 0.0..=1.0, Spread::Normal).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut sum = 0i64;
        for _ in 0..2000 {
            let c = SplitCandidate::generate(&sampler, &mut rng);
            assert!((-10..=10).contains(&c.offset1.dx));
            assert!((0.0..=1.0).contains(&c.threshold));
            sum += i64::from(c.offset1.dx);
        }
        let mean = sum as f64 / 2000.0;
        assert!(mean.abs() < 1.0, "mean = {mean}");
    }

    #[test]
    fn degenerate_ranges_are_allowed() {
        let sampler = CandidateSampler::new(4..=4, 0.25..=0.25, Spread::Normal).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let c = SplitCandidate::generate(&sampler, &mut rng);
        assert_eq!(c.offset1, Offset::new(4, 4));
        assert_eq!(c.threshold, 0.25);
    }

    #[test]
    fn generation_is_reproducible() {
        let sampler = CandidateSampler::new(-60..=60, -0.5..=0.5, Spread::Uniform).unwrap();
        let a = SplitCandidate::generate(&sampler, &mut ChaCha8Rng::seed_from_u64(5));
        let b = SplitCandidate::generate(&sampler, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_ranges_are_rejected() {
        let err = CandidateSampler::new(3..=2, 0.0..=1.0, Spread::Uniform).unwrap_err();
        assert!(matches!(err, RfError::InvalidOffsetRange { min: 3, max: 2 }));
        let err = CandidateSampler::new(0..=1, 1.0..=0.0, Spread::Uniform).unwrap_err();
        assert!(matches!(err, RfError::InvalidThresholdRange { .. }));
        let err = CandidateSampler::new(0..=1, 0.0..=f64::NAN, Spread::Uniform).unwrap_err();
        assert!(matches!(err, RfError::InvalidThresholdRange { .. }));
    }

    #[test]
    fn feature_scales_offsets_by_depth() {
        // Depth 2 halves offsets: (4, 0) probes (2, 0).
        struct Ramp;
        impl Sample for Ramp {
            fn feature_at(&self, o: Offset) -> f64 {
                if o == Offset::ORIGIN { 2.0 } else { f64::from(o.dx) }
            }
            fn true_label(&self) -> Label {
                Label::BACKGROUND
            }
        }
        let c = SplitCandidate::new(Offset::new(4, 0), Offset::new(-6, 0), 0.0);
        assert_eq!(c.feature(&Ramp), 2.0 - (-3.0));
    }
}
