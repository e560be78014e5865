//! In-memory depth/label frames and the pixel samples drawn from them.
//!
//! Decoding depth and label images is left to the caller; a [`DepthFrame`]
//! only holds the decoded buffers.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::RfError;
use crate::label::Label;
use crate::sample::{Offset, Sample, SampleCursor, TrainSet};

/// Depth reported for probes outside the frame or on invalid pixels.
///
/// Far beyond any real scene depth, so such probes read as "very far away".
pub const OUT_OF_RANGE_DEPTH: f64 = 1.0e6;

/// A decoded depth frame with per-pixel ground-truth labels.
///
/// Both buffers are row-major; depths are in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    width: usize,
    height: usize,
    depth: Vec<f32>,
    labels: Vec<Label>,
}

impl DepthFrame {
    /// Wrap decoded buffers.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::FrameShapeMismatch`] unless both buffers hold
    /// exactly `width * height` entries, including when that product overflows.
    pub fn new(
        width: usize,
        height: usize,
        depth: Vec<f32>,
        labels: Vec<Label>,
    ) -> Result<Self, RfError> {
        let n = width.checked_mul(height);
        if n.is_none_or(|n| depth.len() != n || labels.len() != n) {
            return Err(RfError::FrameShapeMismatch {
                width,
                height,
                depth_len: depth.len(),
                label_len: labels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            depth,
            labels,
        })
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels.
    #[must_use]
    pub fn n_pixels(&self) -> usize {
        self.depth.len()
    }

    fn index(&self, row: i64, col: i64) -> Option<usize> {
        let row = usize::try_from(row).ok()?;
        let col = usize::try_from(col).ok()?;
        (row < self.height && col < self.width).then(|| row * self.width + col)
    }

    /// Depth at `(row, col)`, or [`OUT_OF_RANGE_DEPTH`] outside the frame or
    /// where the stored depth is not a positive finite number.
    #[must_use]
    pub fn depth_at(&self, row: i64, col: i64) -> f64 {
        match self.index(row, col).map(|i| f64::from(self.depth[i])) {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => OUT_OF_RANGE_DEPTH,
        }
    }

    /// Label at `(row, col)`; background outside the frame.
    #[must_use]
    pub fn label_at(&self, row: i64, col: i64) -> Label {
        self.index(row, col)
            .map_or(Label::BACKGROUND, |i| self.labels[i])
    }
}

/// One pixel of a shared frame.
#[derive(Debug, Clone)]
pub struct PixelRef {
    frame: Arc<DepthFrame>,
    row: usize,
    col: usize,
}

impl PixelRef {
    /// Reference pixel `(row, col)` of `frame`.
    #[must_use]
    pub fn new(frame: Arc<DepthFrame>, row: usize, col: usize) -> Self {
        Self { frame, row, col }
    }

    /// Row of the anchor pixel.
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Column of the anchor pixel.
    #[must_use]
    pub fn col(&self) -> usize {
        self.col
    }

    /// The frame the pixel belongs to.
    #[must_use]
    pub fn frame(&self) -> &DepthFrame {
        &self.frame
    }
}

impl Sample for PixelRef {
    fn feature_at(&self, offset: Offset) -> f64 {
        let row = self.row as i64 + i64::from(offset.dy);
        let col = self.col as i64 + i64::from(offset.dx);
        self.frame.depth_at(row, col)
    }

    fn true_label(&self) -> Label {
        self.frame.label_at(self.row as i64, self.col as i64)
    }
}

/// A train set over a pool of frames.
///
/// Each draw picks `pixels_per_frame` pixels from every frame uniformly with
/// replacement. Background pixels are excluded from draws unless enabled with
/// [`FrameSet::with_background`]; evaluation passes always visit every pixel.
#[derive(Debug, Clone)]
pub struct FrameSet {
    frames: Vec<Arc<DepthFrame>>,
    pixels_per_frame: usize,
    include_background: bool,
    drawable: Vec<Vec<usize>>,
}

impl FrameSet {
    /// Create a set drawing `pixels_per_frame` pixels per frame.
    #[must_use]
    pub fn new(frames: Vec<DepthFrame>, pixels_per_frame: usize) -> Self {
        let frames: Vec<Arc<DepthFrame>> = frames.into_iter().map(Arc::new).collect();
        let mut set = Self {
            frames,
            pixels_per_frame,
            include_background: false,
            drawable: Vec::new(),
        };
        set.index_drawable();
        set
    }

    /// Allow background pixels in training draws.
    #[must_use]
    pub fn with_background(mut self, include_background: bool) -> Self {
        self.include_background = include_background;
        self.index_drawable();
        self
    }

    fn index_drawable(&mut self) {
        let include_background = self.include_background;
        self.drawable = self
            .frames
            .iter()
            .map(|f| {
                f.labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| include_background || !l.is_background())
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();
    }

    /// The frames in the pool.
    #[must_use]
    pub fn frames(&self) -> &[Arc<DepthFrame>] {
        &self.frames
    }

    /// Total number of pixels across all frames.
    #[must_use]
    pub fn n_pixels(&self) -> usize {
        self.frames.iter().map(|f| f.n_pixels()).sum()
    }
}

impl TrainSet<PixelRef> for FrameSet {
    fn sample(&mut self, rng: &mut ChaCha8Rng) -> Vec<PixelRef> {
        let mut batch = Vec::with_capacity(self.frames.len() * self.pixels_per_frame);
        for (frame, pixels) in self.frames.iter().zip(&self.drawable) {
            if pixels.is_empty() {
                continue;
            }
            for _ in 0..self.pixels_per_frame {
                let i = pixels[rng.gen_range(0..pixels.len())];
                batch.push(PixelRef::new(
                    Arc::clone(frame),
                    i / frame.width,
                    i % frame.width,
                ));
            }
        }
        batch
    }

    fn iter(&self) -> Box<dyn SampleCursor<PixelRef> + '_> {
        let mut cursor = FrameCursor {
            frames: &self.frames,
            frame: 0,
            pixel: 0,
        };
        cursor.skip_empty();
        Box::new(cursor)
    }
}

struct FrameCursor<'a> {
    frames: &'a [Arc<DepthFrame>],
    frame: usize,
    pixel: usize,
}

impl FrameCursor<'_> {
    fn skip_empty(&mut self) {
        while self
            .frames
            .get(self.frame)
            .is_some_and(|f| self.pixel >= f.n_pixels())
        {
            self.frame += 1;
            self.pixel = 0;
        }
    }
}

impl SampleCursor<PixelRef> for FrameCursor<'_> {
    fn value(&self) -> Option<(PixelRef, Label)> {
        let frame = self.frames.get(self.frame)?;
        if self.pixel >= frame.n_pixels() {
            return None;
        }
        let p = PixelRef::new(
            Arc::clone(frame),
            self.pixel / frame.width,
            self.pixel % frame.width,
        );
        let label = p.true_label();
        Some((p, label))
    }

    fn next(&mut self) {
        self.skip_empty();
        if self.frame < self.frames.len() {
            self.pixel += 1;
            self.skip_empty();
        }
    }
}

/// Labels used by [`synthetic_scene`].
pub mod scene {
    use crate::label::Label;

    /// The back wall.
    pub const WALL: Label = Label::BACKGROUND;
    /// A flat box facing the camera.
    pub const BOX: Label = Label::new(1);
    /// A ball bulging towards the camera.
    pub const BALL: Label = Label::new(2);
    /// Number of labels in a synthetic scene.
    pub const LABEL_COUNT: usize = 3;
}

/// Render a procedural depth scene: a flat box and a ball in front of a wall.
///
/// The layout and sensor noise depend only on `seed`.
#[must_use]
pub fn synthetic_scene(width: usize, height: usize, seed: u64) -> DepthFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (w, h) = (width as f64, height as f64);

    let box_w = (w / 2.0).max(1.0);
    let box_h = (h / 2.0).max(1.0);
    let box_x = rng.gen_range(0.0..=(w / 2.0 - box_w / 2.0).max(0.0));
    let box_y = rng.gen_range(0.0..=(h - box_h).max(0.0));
    let box_depth = rng.gen_range(1.8..2.4);

    let radius = (w.min(h) / 4.0).max(1.0);
    let ball_x = rng.gen_range((w / 2.0 + radius).min(w)..=(w - radius).max(w / 2.0 + radius).min(w));
    let ball_y = rng.gen_range(radius.min(h)..=(h - radius).max(radius).min(h));
    let ball_depth = rng.gen_range(1.2..1.6);

    let mut depth = Vec::with_capacity(width * height);
    let mut labels = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let (x, y) = (col as f64 + 0.5, row as f64 + 0.5);
            let noise = rng.gen_range(-0.005..0.005);
            let r2 = ((x - ball_x).powi(2) + (y - ball_y).powi(2)) / radius.powi(2);
            let (d, label) = if r2 < 1.0 {
                (ball_depth - 0.3 * (1.0 - r2).sqrt(), scene::BALL)
            } else if (box_x..box_x + box_w).contains(&x) && (box_y..box_y + box_h).contains(&y) {
                (box_depth, scene::BOX)
            } else {
                (4.0 + 0.2 * y / h, scene::WALL)
            };
            depth.push((d + noise) as f32);
            labels.push(label);
        }
    }

    DepthFrame {
        width,
        height,
        depth,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> DepthFrame {
        DepthFrame::new(
            3,
            2,
            vec![1.0, 2.0, 0.0, 4.0, f32::NAN, 6.0],
            vec![
                Label::BACKGROUND,
                Label::new(1),
                Label::new(1),
                Label::new(2),
                Label::BACKGROUND,
                Label::new(2),
            ],
        )
        .unwrap()
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        let err = DepthFrame::new(usize::MAX, 2, Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            RfError::FrameShapeMismatch {
                width: usize::MAX,
                height: 2,
                depth_len: 0,
                label_len: 0,
            }
        ));
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = DepthFrame::new(2, 2, vec![1.0; 4], vec![Label::BACKGROUND; 3]).unwrap_err();
        assert!(matches!(
            err,
            RfError::FrameShapeMismatch {
                depth_len: 4,
                label_len: 3,
                ..
            }
        ));
    }

    #[test]
    fn depth_reads_are_total() {
        let f = tiny();
        assert_eq!(f.depth_at(0, 1), 2.0);
        assert_eq!(f.depth_at(0, 2), OUT_OF_RANGE_DEPTH, "zero depth is invalid");
        assert_eq!(f.depth_at(1, 1), OUT_OF_RANGE_DEPTH, "NaN depth is invalid");
        assert_eq!(f.depth_at(-1, 0), OUT_OF_RANGE_DEPTH);
        assert_eq!(f.depth_at(0, 3), OUT_OF_RANGE_DEPTH);
        assert_eq!(f.label_at(5, 5), Label::BACKGROUND);
    }

    #[test]
    fn pixel_probes_relative_to_anchor() {
        let p = PixelRef::new(Arc::new(tiny()), 1, 0);
        assert_eq!(p.feature_at(Offset::ORIGIN), 4.0);
        assert_eq!(p.feature_at(Offset::new(2, 0)), 6.0);
        assert_eq!(p.feature_at(Offset::new(1, -1)), 2.0);
        assert_eq!(p.true_label(), Label::new(2));
    }

    #[test]
    fn draws_skip_background_by_default() {
        let mut set = FrameSet::new(vec![tiny()], 50);
        let batch = set.sample(&mut ChaCha8Rng::seed_from_u64(4));
        assert_eq!(batch.len(), 50);
        assert!(batch.iter().all(|p| !p.true_label().is_background()));
    }

    #[test]
    fn draws_can_include_background() {
        let mut set = FrameSet::new(vec![tiny()], 200).with_background(true);
        let batch = set.sample(&mut ChaCha8Rng::seed_from_u64(4));
        assert!(batch.iter().any(|p| p.true_label().is_background()));
    }

    #[test]
    fn cursor_visits_every_pixel() {
        let empty = DepthFrame::new(0, 0, Vec::new(), Vec::new()).unwrap();
        let set = FrameSet::new(vec![empty.clone(), tiny(), empty, tiny()], 1);
        let mut cursor = set.iter();
        let mut n = 0;
        while cursor.value().is_some() {
            n += 1;
            cursor.next();
        }
        assert_eq!(n, 12);
    }

    #[test]
    fn synthetic_scene_is_reproducible_and_labeled() {
        let a = synthetic_scene(48, 40, 7);
        let b = synthetic_scene(48, 40, 7);
        assert_eq!(a, b);
        for label in [scene::WALL, scene::BOX, scene::BALL] {
            assert!(a.labels.contains(&label), "missing label {label}");
        }
        assert!(a.depth.iter().all(|d| *d > 0.0));
    }
}
