use anyhow::{anyhow, Result};

/// Number of geometry rows (cx, cy, w, h) that precede the class rows.
pub const BOX_ROWS: usize = 4;

/// Raw detector output shaped `[1, 4 + num_classes, num_anchors]`.
///
/// Stored row-major: row `r`, anchor `a` lives at `r * num_anchors + a`.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetectionTensor {
    channels: usize,
    anchors: usize,
    data: Vec<f32>,
}

impl RawDetectionTensor {
    /// Wrap a model output, validating it against its declared shape.
    pub fn new(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let (channels, anchors) = match shape {
            [1, channels, anchors] => (*channels, *anchors),
            other => {
                return Err(anyhow!(
                    "detector output must be shaped [1, 4 + classes, anchors], got {:?}",
                    other
                ))
            }
        };
        if channels <= BOX_ROWS {
            return Err(anyhow!(
                "detector output has {} rows; expected more than {}",
                channels,
                BOX_ROWS
            ));
        }
        let expected_len = channels
            .checked_mul(anchors)
            .ok_or_else(|| anyhow!("detector output dimensions overflow"))?;
        if data.len() != expected_len {
            return Err(anyhow!(
                "detector output holds {} values, shape {:?} needs {}",
                data.len(),
                shape,
                expected_len
            ));
        }
        Ok(Self {
            channels,
            anchors,
            data,
        })
    }

    /// A tensor with no candidate anchors.
    pub fn empty(num_classes: usize) -> Self {
        Self {
            channels: BOX_ROWS + num_classes.max(1),
            anchors: 0,
            data: Vec::new(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.channels - BOX_ROWS
    }

    pub fn num_anchors(&self) -> usize {
        self.anchors
    }

    pub fn shape(&self) -> [usize; 3] {
        [1, self.channels, self.anchors]
    }

    pub fn is_empty(&self) -> bool {
        self.anchors == 0
    }

    /// Value at `row` for `anchor`. Panics when out of bounds.
    pub fn value(&self, row: usize, anchor: usize) -> f32 {
        self.data[row * self.anchors + anchor]
    }

    /// Geometry of one anchor as `[cx, cy, w, h]`.
    pub fn geometry(&self, anchor: usize) -> [f32; 4] {
        [
            self.value(0, anchor),
            self.value(1, anchor),
            self.value(2, anchor),
            self.value(3, anchor),
        ]
    }

    /// Class score of one anchor.
    pub fn score(&self, class_index: usize, anchor: usize) -> f32 {
        self.value(BOX_ROWS + class_index, anchor)
    }
}

/// Assembles a `RawDetectionTensor` anchor by anchor.
///
/// Backends that produce anchor-major output and tests use this instead of
/// laying out the row-major buffer by hand. Unset anchors are all zeros.
#[derive(Clone, Debug)]
pub struct DetectionTensorBuilder {
    num_classes: usize,
    anchors: usize,
    data: Vec<f32>,
}

impl DetectionTensorBuilder {
    pub fn new(num_classes: usize, anchors: usize) -> Self {
        let num_classes = num_classes.max(1);
        Self {
            num_classes,
            anchors,
            data: vec![0.0; (BOX_ROWS + num_classes) * anchors],
        }
    }

    /// Set geometry `[cx, cy, w, h]` and class scores for one anchor.
    ///
    /// Scores beyond `num_classes` are ignored; missing scores stay zero.
    pub fn anchor(mut self, anchor: usize, geometry: [f32; 4], scores: &[f32]) -> Self {
        if anchor >= self.anchors {
            return self;
        }
        for (row, value) in geometry.iter().enumerate() {
            self.data[row * self.anchors + anchor] = *value;
        }
        for (class_index, score) in scores.iter().take(self.num_classes).enumerate() {
            self.data[(BOX_ROWS + class_index) * self.anchors + anchor] = *score;
        }
        self
    }

    pub fn build(self) -> RawDetectionTensor {
        RawDetectionTensor {
            channels: BOX_ROWS + self.num_classes,
            anchors: self.anchors,
            data: self.data,
        }
    }
}
