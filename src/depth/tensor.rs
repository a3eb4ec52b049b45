use anyhow::{anyhow, Result};
use image::{GrayImage, Luma};

/// Inverse-depth map shaped `[1, H, W, 1]`. Higher values are closer.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthTensor {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl DepthTensor {
    /// Wrap a model output. `shape` must be `[1, H, W, 1]` (or `[H, W]`).
    pub fn new(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let (height, width) = match shape {
            [1, h, w, 1] | [1, 1, h, w] | [1, h, w] | [h, w] => (*h, *w),
            other => return Err(anyhow!("unexpected depth tensor shape {:?}", other)),
        };
        if height == 0 || width == 0 {
            return Err(anyhow!("depth tensor dimensions must be non-zero"));
        }
        if data.len() != height * width {
            return Err(anyhow!(
                "depth tensor {}x{} expects {} values, received {}",
                height,
                width,
                height * width,
                data.len()
            ));
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return Err(anyhow!("depth rows have unequal lengths"));
        }
        Self::new(&[1, height, width, 1], rows.into_iter().flatten().collect())
    }

    /// A map holding the same value everywhere.
    pub fn filled(height: usize, width: usize, value: f32) -> Result<Self> {
        Self::new(&[1, height, width, 1], vec![value; height * width])
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, self.height, self.width, 1]
    }

    /// Raw value at a pixel. Out-of-range indices are clamped.
    pub fn value(&self, row: usize, column: usize) -> f32 {
        let row = row.min(self.height - 1);
        let column = column.min(self.width - 1);
        self.data[row * self.width + column]
    }

    /// Nearest-neighbour sample at normalized coordinates.
    ///
    /// The pixel index is `round(coord * (dim - 1))` clamped to the map, so
    /// coordinates slightly outside [0, 1] land on the edge.
    pub fn sample(&self, nx: f32, ny: f32) -> Result<f32> {
        if !nx.is_finite() || !ny.is_finite() {
            return Err(anyhow!("non-finite depth sample point ({}, {})", nx, ny));
        }
        let column = nearest_index(nx, self.width);
        let row = nearest_index(ny, self.height);
        Ok(self.data[row * self.width + column])
    }

    /// Value at the center of view.
    pub fn center_value(&self) -> f32 {
        self.value(self.height / 2, self.width / 2)
    }

    /// Min/max normalized grayscale rendering for diagnostics.
    pub fn to_grayscale(&self) -> GrayImage {
        let finite = self.data.iter().copied().filter(|v| v.is_finite());
        let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let range = max - min;

        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let value = self.data[y as usize * self.width + x as usize];
            if range.is_nan() || range <= 0.0 || !value.is_finite() {
                return Luma([128]);
            }
            Luma([(((value - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }
}

fn nearest_index(coord: f32, dim: usize) -> usize {
    let max_index = (dim - 1) as f32;
    (coord * max_index).round().clamp(0.0, max_index) as usize
}
