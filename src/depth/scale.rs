use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default inverse-depth boundaries, closest first.
pub const DEFAULT_BOUNDARIES: [f32; 10] = [
    1000.0, 900.0, 800.0, 700.0, 600.0, 500.0, 400.0, 300.0, 200.0, 100.0,
];

/// Quantized closeness: 1 is closest, `ScaleTable::max_scale()` farthest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceScale(u8);

impl DistanceScale {
    pub fn new(value: u8) -> Self {
        Self(value.max(1))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn proximity(self) -> Proximity {
        match self.0 {
            0..=2 => Proximity::VeryClose,
            3..=4 => Proximity::Close,
            5..=7 => Proximity::Medium,
            8..=10 => Proximity::Far,
            _ => Proximity::VeryFar,
        }
    }
}

impl fmt::Display for DistanceScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distance attached to a perception result.
///
/// `Unknown` means no depth reading was available. It is never folded into
/// the farthest scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Scale(DistanceScale),
    Unknown,
}

impl Distance {
    pub fn scale(self) -> Option<DistanceScale> {
        match self {
            Distance::Scale(scale) => Some(scale),
            Distance::Unknown => None,
        }
    }

    pub fn proximity(self) -> Option<Proximity> {
        self.scale().map(DistanceScale::proximity)
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Distance::Unknown)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    VeryClose,
    Close,
    Medium,
    Far,
    VeryFar,
}

/// Descending inverse-depth boundaries used to quantize raw depth values.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleTable {
    boundaries: Vec<f32>,
}

impl ScaleTable {
    /// Boundaries must be non-empty, finite and strictly descending.
    pub fn new(boundaries: Vec<f32>) -> Result<Self> {
        if boundaries.is_empty() {
            return Err(anyhow!("depth boundary table must not be empty"));
        }
        if boundaries.len() >= u8::MAX as usize {
            return Err(anyhow!("depth boundary table is too long"));
        }
        if let Some(bad) = boundaries.iter().find(|b| !b.is_finite()) {
            return Err(anyhow!("depth boundary {} is not finite", bad));
        }
        if let Some(pair) = boundaries.windows(2).find(|pair| pair[1] >= pair[0]) {
            return Err(anyhow!(
                "depth boundaries must be strictly descending ({} then {})",
                pair[0],
                pair[1]
            ));
        }
        Ok(Self { boundaries })
    }

    pub fn boundaries(&self) -> &[f32] {
        &self.boundaries
    }

    /// The farthest scale, one past the number of boundaries.
    pub fn max_scale(&self) -> DistanceScale {
        DistanceScale(self.boundaries.len() as u8 + 1)
    }

    /// Map a raw inverse-depth value onto the closeness scale.
    ///
    /// Values above the first boundary map to 1, values in `(B[i+1], B[i]]`
    /// map to `i + 2`. Non-positive, NaN and values at or below the last
    /// boundary map to the farthest scale.
    pub fn to_scale(&self, raw: f32) -> DistanceScale {
        if raw.is_nan() || raw <= 0.0 {
            return self.max_scale();
        }
        if raw > self.boundaries[0] {
            return DistanceScale(1);
        }
        self.boundaries
            .windows(2)
            .position(|pair| pair[1] < raw && raw <= pair[0])
            .map(|i| DistanceScale(i as u8 + 2))
            .unwrap_or_else(|| self.max_scale())
    }
}

impl Default for ScaleTable {
    fn default() -> Self {
        Self {
            boundaries: DEFAULT_BOUNDARIES.to_vec(),
        }
    }
}
