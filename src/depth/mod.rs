//! Monocular depth: backend boundary, nearest-neighbour sampling and the
//! closeness scale.

mod backend;
pub mod backends;
mod scale;
mod tensor;

use anyhow::{anyhow, Context, Result};

use crate::frame::RgbFrame;

pub use backend::DepthBackend;
pub use backends::ScriptedDepth;
#[cfg(feature = "backend-tract")]
pub use backends::TractDepth;
pub use scale::{Distance, DistanceScale, Proximity, ScaleTable, DEFAULT_BOUNDARIES};
pub use tensor::DepthTensor;

/// A loaded depth model.
pub struct DepthEstimator {
    backend: Option<Box<dyn DepthBackend>>,
}

impl DepthEstimator {
    pub fn new<B: DepthBackend + 'static>(backend: B) -> Self {
        log::info!("depth backend '{}' ready", backend.name());
        Self {
            backend: Some(Box::new(backend)),
        }
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|backend| backend.name())
    }

    pub fn estimate(&mut self, frame: &RgbFrame) -> Result<DepthTensor> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| anyhow!("depth estimator has been closed"))?;
        backend.estimate(frame).context("depth inference failed")
    }

    /// Release the backend. Later `estimate` calls fail.
    pub fn close(&mut self) {
        if let Some(backend) = self.backend.take() {
            log::info!("depth backend '{}' released", backend.name());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }
}
