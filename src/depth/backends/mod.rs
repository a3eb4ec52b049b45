pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedDepth;

#[cfg(feature = "backend-tract")]
pub use tract::TractDepth;
