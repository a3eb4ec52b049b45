pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedScene;

#[cfg(feature = "backend-tract")]
pub use tract::TractScene;
