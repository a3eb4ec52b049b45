//! Text recognition boundary and the per-class OCR policy.

mod timed;

use anyhow::{anyhow, Result};

use crate::detect::BoundingBox;
use crate::frame::RgbFrame;

pub use timed::TimedRecognizer;

/// Text recognition engine.
///
/// `recognize` receives the crop of a single detection. `Ok(None)` means no
/// text was found; errors are contained to that detection by the caller.
pub trait TextRecognizer: Send {
    fn name(&self) -> &'static str;

    fn recognize(&mut self, crop: &RgbFrame) -> Result<Option<String>>;
}

/// Recognizer used when no OCR engine is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoText;

impl TextRecognizer for NoText {
    fn name(&self) -> &'static str {
        "none"
    }

    fn recognize(&mut self, _crop: &RgbFrame) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Which detections are worth running OCR on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OcrPolicy {
    #[default]
    Always,
    Never,
    /// Only classes named here (compared case-insensitively).
    AllowList(Vec<String>),
}

impl OcrPolicy {
    pub fn allow_list<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        OcrPolicy::AllowList(
            classes
                .into_iter()
                .map(|class| class.as_ref().trim().to_lowercase())
                .filter(|class| !class.is_empty())
                .collect(),
        )
    }

    /// Build a policy from its configuration name (`always`, `never`,
    /// `allow_list`) and class list.
    pub fn from_config(name: &str, classes: &[String]) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(OcrPolicy::Always),
            "never" => Ok(OcrPolicy::Never),
            "allow_list" | "allowlist" | "allow-list" => Ok(Self::allow_list(classes)),
            other => Err(anyhow!(
                "unknown OCR policy '{}' (expected always, never or allow_list)",
                other
            )),
        }
    }

    pub fn admits(&self, bbox: &BoundingBox) -> bool {
        match self {
            OcrPolicy::Always => true,
            OcrPolicy::Never => false,
            OcrPolicy::AllowList(classes) => {
                let name = bbox.class_name.to_lowercase();
                classes.iter().any(|class| *class == name)
            }
        }
    }
}

/// Collapse recognized text onto one line. Blank text counts as no text.
pub fn normalize_text(raw: &str) -> Option<String> {
    let text = raw.replace(['\r', '\n'], " ");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(class_name: &str) -> BoundingBox {
        BoundingBox::from_center(0.5, 0.5, 0.2, 0.2, 0.9, 0, class_name.to_string())
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let policy = OcrPolicy::allow_list(["Sign", " book "]);
        assert!(policy.admits(&bbox("sign")));
        assert!(policy.admits(&bbox("BOOK")));
        assert!(!policy.admits(&bbox("person")));
        assert!(OcrPolicy::Always.admits(&bbox("person")));
        assert!(!OcrPolicy::Never.admits(&bbox("sign")));
    }

    #[test]
    fn policy_from_config_names() {
        let classes = vec!["stop sign".to_string()];
        assert_eq!(
            OcrPolicy::from_config("allow_list", &classes).unwrap(),
            OcrPolicy::AllowList(vec!["stop sign".into()])
        );
        assert_eq!(OcrPolicy::from_config("NEVER", &[]).unwrap(), OcrPolicy::Never);
        assert!(OcrPolicy::from_config("sometimes", &[]).is_err());
    }

    #[test]
    fn normalize_text_flattens_lines() {
        assert_eq!(normalize_text(" EXIT\r\nonly \n"), Some("EXIT  only".to_string()));
        assert_eq!(normalize_text(" \n\t"), None);
    }
}
