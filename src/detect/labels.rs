use anyhow::{Context, Result};
use std::path::Path;

use crate::Language;

/// Class names indexed by the detector's class rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Parse a newline-separated label list. Reading stops at the first empty line.
    pub fn parse(contents: &str) -> Self {
        let labels = contents
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .take_while(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { labels }
    }

    /// Parse a category list: blank lines are skipped and underscores read
    /// as spaces (`living_room` is spoken as "living room").
    pub fn parse_categories(contents: &str) -> Self {
        let labels = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.replace('_', " "))
            .collect();
        Self { labels }
    }

    pub fn load_categories<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read categories from {}", path.display()))?;
        Ok(Self::parse_categories(&contents))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels from {}", path.display()))?;
        let labels = Self::parse(&contents);
        log::debug!("loaded {} labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    /// Load `labels_<lang>.txt` from a labels directory.
    pub fn for_language<P: AsRef<Path>>(dir: P, language: Language) -> Result<Self> {
        Self::load(dir.as_ref().join(format!("labels_{}.txt", language.code())))
    }

    /// Name for a class index, or `class <index>` when the list is too short.
    pub fn name(&self, class_index: usize) -> String {
        self.labels
            .get(class_index)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class_index))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
