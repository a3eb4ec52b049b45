use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameInput, FrameSource, SourceStats};
use crate::frame::RgbFrame;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Replays the still images of a directory in name order, cycling forever.
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageDirSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            last_error: None,
        }
    }
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read image directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        log::info!(
            "ImageDirSource: {} images in {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<FrameInput> {
        if self.files.is_empty() {
            return Err(anyhow!("image source is not connected"));
        }
        let path = self.files[self.cursor % self.files.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        let image = match image::open(&path) {
            Ok(image) => image.to_rgb8(),
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Err(err).with_context(|| format!("failed to decode {}", path.display()));
            }
        };
        self.last_error = None;
        self.frame_count += 1;
        Ok(RgbFrame::from_image(image).into())
    }

    fn is_healthy(&self) -> bool {
        !self.files.is_empty() && self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.dir.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn cycles_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 2, Rgb([10, 20, 30])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "skip me")?;

        let mut source = ImageDirSource::new(dir.path());
        assert!(source.next_frame().is_err());
        source.connect()?;

        let widths: Vec<u32> = (0..3)
            .map(|_| match source.next_frame() {
                Ok(FrameInput::Rgb(frame)) => frame.width(),
                _ => 0,
            })
            .collect();
        assert_eq!(widths, vec![2, 4, 2]);
        assert!(source.is_healthy());
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(ImageDirSource::new(dir.path()).connect().is_err());
        Ok(())
    }
}
