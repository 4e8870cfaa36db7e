//! Image directory replay source.
//!
//! `dir://<path>` replays the PNG/JPEG files in `<path>` in lexical file-name
//! order, looping at the end. Frames are scaled to the configured frame size so
//! the rest of the pipeline sees exactly what a camera would deliver.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub(crate) const SCHEME: &str = "dir://";

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ImageDirSource {
    dir: PathBuf,
    width: u32,
    height: u32,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageDirSource {
    pub fn new<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(anyhow!("replay source needs a directory path"));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            width,
            height,
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            last_error: None,
        })
    }

    fn load(&self, path: &Path) -> Result<Frame> {
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();
        let image = if image.dimensions() == (self.width, self.height) {
            image
        } else {
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        };
        Frame::from_rgb(image.into_raw(), self.width, self.height)
    }
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("read replay directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no PNG/JPEG files in {}", self.dir.display()));
        }
        files.sort();
        log::info!(
            "ImageDirSource: replaying {} images from {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.files.is_empty() {
            return Err(anyhow!("replay source {} not connected", self.dir.display()));
        }
        let path = self.files[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.files.len();

        match self.load(&path) {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_error = None;
                Ok(frame.with_sequence(self.frame_count))
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        !self.files.is_empty() && self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            location: format!("{}{}", SCHEME, self.dir.display()),
        }
    }
}
