//! Saves login frames for offline gallery extension.

use chrono::{DateTime, Local};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("refusing to use {0:?} as a dataset directory name")]
    InvalidName(String),
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Writes `<root>/<name>/<name>_<YYYYMMDD_HHMMSS>.jpg`.
///
/// Two saves for one name within the same second land on the same file and
/// the later one wins.
#[derive(Debug, Clone)]
pub struct DatasetExtender {
    root: PathBuf,
}

impl DatasetExtender {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str, at: &DateTime<Local>) -> PathBuf {
        self.root
            .join(name)
            .join(format!("{name}_{}.jpg", at.format("%Y%m%d_%H%M%S")))
    }

    pub fn save(&self, name: &str, frame: &RgbImage) -> Result<PathBuf, DatasetError> {
        self.save_at(name, frame, &Local::now())
    }

    pub fn save_at(
        &self,
        name: &str,
        frame: &RgbImage,
        at: &DateTime<Local>,
    ) -> Result<PathBuf, DatasetError> {
        // Gallery names become path components.
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(DatasetError::InvalidName(name.to_string()));
        }

        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir).map_err(|source| DatasetError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let path = self.path_for(name, at);
        frame
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|source| DatasetError::Write {
                path: path.clone(),
                source,
            })?;
        tracing::info!(name, path = %path.display(), "saved dataset frame");
        Ok(path)
    }
}
