//! Per-job scratch files.
//!
//! Every intermediate file a pipeline creates is allocated through a
//! [`StagingArea`], which removes all of them when released or dropped.
//! Only [`publish`] moves a file out of staging into the output directory.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::download::Downloader;
use crate::error::MediaResult;
use crate::fs_utils::{move_file, remove_if_exists};

/// Scratch files owned by one job execution.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    prefix: String,
    files: Vec<PathBuf>,
}

impl StagingArea {
    /// Create a staging area under `root`, naming files after `prefix`.
    ///
    /// The root is made absolute so that paths written into concat lists
    /// resolve the same way from the list file's directory.
    pub async fn create(root: impl AsRef<Path>, prefix: impl Into<String>) -> MediaResult<Self> {
        fs::create_dir_all(root.as_ref()).await?;
        let root = fs::canonicalize(root.as_ref()).await?;
        Ok(Self {
            root,
            prefix: prefix.into(),
            files: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh, unique path ending in `suffix` and track it.
    ///
    /// The file itself is not created.
    pub fn new_temp_path(&mut self, suffix: &str) -> PathBuf {
        let name = format!("{}-{}{}", self.prefix, Uuid::new_v4().simple(), suffix);
        let path = self.root.join(name);
        self.files.push(path.clone());
        path
    }

    /// Download `url` into a new staged file.
    pub async fn download(&mut self, downloader: &Downloader, url: &str) -> MediaResult<PathBuf> {
        let path = self.new_temp_path(".mp4");
        downloader.fetch_to_file(url, &path).await?;
        Ok(path)
    }

    /// Write `contents` into a new staged file.
    pub async fn write_file(&mut self, suffix: &str, contents: impl AsRef<[u8]>) -> MediaResult<PathBuf> {
        let path = self.new_temp_path(suffix);
        fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Paths currently tracked.
    pub fn tracked(&self) -> &[PathBuf] {
        &self.files
    }

    /// Delete every tracked file. Files already gone are ignored.
    pub async fn release_all(&mut self) {
        for path in self.files.drain(..) {
            match remove_if_exists(&path).await {
                Ok(true) => debug!("Removed staged file {}", path.display()),
                Ok(false) => {}
                Err(e) => warn!("Failed to remove staged file {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        for path in self.files.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove staged file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Move a finished staged file to its published location.
///
/// On failure nothing is left at `output`.
pub async fn publish(staged: &Path, output: &Path) -> MediaResult<()> {
    if let Err(e) = move_file(staged, output).await {
        if let Err(cleanup) = remove_if_exists(output).await {
            warn!("Failed to remove partial output {}: {}", output.display(), cleanup);
        }
        return Err(e);
    }
    debug!("Published {} -> {}", staged.display(), output.display());
    Ok(())
}
