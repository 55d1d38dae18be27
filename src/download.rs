//! Download sinks – where exported files are delivered.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A file produced by an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    /// Where the sink put it, when it has a location.
    pub location: Option<PathBuf>,
}

/// Receives an encoded file and makes it available to the user.
pub trait DownloadSink {
    /// Deliver `bytes` under `filename`; returns the stored location, if any.
    fn deliver(&self, filename: &str, bytes: &[u8]) -> io::Result<Option<PathBuf>>;
}

/// Writes files into a directory, creating it when needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> io::Result<Option<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        std::fs::write(&path, bytes)?;
        log::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(Some(path))
    }
}

/// Keeps delivered files in memory. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> io::Result<Option<PathBuf>> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| io::Error::other("memory sink poisoned"))?;
        files.push((filename.to_string(), bytes.to_vec()));
        Ok(None)
    }
}
