use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::util::{ensure_parent_directory, now_utc_string};

/// Evaluation log: every report goes to tracing and is appended to a text file.
#[derive(Debug, Clone)]
pub struct EvalLog {
    path: PathBuf,
}

impl EvalLog {
    /// Starts a fresh log, truncating any previous contents.
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent_directory(path)?;
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: &str) -> Result<()> {
        info!("{message}");
        self.append_line(message)
    }

    pub fn error(&self, message: &str) -> Result<()> {
        warn!("{message}");
        self.append_line(message)
    }

    /// Appends text verbatim, without echoing it.
    pub fn append_raw(&self, text: &str) -> Result<()> {
        let mut file = self.open()?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn append_line(&self, message: &str) -> Result<()> {
        let mut file = self.open()?;
        writeln!(file, "{} {message}", now_utc_string())
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))
    }
}
