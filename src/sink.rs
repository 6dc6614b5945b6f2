//! Result sink: routes outcomes to the valid/invalid partitions.
//!
//! The sink is the only writer of partition files and run counters. The
//! scheduler owns it for the duration of a run and calls [`ResultSink::record`]
//! from its single consumer loop, so no locking is needed.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{CheckError, Result};
use crate::probe::ProbeOutcome;

/// Live counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub total: usize,
    pub completed: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub paused: bool,
    pub cancelled: bool,
    /// Outcomes whose partition write failed; still counted above.
    pub write_failures: usize,
}

impl RunState {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }
}

/// Append-only playlist file holding one verdict category.
#[derive(Debug)]
pub struct OutputPartition {
    path: PathBuf,
    file: File,
}

impl OutputPartition {
    /// Create or truncate the partition file, creating parent directories.
    pub async fn create(path: &Path) -> Result<Self> {
        let setup_err = |source| CheckError::OutputDir {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(setup_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(setup_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one two-line entry and flush it.
    pub async fn append(&mut self, metadata: &str, url: &str) -> Result<()> {
        let entry = format!("{metadata}\n{url}\n");
        let write = async {
            self.file.write_all(entry.as_bytes()).await?;
            self.file.flush().await
        };
        write.await.map_err(|source| CheckError::Persistence {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Exclusive owner of the partitions and counters of one run.
#[derive(Debug)]
pub struct ResultSink {
    valid: OutputPartition,
    invalid: OutputPartition,
    state: RunState,
}

impl ResultSink {
    /// Truncate both partitions and start counting from zero.
    pub async fn create(valid_path: &Path, invalid_path: &Path, total: usize) -> Result<Self> {
        Ok(Self {
            valid: OutputPartition::create(valid_path).await?,
            invalid: OutputPartition::create(invalid_path).await?,
            state: RunState::new(total),
        })
    }

    /// Persist an outcome and update the counters.
    ///
    /// A failed write is logged and counted but does not stop the run; the
    /// verdict counters are updated either way.
    pub async fn record(&mut self, outcome: &ProbeOutcome) -> &RunState {
        let descriptor = &outcome.descriptor;
        let valid = outcome.verdict.is_valid();
        let partition = if valid { &mut self.valid } else { &mut self.invalid };

        match partition
            .append(&descriptor.metadata_or_placeholder(), descriptor.url())
            .await
        {
            Ok(()) => debug!(
                url = %descriptor.url(),
                partition = %partition.path().display(),
                "Recorded outcome"
            ),
            Err(e) => {
                warn!(url = %descriptor.url(), error = %e, "Failed to persist outcome");
                self.state.write_failures += 1;
            }
        }

        self.state.completed += 1;
        if valid {
            self.state.valid_count += 1;
        } else {
            self.state.invalid_count += 1;
        }
        &self.state
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }
}
