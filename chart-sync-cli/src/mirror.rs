//! On-disk chart mirror.
//!
//! Layout of a mirror directory:
//!
//! | File              | Contents                                               |
//! |-------------------|--------------------------------------------------------|
//! | `charts.json`     | One normalized record per song, ordered by `groupId`   |
//! | `metadata.json`   | `lastRun` and `totalSongs` of the last completed run   |
//! | `checkpoint.json` | Present only while a run is in flight or interrupted  |
//! | `pending.jsonl`   | Records of every page the in-flight run has persisted  |
//!
//! Pages are persisted by a writer task fed through a channel, so the sync
//! engine's callback never blocks on disk I/O. A converged run folds
//! `pending.jsonl` into `charts.json` and removes both run files; any other
//! ending leaves them for the next `sync` to resume.

use anyhow::{Context, Result};
use bridge_traits::catalog::ChartId;
use chrono::{DateTime, Utc};
use core_runtime::logging::strip_path;
use core_sync::NormalizedRecord;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const CHARTS_FILE: &str = "charts.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const PENDING_FILE: &str = "pending.jsonl";

/// Bookkeeping of the last completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorMetadata {
    /// Start of the last completed run; the next run fetches changes since then
    pub last_run: DateTime<Utc>,
    /// Songs held in `charts.json`
    pub total_songs: usize,
}

/// Progress of an in-flight run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub after_time: DateTime<Utc>,
    /// When the first attempt of this run started
    pub run_started: DateTime<Utc>,
    /// Highest cursor whose page is in `pending.jsonl`
    pub cursor: ChartId,
    pub pages: u32,
}

impl Checkpoint {
    pub fn new(after_time: DateTime<Utc>, run_started: DateTime<Utc>) -> Self {
        Self {
            after_time,
            run_started,
            cursor: 0,
            pages: 0,
        }
    }
}

struct PageCommit {
    records: Vec<NormalizedRecord>,
    cursor: ChartId,
}

/// Sending half of the page writer. Cheap to clone.
#[derive(Clone)]
pub struct PageWriter {
    sender: mpsc::UnboundedSender<PageCommit>,
}

impl PageWriter {
    /// Queue a page for persistence.
    ///
    /// Returns `false` once the writer task has stopped, which only happens
    /// after a write error.
    pub fn submit(&self, records: &[NormalizedRecord], cursor: ChartId) -> bool {
        self.sender
            .send(PageCommit {
                records: records.to_vec(),
                cursor,
            })
            .is_ok()
    }
}

pub struct MirrorStore {
    dir: PathBuf,
}

impl MirrorStore {
    /// Open (and create if needed) a mirror directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create mirror directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub async fn load_metadata(&self) -> Result<Option<MirrorMetadata>> {
        read_json(&self.path(METADATA_FILE)).await
    }

    pub async fn load_charts(&self) -> Result<Vec<NormalizedRecord>> {
        Ok(read_json(&self.path(CHARTS_FILE)).await?.unwrap_or_default())
    }

    pub async fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        read_json(&self.path(CHECKPOINT_FILE)).await
    }

    pub async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        write_json(&self.path(CHECKPOINT_FILE), checkpoint).await
    }

    /// Records persisted by the in-flight or interrupted run.
    ///
    /// A torn last line from a crash mid-write is skipped.
    pub async fn load_pending(&self) -> Result<Vec<NormalizedRecord>> {
        let path = self.path(PENDING_FILE);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let path_str = path.to_string_lossy();
        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    file = strip_path(&path_str),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable pending record"
                ),
            }
        }
        Ok(records)
    }

    /// Forget an interrupted run.
    pub async fn discard_run(&self) -> Result<()> {
        remove_if_exists(&self.path(PENDING_FILE)).await?;
        remove_if_exists(&self.path(CHECKPOINT_FILE)).await
    }

    /// Start the task that appends pages to `pending.jsonl` and advances the
    /// checkpoint after each one.
    ///
    /// The task ends once every [`PageWriter`] clone is dropped and yields
    /// the number of pages the checkpoint covers.
    pub fn spawn_writer(&self, checkpoint: Checkpoint) -> (PageWriter, JoinHandle<Result<u32>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_pages(
            self.path(PENDING_FILE),
            self.path(CHECKPOINT_FILE),
            checkpoint,
            receiver,
        ));
        (PageWriter { sender }, task)
    }

    /// Replace the mirror with `charts` and close out the run.
    pub async fn commit(&self, charts: &[NormalizedRecord], metadata: &MirrorMetadata) -> Result<()> {
        let charts_path = self.path(CHARTS_FILE);
        write_json(&charts_path, charts).await?;
        write_json(&self.path(METADATA_FILE), metadata).await?;
        self.discard_run().await?;

        let path_str = charts_path.to_string_lossy();
        info!(
            file = strip_path(&path_str),
            songs = metadata.total_songs,
            last_run = %metadata.last_run,
            "Mirror committed"
        );
        Ok(())
    }
}

async fn write_pages(
    pending_path: PathBuf,
    checkpoint_path: PathBuf,
    mut checkpoint: Checkpoint,
    mut receiver: mpsc::UnboundedReceiver<PageCommit>,
) -> Result<u32> {
    let mut pending = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&pending_path)
        .await
        .with_context(|| format!("Failed to open {}", pending_path.display()))?;

    while let Some(page) = receiver.recv().await {
        let mut buffer = Vec::new();
        for record in &page.records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }
        pending
            .write_all(&buffer)
            .await
            .with_context(|| format!("Failed to append to {}", pending_path.display()))?;
        pending.sync_data().await?;

        checkpoint.cursor = checkpoint.cursor.max(page.cursor);
        checkpoint.pages += 1;
        write_json(&checkpoint_path, &checkpoint).await?;

        let path_str = pending_path.to_string_lossy();
        debug!(
            file = strip_path(&path_str),
            cursor = checkpoint.cursor,
            pages = checkpoint.pages,
            records = page.records.len(),
            "Page checkpointed"
        );
    }

    pending.flush().await?;
    Ok(checkpoint.pages)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .with_context(|| format!("Corrupt mirror file {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Write through a temporary file so readers never see a partial document.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
