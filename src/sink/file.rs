//! Appends entries to a line-oriented cache file.
//!
//! The file format is the wire format: one UTF-8 title per `\n`-terminated
//! line.  [`crate::replay`] reads the same file back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{EntrySink, SinkError};
use crate::source::Entry;

pub struct FileSink {
    file: Option<File>,
    path: PathBuf,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed.  Existing lines are
    /// kept.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            file: Some(file),
            path,
        })
    }
}

#[async_trait]
impl EntrySink for FileSink {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    /// Append the line, then flush before reporting success.
    async fn emit(&mut self, entry: &Entry) -> Result<(), SinkError> {
        let Some(file) = self.file.as_mut() else {
            return Err(SinkError::Io(std::io::Error::other("cache file already closed")));
        };

        file.write_all(entry.to_line().as_bytes())
            .await
            .map_err(SinkError::Io)?;
        file.flush().await.map_err(SinkError::Io)?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(err) = file.flush().await {
                debug!(path = %self.path.display(), error = %err, "final flush failed");
            }
            debug!(path = %self.path.display(), "cache file closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(title: &str) -> Entry {
        Entry::new(title, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn lines_are_visible_right_after_emit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cached.txt");
        let mut sink = FileSink::open(&path).await.unwrap();

        sink.emit(&entry("one")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\n");

        sink.emit(&entry("two")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cached.txt");

        let mut first = FileSink::open(&path).await.unwrap();
        first.emit(&entry("kept")).await.unwrap();
        first.close().await;

        let mut second = FileSink::open(&path).await.unwrap();
        second.emit(&entry("added")).await.unwrap();
        second.close().await;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\nadded\n");
    }

    #[tokio::test]
    async fn emit_after_close_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::open(dir.path().join("c.txt")).await.unwrap();
        sink.close().await;

        let err = sink.emit(&entry("late")).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSink::open(dir.path().join("nope").join("c.txt")).await;
        assert!(result.is_err());
    }
}
