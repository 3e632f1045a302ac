//! Fallback send-queue file.
//!
//! When the worker cannot reach the chat through its own session it appends
//! lines to this file instead; the relay forwards them after the run.

use std::{io, path::PathBuf};

/// Append-only file the worker writes status lines to.
#[derive(Debug, Clone)]
pub struct SendQueue {
    path: PathBuf,
}

impl SendQueue {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub const fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Truncate the file, creating it if needed.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub async fn clear(&self) -> io::Result<()> {
        tokio::fs::write(&self.path, "").await
    }

    /// Take every non-empty line and truncate the file.
    ///
    /// A missing file yields no lines.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or truncated.
    pub async fn drain(&self) -> io::Result<Vec<String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let lines = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect();
        self.clear().await?;
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_returns_lines_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let queue = SendQueue::new(dir.path().join(".vibe-send-queue"));
        tokio::fs::write(queue.path(), "[bot] one\n\n  two  \n").await.unwrap();

        assert_eq!(queue.drain().await.unwrap(), vec!["[bot] one", "two"]);
        assert_eq!(tokio::fs::read_to_string(queue.path()).await.unwrap(), "");
        assert!(queue.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let queue = SendQueue::new(dir.path().join("absent"));
        assert!(queue.drain().await.unwrap().is_empty());
        assert!(!queue.path().exists());
    }

    #[tokio::test]
    async fn test_clear_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let queue = SendQueue::new(dir.path().join("q"));
        queue.clear().await.unwrap();
        assert!(queue.path().exists());
    }
}
