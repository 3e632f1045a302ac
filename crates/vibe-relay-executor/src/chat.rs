//! Persisted worker chat id.

use std::{path::PathBuf, process::Stdio};

use vibe_relay_core::ExecutorError;

use crate::{CommandBuilder, path::worker_path};

/// File in the workspace holding the worker-side chat id.
#[derive(Debug, Clone)]
pub struct ChatStore {
    path: PathBuf,
}

impl ChatStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Stored chat id, if the file exists and is not blank.
    pub async fn load(&self) -> Option<String> {
        let raw = tokio::fs::read_to_string(&self.path).await.ok()?;
        let id = raw.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    /// Persist `chat_id`.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub async fn save(&self, chat_id: &str) -> Result<(), ExecutorError> {
        tokio::fs::write(&self.path, chat_id).await?;
        Ok(())
    }

    /// Stored chat id, or a new one from `create` which is then persisted.
    ///
    /// `create` must print the new id on stdout and exit 0.
    ///
    /// # Errors
    /// Returns error if the create command fails or prints nothing.
    pub async fn get_or_create(&self, create: &CommandBuilder) -> Result<String, ExecutorError> {
        if let Some(id) = self.load().await {
            return Ok(id);
        }

        let search_path = worker_path(&std::env::var_os("PATH").unwrap_or_default());
        let (program, args) = create
            .build(&[])
            .map_err(|e| ExecutorError::CommandBuild(e.to_string()))?
            .into_resolved(&search_path)
            .await
            .map_err(|e| ExecutorError::ExecutableNotFound(e.to_string()))?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .env("PATH", &search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(workspace) = self.path.parent().filter(|p| p.is_dir()) {
            cmd.current_dir(workspace);
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(ExecutorError::ChatCreation(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let chat_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if chat_id.is_empty() {
            return Err(ExecutorError::ChatCreation("create command printed no chat id".into()));
        }

        self.save(&chat_id).await?;
        tracing::info!(chat_id, path = %self.path.display(), "Created worker chat");
        Ok(chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existing_id_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::new(dir.path().join(".vibe-agent-chat"));
        store.save("chat-1\n").await.unwrap();

        let create = CommandBuilder::new("sh").params(["-c", "exit 1"]);
        assert_eq!(store.get_or_create(&create).await.unwrap(), "chat-1");
    }

    #[tokio::test]
    async fn test_blank_file_creates_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::new(dir.path().join(".vibe-agent-chat"));
        store.save("  ").await.unwrap();

        let create = CommandBuilder::new("sh").params(["-c", "echo fresh-chat"]);
        assert_eq!(store.get_or_create(&create).await.unwrap(), "fresh-chat");
        assert_eq!(store.load().await.as_deref(), Some("fresh-chat"));
    }

    #[tokio::test]
    async fn test_failed_create_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::new(dir.path().join(".vibe-agent-chat"));

        let create = CommandBuilder::new("sh").params(["-c", "echo nope >&2; exit 3"]);
        let err = store.get_or_create(&create).await.unwrap_err();
        assert!(matches!(err, ExecutorError::ChatCreation(msg) if msg == "nope"));
        assert!(store.load().await.is_none());
    }
}
