//! Command building utilities.

use std::{ffi::OsStr, path::PathBuf};

use thiserror::Error;

use crate::path::resolve_executable_path;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    NotFound(String),
    #[error("Worker needs a persisted chat id but none was provided")]
    MissingChatId,
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program against `search_path`.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn into_resolved(
        self,
        search_path: &OsStr,
    ) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program, search_path)
            .await
            .ok_or(CommandBuildError::NotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for constructing commands.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Base executable command, may contain a subcommand (`cursor agent`).
    pub base: String,
    /// Fixed flags appended after the base.
    pub params: Vec<String>,
}

impl CommandBuilder {
    /// Create a new command builder.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    /// Append parameters.
    #[must_use]
    pub fn params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Append a flag and its value.
    #[must_use]
    pub fn flag(self, name: &str, value: impl Into<String>) -> Self {
        self.params([name.to_string(), value.into()])
    }

    /// Build the command, appending `trailing` after all parameters.
    ///
    /// # Errors
    /// Returns error if command is invalid.
    pub fn build(&self, trailing: &[String]) -> Result<CommandParts, CommandBuildError> {
        let mut parts =
            shlex::split(&self.base).ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        parts.extend(self.params.iter().cloned());
        parts.extend(trailing.iter().cloned());

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_with_subcommand() {
        let parts = CommandBuilder::new("cursor agent")
            .flag("--model", "composer-1.5")
            .params(["--print"])
            .build(&["do it".to_string()])
            .unwrap();
        assert_eq!(parts.program, "cursor");
        assert_eq!(parts.args, vec!["agent", "--model", "composer-1.5", "--print", "do it"]);
    }

    #[test]
    fn test_quoted_base() {
        let parts = CommandBuilder::new("'/opt/my tools/gemini'").build(&[]).unwrap();
        assert_eq!(parts.program, "/opt/my tools/gemini");
        assert!(parts.args.is_empty());
    }

    #[test]
    fn test_empty_and_invalid_base() {
        assert!(matches!(
            CommandBuilder::new("").build(&[]),
            Err(CommandBuildError::EmptyCommand)
        ));
        assert!(matches!(
            CommandBuilder::new("\"unterminated").build(&[]),
            Err(CommandBuildError::InvalidBase(_))
        ));
    }
}
