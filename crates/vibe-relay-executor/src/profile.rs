//! Argument contracts for the supported agent CLIs.

use std::{fmt, path::Path, str::FromStr};

use vibe_relay_core::{BOT_PREFIX, ChatContext};

use crate::{CommandBuildError, CommandBuilder, CommandParts};

/// Default model for the Cursor agent.
pub const DEFAULT_CURSOR_MODEL: &str = "composer-1.5";

/// Environment variable pointing the worker at the fallback send queue.
pub const SEND_QUEUE_ENV: &str = "VIBE_SEND_QUEUE";

/// Which agent CLI runs the instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerProfile {
    /// `cursor agent`, resuming a persisted chat id.
    Cursor { model: String },
    /// `gemini`, resuming its latest session.
    Gemini,
}

/// Everything needed to spawn one worker run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub parts: CommandParts,
    pub env: Vec<(String, String)>,
}

impl WorkerProfile {
    /// Cursor profile with the default model.
    #[must_use]
    pub fn cursor() -> Self {
        Self::Cursor {
            model: DEFAULT_CURSOR_MODEL.to_string(),
        }
    }

    /// Whether runs need a persisted chat id in the context.
    #[must_use]
    pub const fn uses_persisted_chat(&self) -> bool {
        matches!(self, Self::Cursor { .. })
    }

    /// Command that creates a new worker chat and prints its id.
    #[must_use]
    pub fn create_chat_command(&self) -> Option<CommandBuilder> {
        match self {
            Self::Cursor { .. } => Some(CommandBuilder::new("cursor agent create-chat")),
            Self::Gemini => None,
        }
    }

    /// Build the invocation for one batch.
    ///
    /// # Errors
    /// Returns error if the profile needs a chat id the context lacks.
    pub fn invocation(
        &self,
        ctx: &ChatContext,
        instruction: &str,
        resume: bool,
        send_queue: Option<&Path>,
    ) -> Result<Invocation, CommandBuildError> {
        match self {
            Self::Cursor { model } => {
                let chat_id = ctx
                    .persisted_chat_id
                    .as_deref()
                    .ok_or(CommandBuildError::MissingChatId)?;
                let prompt = format!("Execute this instruction from Vibe.\n\nInstruction: {instruction}");
                let parts = CommandBuilder::new("cursor agent")
                    .flag("--model", model.as_str())
                    .params(["--print", "--approve-mcps", "--force"])
                    .flag("--sandbox", "disabled")
                    .flag("--workspace", ctx.workspace.display().to_string())
                    .flag("--resume", chat_id)
                    .build(&[prompt])?;
                Ok(Invocation {
                    parts,
                    env: Vec::new(),
                })
            }
            Self::Gemini => {
                let prompt = gemini_prompt(ctx, instruction, send_queue);
                let mut builder = CommandBuilder::new("gemini")
                    .flag("--prompt", prompt)
                    .flag("--approval-mode", "yolo")
                    .flag("--output-format", "text");
                if resume {
                    builder = builder.flag("--resume", "latest");
                }

                let mut env = vec![("GOOGLE_GENAI_USE_GCA".to_string(), "true".to_string())];
                if let Some(queue) = send_queue {
                    env.push((SEND_QUEUE_ENV.to_string(), queue.display().to_string()));
                }
                Ok(Invocation {
                    parts: builder.build(&[])?,
                    env,
                })
            }
        }
    }
}

fn gemini_prompt(ctx: &ChatContext, instruction: &str, send_queue: Option<&Path>) -> String {
    let dialog = &ctx.dialog_id;
    let mut prompt = format!(
        "REQUIRED: Report back to this chat. Use the send_message tool with entity=\"{dialog}\" \
         and no other entity."
    );
    if let Some(queue) = send_queue {
        let name = queue
            .file_name()
            .map_or_else(|| queue.display().to_string(), |n| n.to_string_lossy().into_owned());
        prompt.push_str(&format!(
            " If the tool is missing or times out, append to the fallback file instead:\n  \
             echo \"{BOT_PREFIX} your message\" >> {name}\n\
             The relay forwards {name} to the chat after you finish."
        ));
    }
    prompt.push_str(&format!(
        "\nPrefix every message with \"{BOT_PREFIX}\". Send progress updates, findings and a \
         completion note.\n\nExecute this instruction:\n\n{instruction}"
    ));
    prompt
}

impl FromStr for WorkerProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cursor" => Ok(Self::cursor()),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown worker '{other}', expected 'cursor' or 'gemini'")),
        }
    }
}

impl fmt::Display for WorkerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cursor { .. } => f.write_str("cursor"),
            Self::Gemini => f.write_str("gemini"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use vibe_relay_core::DialogId;

    use super::*;

    fn ctx() -> ChatContext {
        ChatContext::new(DialogId::Numeric(-42), PathBuf::from("/work"))
    }

    #[test]
    fn test_cursor_contract() {
        let inv = WorkerProfile::cursor()
            .invocation(&ctx().with_chat_id("chat-9"), "fix it", false, None)
            .unwrap();
        assert_eq!(inv.parts.program, "cursor");
        assert_eq!(
            inv.parts.args,
            vec![
                "agent",
                "--model",
                "composer-1.5",
                "--print",
                "--approve-mcps",
                "--force",
                "--sandbox",
                "disabled",
                "--workspace",
                "/work",
                "--resume",
                "chat-9",
                "Execute this instruction from Vibe.\n\nInstruction: fix it",
            ]
        );
        assert!(inv.env.is_empty());
    }

    #[test]
    fn test_cursor_requires_chat_id() {
        let err = WorkerProfile::cursor()
            .invocation(&ctx(), "fix it", true, None)
            .unwrap_err();
        assert!(matches!(err, CommandBuildError::MissingChatId));
    }

    #[test]
    fn test_gemini_resume_flag() {
        let fresh = WorkerProfile::Gemini.invocation(&ctx(), "x", false, None).unwrap();
        assert!(!fresh.parts.args.contains(&"--resume".to_string()));

        let resumed = WorkerProfile::Gemini.invocation(&ctx(), "x", true, None).unwrap();
        let tail = &resumed.parts.args[resumed.parts.args.len() - 2..];
        assert_eq!(tail, ["--resume", "latest"]);
    }

    #[test]
    fn test_gemini_prompt_and_env() {
        let queue = PathBuf::from("/work/.vibe-send-queue");
        let inv = WorkerProfile::Gemini
            .invocation(&ctx(), "ship it", false, Some(&queue))
            .unwrap();
        assert_eq!(inv.parts.program, "gemini");
        assert_eq!(inv.parts.args[0], "--prompt");
        let prompt = &inv.parts.args[1];
        assert!(prompt.contains("entity=\"-42\""));
        assert!(prompt.contains(">> .vibe-send-queue"));
        assert!(prompt.ends_with("Execute this instruction:\n\nship it"));
        assert!(inv.env.contains(&(SEND_QUEUE_ENV.to_string(), "/work/.vibe-send-queue".to_string())));
        assert!(inv.env.contains(&("GOOGLE_GENAI_USE_GCA".to_string(), "true".to_string())));
    }

    #[test]
    fn test_parse_profiles() {
        assert_eq!("Cursor".parse::<WorkerProfile>().unwrap(), WorkerProfile::cursor());
        assert_eq!("gemini".parse::<WorkerProfile>().unwrap(), WorkerProfile::Gemini);
        assert!("codex".parse::<WorkerProfile>().is_err());
        assert!(WorkerProfile::cursor().create_chat_command().is_some());
        assert!(WorkerProfile::Gemini.create_chat_command().is_none());
    }
}
