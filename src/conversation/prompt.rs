//! Prompt assembly: system instruction followed by the user's bounded history.

use crate::actors::ConversationHandle;
use crate::core::turn::{ConversationHistory, ConversationTurn};
use crate::error::RelayError;
use anyhow::Result;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Plain-text system instruction, re-read on every prompt so edits apply
/// without a restart.
#[derive(Debug, Clone)]
pub struct InstructionsFile {
    path: PathBuf,
    fallback: String,
}

impl InstructionsFile {
    pub fn new(path: impl Into<PathBuf>, fallback: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fallback: fallback.into(),
        }
    }

    /// Invalid UTF-8 sequences are replaced rather than rejected.
    pub async fn read(&self) -> Result<String, RelayError> {
        let bytes = fs::read(&self.path)
            .await
            .map_err(|source| RelayError::InstructionsRead {
                path: self.path.clone(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// File contents verbatim, or the fallback instruction.
    pub async fn current(&self) -> String {
        match self.read().await {
            Ok(text) => text,
            Err(RelayError::InstructionsRead { source, .. })
                if source.kind() == ErrorKind::NotFound =>
            {
                tracing::debug!("No instructions file at {:?}, using fallback", self.path);
                self.fallback.clone()
            }
            Err(e) => {
                tracing::warn!("{}; using fallback instruction", e);
                self.fallback.clone()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    instructions: InstructionsFile,
}

impl PromptAssembler {
    pub fn new(instructions: InstructionsFile) -> Self {
        Self { instructions }
    }

    pub async fn assemble(&self, context: ConversationHistory) -> Vec<ConversationTurn> {
        let mut prompt = Vec::with_capacity(context.len() + 1);
        prompt.push(ConversationTurn::system(self.instructions.current().await));
        prompt.extend(context);
        prompt
    }

    pub async fn build_prompt(
        &self,
        user_id: &str,
        conversations: &ConversationHandle,
    ) -> Result<Vec<ConversationTurn>> {
        let context = conversations.get_context(user_id).await?;
        Ok(self.assemble(context).await)
    }
}
