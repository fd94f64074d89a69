use std::io::Write;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::EditorError;

pub const EDITOR_VAR: &str = "EDITOR";

/// Resolves the editor command: explicit argument, then `$EDITOR`, then the
/// configured fallback.
pub fn resolve_program(explicit: &str, configured: Option<&str>) -> Result<String, EditorError> {
    let explicit = explicit.trim();
    if !explicit.is_empty() {
        return Ok(explicit.to_string());
    }
    if let Ok(from_env) = std::env::var(EDITOR_VAR) {
        if !from_env.trim().is_empty() {
            return Ok(from_env.trim().to_string());
        }
    }
    configured
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .ok_or(EditorError::NotConfigured)
}

/// Lets the user edit `content` in another program and returns the result.
#[async_trait]
pub trait Editor: Send + Sync {
    async fn edit(
        &self,
        program: &str,
        content: &str,
        token: &CancellationToken,
    ) -> Result<Zeroizing<String>, EditorError>;
}

/// Runs `program <tempfile>` and waits for it to exit. On cancellation the
/// editor process is killed and its output discarded.
#[derive(Debug, Default)]
pub struct ExternalEditor;

#[async_trait]
impl Editor for ExternalEditor {
    async fn edit(
        &self,
        program: &str,
        content: &str,
        token: &CancellationToken,
    ) -> Result<Zeroizing<String>, EditorError> {
        let mut file = tempfile::Builder::new().prefix("pwd-shell-").tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        let mut words = program.split_whitespace();
        let executable = words.next().ok_or(EditorError::NotConfigured)?;
        let mut child = tokio::process::Command::new(executable)
            .args(words)
            .arg(file.path())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EditorError::Start {
                program: executable.to_string(),
                source,
            })?;

        tokio::select! {
            _ = token.cancelled() => {
                child.kill().await.ok();
                return Err(EditorError::Cancelled);
            }
            status = child.wait() => {
                let status = status?;
                debug!(%status, "editor exited");
            }
        }

        let edited = tokio::fs::read_to_string(file.path()).await?;
        Ok(Zeroizing::new(edited))
    }
}
