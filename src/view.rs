use std::io::Write;

use async_trait::async_trait;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::error::ViewError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

/// Completion candidates for a partially typed line.
pub trait Suggestions {
    fn suggestions(&self, input: &str) -> Vec<String>;
}

/// The terminal as seen by contexts and commands.
///
/// Every suspending call observes `token`; a cancelled token yields
/// [`ViewError::Cancelled`] and nothing is consumed on its behalf.
#[async_trait]
pub trait View: Send + Sync {
    fn write_line(&self, text: &str);

    fn clear(&self);

    async fn read_line(
        &self,
        prompt: &str,
        suggestions: &(dyn Suggestions + Sync),
        token: &CancellationToken,
    ) -> Result<String, ViewError>;

    async fn confirm(
        &self,
        question: &str,
        default: Answer,
        token: &CancellationToken,
    ) -> Result<bool, ViewError>;

    async fn read_secret(
        &self,
        prompt: &str,
        token: &CancellationToken,
    ) -> Result<Zeroizing<String>, ViewError>;
}

pub fn parse_answer(input: &str, default: Answer) -> bool {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default == Answer::Yes,
    }
}

/// Line oriented stdin/stdout view. A line ending in a tab prints the
/// completion candidates for the text before it and asks again.
pub struct ConsoleView {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn next_line(&self, token: &CancellationToken) -> Result<String, ViewError> {
        let mut lines = self.lines.lock().await;
        tokio::select! {
            _ = token.cancelled() => Err(ViewError::Cancelled),
            line = lines.next_line() => match line? {
                Some(line) => Ok(line),
                None => Err(ViewError::Closed),
            },
        }
    }
}

impl Default for ConsoleView {
    fn default() -> Self {
        Self::new()
    }
}

fn print_prompt(prompt: &str) {
    print!("{prompt}");
    std::io::stdout().flush().ok();
}

#[async_trait]
impl View for ConsoleView {
    fn write_line(&self, text: &str) {
        println!("{text}");
    }

    fn clear(&self) {
        execute!(std::io::stdout(), Clear(ClearType::All), MoveTo(0, 0)).ok();
    }

    async fn read_line(
        &self,
        prompt: &str,
        suggestions: &(dyn Suggestions + Sync),
        token: &CancellationToken,
    ) -> Result<String, ViewError> {
        loop {
            print_prompt(&format!("{prompt}> "));
            let line = self.next_line(token).await?;
            let Some(partial) = line.strip_suffix('\t') else {
                return Ok(line);
            };
            let candidates = suggestions.suggestions(partial);
            if !candidates.is_empty() {
                println!("{}", candidates.join("  "));
            }
        }
    }

    async fn confirm(
        &self,
        question: &str,
        default: Answer,
        token: &CancellationToken,
    ) -> Result<bool, ViewError> {
        let hint = match default {
            Answer::Yes => "(Y/n)",
            Answer::No => "(y/N)",
        };
        print_prompt(&format!("{question} {hint} "));
        let line = self.next_line(token).await?;
        Ok(parse_answer(&line, default))
    }

    async fn read_secret(
        &self,
        prompt: &str,
        token: &CancellationToken,
    ) -> Result<Zeroizing<String>, ViewError> {
        let prompt = prompt.to_string();
        let task = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt));
        tokio::select! {
            _ = token.cancelled() => Err(ViewError::Cancelled),
            joined = task => {
                let secret = joined.map_err(std::io::Error::other)??;
                Ok(Zeroizing::new(secret))
            }
        }
    }
}
