use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zeroize::Zeroizing;

use super::{matching, Services};
use crate::content::{generate_password, GENERATED_PASSWORD_LEN};
use crate::error::RepositoryError;

const HELP: &str = include_str!("../../res/new_file_help.txt");

const SUGGESTIONS: &[&str] = &[".help", ".quit", "user", "password"];

/// Typed in a draft line, replaced by a freshly generated password.
pub const PASSWORD_PLACEHOLDER: &str = "***";

/// Collects the lines of a record that does not exist yet.
pub struct NewFile {
    services: Services,
    name: String,
    draft: Zeroizing<String>,
}

impl NewFile {
    pub fn new(services: Services, name: String) -> Self {
        Self {
            services,
            name,
            draft: Zeroizing::new(String::new()),
        }
    }

    pub async fn start(&mut self, _token: &CancellationToken) -> Result<()> {
        self.services.view.write_line(&format!(
            "New record '{}'. Type its lines, an empty line saves it, .help for more.",
            self.name
        ));
        Ok(())
    }

    pub fn prompt(&self) -> String {
        format!("+{}", self.name)
    }

    pub fn suggestions(&self, input: &str) -> Vec<String> {
        matching(SUGGESTIONS, input)
    }

    pub async fn process(&mut self, input: &str, _token: &CancellationToken) -> Result<()> {
        let line = input.trim_end();
        match line.trim() {
            "" => self.commit(),
            ".quit" => {
                self.draft = Zeroizing::new(String::new());
                self.services.view.write_line("Discarded.");
                self.services.state.back();
                Ok(())
            }
            ".help" => {
                self.services.view.write_line(HELP.trim_end());
                Ok(())
            }
            _ => {
                self.draft.push_str(&fill_placeholders(line));
                self.draft.push('\n');
                Ok(())
            }
        }
    }

    fn commit(&mut self) -> Result<()> {
        let services = &self.services;
        let Some(location) = services.repository.try_parse_location(&self.name) else {
            debug!(record = %self.name, "draft discarded, invalid name");
            services.state.back();
            return Ok(());
        };
        if self.draft.is_empty() {
            services.view.write_line("Nothing to save.");
            services.state.back();
            return Ok(());
        }
        if services.repository.get(&location).is_some() {
            return Err(RepositoryError::AlreadyExists(location).into());
        }
        services.repository.write(&location, &self.draft)?;
        services.view.write_line(&format!("'{location}' has been saved."));
        services.state.back();
        Ok(())
    }
}

/// Each placeholder gets its own password.
fn fill_placeholders(line: &str) -> Zeroizing<String> {
    let mut parts = line.split(PASSWORD_PLACEHOLDER);
    let mut filled = Zeroizing::new(parts.next().unwrap_or_default().to_string());
    for part in parts {
        filled.push_str(&generate_password(GENERATED_PASSWORD_LEN));
        filled.push_str(part);
    }
    filled
}
