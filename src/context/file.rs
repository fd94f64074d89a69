//! An opened record: shows it masked, copies fields, edits and persists it.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zeroize::Zeroizing;

use super::{shared, Services};
use crate::command::{dispatch, parse_command, CommandFactory};
use crate::content::{check, field, field_names, obscure};
use crate::editor::resolve_program;
use crate::error::{EditorError, RepositoryError};
use crate::view::Answer;

const COMMANDS: &[&str] = &[
    ".archive",
    ".cc",
    ".ccp",
    ".ccu",
    ".check",
    ".edit",
    ".rename",
    ".rm",
    ".save",
    ".unobscured",
];

const NOT_SAVED: &str = "The content is not saved. Save it?";

pub struct File {
    services: Services,
    name: String,
    content: Zeroizing<String>,
    modified: bool,
    shared: Vec<Box<dyn CommandFactory>>,
}

impl File {
    pub fn new(services: Services, name: String, content: Zeroizing<String>) -> Self {
        let shared = shared::factories(&services);
        Self {
            services,
            name,
            content,
            modified: false,
            shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub async fn start(&mut self, _token: &CancellationToken) -> Result<()> {
        debug!(record = %self.name, "record opened");
        self.show();
        Ok(())
    }

    pub fn prompt(&self) -> String {
        if self.modified {
            format!("*{}", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn suggestions(&self, input: &str) -> Vec<String> {
        if let Some(partial) = input.strip_prefix(".cc ") {
            let partial = partial.to_lowercase();
            return field_names(&self.content)
                .into_iter()
                .filter(|name| name.to_lowercase().starts_with(&partial))
                .map(|name| format!(".cc {name}"))
                .collect();
        }
        if input.starts_with('.') {
            return shared::command_suggestions(COMMANDS, input);
        }
        Vec::new()
    }

    pub async fn process(&mut self, input: &str, token: &CancellationToken) -> Result<()> {
        let input = input.trim();
        let Some((command, argument)) = parse_command(input) else {
            self.show();
            return Ok(());
        };
        match command {
            "." => self.close(token).await,
            "archive" => self.archive(),
            "cc" => self.copy_field(argument),
            "ccu" => self.copy_field("user"),
            "ccp" => self.copy_field("password"),
            "check" => {
                let message = check(&self.content)
                    .unwrap_or_else(|| "The content is well formed.".to_string());
                self.services.view.write_line(&message);
                Ok(())
            }
            "edit" => self.edit(argument, token).await,
            "quit" => self.quit(token).await,
            "rename" => self.rename(argument, token).await,
            "rm" => self.remove(token).await,
            "save" => {
                self.save()?;
                self.services.view.write_line("Saved.");
                Ok(())
            }
            "unobscured" => {
                self.services.view.write_line(&self.content);
                Ok(())
            }
            _ => match dispatch(&self.shared, input) {
                Some(command) => command.execute(token.clone()).await,
                None => {
                    self.show();
                    Ok(())
                }
            },
        }
    }

    fn show(&self) {
        self.services.view.write_line(&obscure(&self.content));
    }

    fn save(&mut self) -> Result<()> {
        self.services.repository.write(&self.name, &self.content)?;
        self.modified = false;
        Ok(())
    }

    /// Offers to save pending changes. Declining keeps them in memory only.
    async fn save_if_confirmed(&mut self, token: &CancellationToken) -> Result<()> {
        if self.modified && self.services.view.confirm(NOT_SAVED, Answer::Yes, token).await? {
            self.save()?;
        }
        Ok(())
    }

    async fn close(&mut self, token: &CancellationToken) -> Result<()> {
        self.save_if_confirmed(token).await?;
        self.services.state.back();
        Ok(())
    }

    async fn quit(&mut self, token: &CancellationToken) -> Result<()> {
        self.save_if_confirmed(token).await?;
        self.services.state.shutdown();
        Ok(())
    }

    fn archive(&mut self) -> Result<()> {
        self.services.repository.archive(&self.name)?;
        self.services
            .view
            .write_line(&format!("'{}' has been archived.", self.name));
        self.services.state.back();
        Ok(())
    }

    fn copy_field(&self, name: &str) -> Result<()> {
        let services = &self.services;
        let value = Zeroizing::new(field(&self.content, name.trim()));
        if value.is_empty() {
            services.clipboard.clear();
            services.view.write_line("Clipboard cleared.");
            return Ok(());
        }
        let clear_after = services.settings.clear_after;
        services.clipboard.put(&value, clear_after);
        services.view.write_line(&format!(
            "Copied '{}', the clipboard clears in {}s.",
            name.trim(),
            clear_after.as_secs()
        ));
        Ok(())
    }

    async fn edit(&mut self, program: &str, token: &CancellationToken) -> Result<()> {
        let services = self.services.clone();
        let view = &services.view;
        let program = match resolve_program(program, services.settings.editor.as_deref()) {
            Ok(program) => program,
            Err(e) => {
                view.write_line(&e.to_string());
                return Ok(());
            }
        };
        let edited = match services.editor.edit(&program, &self.content, token).await {
            Ok(edited) => edited,
            Err(e @ EditorError::Start { .. }) => {
                view.write_line(&e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if *edited == *self.content {
            view.write_line("No changes.");
            return Ok(());
        }
        if !view.confirm("Update the content?", Answer::No, token).await? {
            view.write_line("Cancelled.");
            return Ok(());
        }
        self.content = edited;
        self.modified = true;
        self.save()?;
        self.show();
        Ok(())
    }

    async fn rename(&mut self, new_name: &str, token: &CancellationToken) -> Result<()> {
        let services = self.services.clone();
        let view = &services.view;
        if new_name.is_empty() {
            view.write_line("Usage: .rename <name>");
            return Ok(());
        }
        let target = services
            .repository
            .try_parse_location(new_name)
            .ok_or_else(|| RepositoryError::InvalidName(new_name.to_string()))?;
        if self.modified {
            let question = "The content is not saved. Save it and rename the file?";
            if !view.confirm(question, Answer::No, token).await? {
                view.write_line("Cancelled.");
                return Ok(());
            }
            self.save()?;
        }
        services.repository.rename(&self.name, &target)?;
        view.write_line(&format!("'{}' renamed to '{target}'.", self.name));
        self.name = target;
        Ok(())
    }

    async fn remove(&mut self, token: &CancellationToken) -> Result<()> {
        let services = self.services.clone();
        let view = &services.view;
        let question = format!("Delete '{}'?", self.name);
        if !view.confirm(&question, Answer::No, token).await? {
            view.write_line("Cancelled.");
            return Ok(());
        }
        services.repository.delete(&self.name)?;
        view.write_line(&format!("'{}' has been deleted.", self.name));
        services.state.back();
        Ok(())
    }
}
