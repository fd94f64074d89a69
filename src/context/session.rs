//! The root context: records are opened, created and managed from here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zeroize::Zeroize;

use super::{shared, Context, File, NewFile, Services};
use crate::command::{dispatch, parse_command, Command, CommandFactory, DelegateCommand};
use crate::error::RepositoryError;
use crate::storage::{atomic_write, restrict_file, ItemState};
use crate::view::Answer;

const HELP: &str = include_str!("../../res/session_help.txt");

const COMMANDS: &[&str] = &[
    ".add", ".archive", ".archived", ".export", ".help", ".open", ".restore",
];

pub struct Session {
    services: Services,
    factories: Vec<Box<dyn CommandFactory>>,
}

impl Session {
    /// The standard command chain. Named commands come before the bare-path
    /// handler so a record called like a command can never shadow it.
    pub fn new(services: Services) -> Self {
        let mut factories: Vec<Box<dyn CommandFactory>> = vec![
            Box::new(Add {
                services: services.clone(),
            }),
            Box::new(Archive {
                services: services.clone(),
            }),
            Box::new(Archived {
                services: services.clone(),
            }),
            Box::new(Export {
                services: services.clone(),
            }),
            Box::new(Help {
                services: services.clone(),
            }),
            Box::new(Open {
                services: services.clone(),
            }),
            Box::new(Restore {
                services: services.clone(),
            }),
        ];
        factories.extend(shared::factories(&services));
        factories.push(Box::new(OpenPath {
            services: services.clone(),
        }));
        Self::with_factories(services, factories)
    }

    pub fn with_factories(services: Services, factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            services,
            factories,
        }
    }

    pub async fn start(&mut self, _token: &CancellationToken) -> Result<()> {
        info!(root = %self.services.repository.root().display(), "session started");
        Ok(())
    }

    /// Runs the first command that recognizes `input`; anything else is ignored.
    pub async fn process(&mut self, input: &str, token: &CancellationToken) -> Result<()> {
        let input = input.trim();
        let Some(command) = dispatch(&self.factories, input) else {
            return Ok(());
        };
        command.execute(token.clone()).await
    }

    pub fn prompt(&self) -> String {
        String::new()
    }

    /// Record paths for plain input, command names for dot input and
    /// archived names after `.restore`.
    pub fn suggestions(&self, input: &str) -> Vec<String> {
        if let Some(partial) = input.strip_prefix(".restore ") {
            return self
                .services
                .repository
                .archived()
                .unwrap_or_default()
                .into_iter()
                .filter(|item| item.name.starts_with(partial))
                .map(|item| format!(".restore {}", item.name))
                .collect();
        }
        if input.starts_with('.') {
            return shared::command_suggestions(COMMANDS, input);
        }
        let folder = input.rfind('/').map(|p| &input[..p]).unwrap_or("");
        self.services
            .repository
            .list(folder)
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.name)
            .filter(|name| name.starts_with(input))
            .collect()
    }
}

async fn open_record(services: Services, name: String) -> Result<()> {
    let content = services.repository.read(&name)?;
    let file = File::new(services.clone(), name, content);
    services.state.open(Context::File(file)).await?;
    Ok(())
}

struct Add {
    services: Services,
}

impl CommandFactory for Add {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        let ("add", name) = parse_command(input)? else {
            return None;
        };
        let services = self.services.clone();
        let name = name.to_string();
        Some(DelegateCommand::new(move |_| async move {
            let repository = &services.repository;
            let Some(location) = repository.try_parse_location(&name) else {
                services.view.write_line(&format!("Invalid name '{name}'."));
                return Ok(());
            };
            if repository.get(&location).is_some() {
                return Err(RepositoryError::AlreadyExists(location).into());
            }
            let draft = NewFile::new(services.clone(), name);
            services.state.open(Context::NewFile(draft)).await?;
            Ok(())
        }))
    }
}

struct Archive {
    services: Services,
}

impl CommandFactory for Archive {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        let ("archive", name) = parse_command(input)? else {
            return None;
        };
        let services = self.services.clone();
        let name = name.to_string();
        Some(DelegateCommand::new(move |_| async move {
            if name.is_empty() {
                services.view.write_line("Usage: .archive <name>");
                return Ok(());
            }
            services.repository.archive(&name)?;
            services.view.write_line(&format!("'{name}' has been archived."));
            Ok(())
        }))
    }
}

struct Archived {
    services: Services,
}

impl CommandFactory for Archived {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        let ("archived", _) = parse_command(input)? else {
            return None;
        };
        let services = self.services.clone();
        Some(DelegateCommand::new(move |_| async move {
            let items = services.repository.archived()?;
            if items.is_empty() {
                services.view.write_line("No archived records.");
            }
            for item in items {
                services.view.write_line(&item.name);
            }
            Ok(())
        }))
    }
}

struct Restore {
    services: Services,
}

impl CommandFactory for Restore {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        let ("restore", name) = parse_command(input)? else {
            return None;
        };
        let services = self.services.clone();
        let name = name.to_string();
        Some(DelegateCommand::new(move |_| async move {
            if name.is_empty() {
                services.view.write_line("Usage: .restore <name>");
                return Ok(());
            }
            services.repository.restore(&name)?;
            services.view.write_line(&format!("'{name}' has been restored."));
            Ok(())
        }))
    }
}

struct Export {
    services: Services,
}

impl CommandFactory for Export {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        let ("export", path) = parse_command(input)? else {
            return None;
        };
        let services = self.services.clone();
        let path = PathBuf::from(path);
        Some(DelegateCommand::new(move |token| async move {
            let view = &services.view;
            if path.as_os_str().is_empty() {
                view.write_line("Usage: .export <path>");
                return Ok(());
            }
            let question = format!(
                "Export all records UNENCRYPTED to '{}'?",
                path.display()
            );
            if !view.confirm(&question, Answer::No, &token).await? {
                view.write_line("Cancelled.");
                return Ok(());
            }

            let mut records = BTreeMap::new();
            for item in services.repository.list("")? {
                let content = services.repository.read(&item.name)?;
                records.insert(item.name, content.to_string());
            }
            let mut data = serde_json::to_string_pretty(&records)?;
            let written = atomic_write(&path, data.as_bytes()).and_then(|_| restrict_file(&path));
            data.zeroize();
            for content in records.values_mut() {
                content.zeroize();
            }
            written?;
            view.write_line(&format!(
                "{} record(s) exported to '{}'.",
                records.len(),
                path.display()
            ));
            Ok(())
        }))
    }
}

struct Help {
    services: Services,
}

impl CommandFactory for Help {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        let ("help", _) = parse_command(input)? else {
            return None;
        };
        let view = self.services.view.clone();
        Some(DelegateCommand::new(move |_| async move {
            view.write_line(HELP.trim_end());
            Ok(())
        }))
    }
}

struct Open {
    services: Services,
}

impl CommandFactory for Open {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        let ("open", name) = parse_command(input)? else {
            return None;
        };
        let services = self.services.clone();
        let name = name.to_string();
        Some(DelegateCommand::new(move |_| async move {
            let repository = &services.repository;
            match repository.get(&name) {
                Some(item) => open_record(services, item.name).await,
                None if repository.state(&name) == ItemState::Archived => {
                    services
                        .view
                        .write_line(&format!("'{name}' is archived, use .restore {name}"));
                    Ok(())
                }
                None => Err(RepositoryError::NotFound(name).into()),
            }
        }))
    }
}

/// Bare input: opens the record of that name, otherwise lists the records
/// whose path starts with it. An empty line lists everything.
struct OpenPath {
    services: Services,
}

impl CommandFactory for OpenPath {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        let input = input.trim();
        if input.starts_with('.') {
            return None;
        }
        let services = self.services.clone();
        let input = input.to_string();
        Some(DelegateCommand::new(move |_| async move {
            if let Some(item) = services.repository.get(&input) {
                return open_record(services, item.name).await;
            }
            let folder = input.rfind('/').map(|p| &input[..p]).unwrap_or("");
            let items = match services.repository.list(folder) {
                Ok(items) => items,
                Err(RepositoryError::InvalidName(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            for item in items.iter().filter(|item| item.name.starts_with(input.as_str())) {
                services.view.write_line(&item.name);
            }
            Ok(())
        }))
    }
}
