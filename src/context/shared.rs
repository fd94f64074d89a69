//! Commands available in every context that hosts a command chain.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use super::{matching, Services, State};
use crate::command::{parse_command, CommandFactory, Command, DelegateCommand};
use crate::content::{generate_password, GENERATED_PASSWORD_LEN};
use crate::error::ViewError;
use crate::view::View;

/// Holds the repository password so a locked session can be resumed.
pub struct SessionLock {
    password: Zeroizing<String>,
}

impl SessionLock {
    pub fn new(password: &str) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
        }
    }

    pub fn verify(&self, candidate: &str) -> bool {
        candidate == self.password.as_str()
    }

    /// Hides the screen and asks for the password until it matches.
    pub async fn lock(&self, view: &dyn View, token: &CancellationToken) -> Result<(), ViewError> {
        view.clear();
        loop {
            let candidate = view.read_secret("Password: ", token).await?;
            if self.verify(&candidate) {
                view.clear();
                return Ok(());
            }
            view.write_line("Wrong password.");
        }
    }
}

struct Clear {
    view: Arc<dyn View>,
}

impl CommandFactory for Clear {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        match parse_command(input)? {
            ("clear", _) => {
                let view = self.view.clone();
                Some(DelegateCommand::new(move |_| async move {
                    view.clear();
                    Ok(())
                }))
            }
            _ => None,
        }
    }
}

struct Lock {
    view: Arc<dyn View>,
    lock: Arc<SessionLock>,
}

impl CommandFactory for Lock {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        match parse_command(input)? {
            ("lock", _) => {
                let view = self.view.clone();
                let lock = self.lock.clone();
                Some(DelegateCommand::new(move |token| async move {
                    lock.lock(view.as_ref(), &token).await?;
                    Ok(())
                }))
            }
            _ => None,
        }
    }
}

struct Pwd {
    view: Arc<dyn View>,
}

impl CommandFactory for Pwd {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        match parse_command(input)? {
            ("pwd", _) => {
                let view = self.view.clone();
                Some(DelegateCommand::new(move |_| async move {
                    let password = Zeroizing::new(generate_password(GENERATED_PASSWORD_LEN));
                    view.write_line(&password);
                    Ok(())
                }))
            }
            _ => None,
        }
    }
}

struct Quit {
    state: Arc<State>,
}

impl CommandFactory for Quit {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>> {
        match parse_command(input)? {
            ("quit", _) => {
                let state = self.state.clone();
                Some(DelegateCommand::new(move |_| async move {
                    state.shutdown();
                    Ok(())
                }))
            }
            _ => None,
        }
    }
}

const COMMANDS: &[&str] = &[".clear", ".lock", ".pwd", ".quit"];

/// Completions for a context's own dot commands together with the shared ones.
pub(super) fn command_suggestions(commands: &[&str], input: &str) -> Vec<String> {
    let mut found = matching(commands, input);
    found.extend(matching(COMMANDS, input));
    found.sort();
    found
}

pub(super) fn factories(services: &Services) -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Clear {
            view: services.view.clone(),
        }),
        Box::new(Lock {
            view: services.view.clone(),
            lock: services.lock.clone(),
        }),
        Box::new(Pwd {
            view: services.view.clone(),
        }),
        Box::new(Quit {
            state: services.state.clone(),
        }),
    ]
}
