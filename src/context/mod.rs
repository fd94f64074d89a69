//! Interactive contexts: the session, an opened record and a record draft.

mod file;
mod new_file;
mod session;
mod shared;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::clipboard::Clipboard;
use crate::config::Settings;
use crate::editor::Editor;
use crate::storage::Repository;
use crate::view::{Suggestions, View};

pub use file::File;
pub use new_file::NewFile;
pub use session::Session;
pub use shared::SessionLock;
pub use state::{ContextHandle, Lifecycle, State};

/// Everything a context or command may touch.
#[derive(Clone)]
pub struct Services {
    pub state: Arc<State>,
    pub repository: Arc<Repository>,
    pub view: Arc<dyn View>,
    pub clipboard: Arc<Clipboard>,
    pub editor: Arc<dyn Editor>,
    pub lock: Arc<SessionLock>,
    pub settings: Arc<Settings>,
}

pub enum Context {
    Session(Session),
    File(File),
    NewFile(NewFile),
}

impl Context {
    pub async fn start(&mut self, token: &CancellationToken) -> Result<()> {
        match self {
            Context::Session(session) => session.start(token).await,
            Context::File(file) => file.start(token).await,
            Context::NewFile(draft) => draft.start(token).await,
        }
    }

    /// Handles one raw input line (without the line terminator).
    pub async fn process(&mut self, input: &str, token: &CancellationToken) -> Result<()> {
        match self {
            Context::Session(session) => session.process(input, token).await,
            Context::File(file) => file.process(input, token).await,
            Context::NewFile(draft) => draft.process(input, token).await,
        }
    }

    pub fn prompt(&self) -> String {
        match self {
            Context::Session(session) => session.prompt(),
            Context::File(file) => file.prompt(),
            Context::NewFile(draft) => draft.prompt(),
        }
    }
}

impl Suggestions for Context {
    fn suggestions(&self, input: &str) -> Vec<String> {
        match self {
            Context::Session(session) => session.suggestions(input),
            Context::File(file) => file.suggestions(input),
            Context::NewFile(draft) => draft.suggestions(input),
        }
    }
}

fn matching(candidates: &[&str], input: &str) -> Vec<String> {
    let input = input.to_lowercase();
    candidates
        .iter()
        .filter(|c| c.to_lowercase().starts_with(&input))
        .map(|c| c.to_string())
        .collect()
}
