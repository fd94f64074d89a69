//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::clipboard::{Clipboard, ClipboardSink};
use crate::config::Settings;
use crate::context::{Context, NewFile, Services, SessionLock, State};
use crate::crypto::{Base64Encoder, KdfParams, PasswordCipher};
use crate::editor::Editor;
use crate::error::{EditorError, ViewError};
use crate::storage::Repository;
use crate::view::{parse_answer, Answer, Suggestions, View};

/// Answers reads from a script and records everything written.
///
/// Lines, confirmations and secrets all come from the same queue. An empty
/// queue closes the input unless [`ScriptedView::hang_when_empty`] was
/// called, in which case reads wait for cancellation.
#[derive(Default)]
pub struct ScriptedView {
    inputs: Mutex<VecDeque<String>>,
    output: Mutex<Vec<String>>,
    clears: AtomicUsize,
    hang: AtomicBool,
}

impl ScriptedView {
    pub fn new(inputs: &[&str]) -> Self {
        Self {
            inputs: Mutex::new(inputs.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn hang_when_empty(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn output(&self) -> Vec<String> {
        self.output.lock().unwrap().clone()
    }

    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock().unwrap())
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    async fn next(&self, token: &CancellationToken) -> Result<String, ViewError> {
        if token.is_cancelled() {
            return Err(ViewError::Cancelled);
        }
        let next = self.inputs.lock().unwrap().pop_front();
        match next {
            Some(line) => Ok(line),
            None if self.hang.load(Ordering::SeqCst) => {
                token.cancelled().await;
                Err(ViewError::Cancelled)
            }
            None => Err(ViewError::Closed),
        }
    }
}

#[async_trait]
impl View for ScriptedView {
    fn write_line(&self, text: &str) {
        self.output.lock().unwrap().push(text.to_string());
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    async fn read_line(
        &self,
        _prompt: &str,
        _suggestions: &(dyn Suggestions + Sync),
        token: &CancellationToken,
    ) -> Result<String, ViewError> {
        self.next(token).await
    }

    async fn confirm(
        &self,
        _question: &str,
        default: Answer,
        token: &CancellationToken,
    ) -> Result<bool, ViewError> {
        Ok(parse_answer(&self.next(token).await?, default))
    }

    async fn read_secret(
        &self,
        _prompt: &str,
        token: &CancellationToken,
    ) -> Result<Zeroizing<String>, ViewError> {
        Ok(Zeroizing::new(self.next(token).await?))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    writes: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.writes.lock().unwrap().last().cloned()
    }

    /// Waits until at least `count` writes have landed, then returns them.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        for _ in 0..1000 {
            if self.writes.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.writes()
    }
}

impl ClipboardSink for RecordingSink {
    fn copy(&self, text: &str) -> Result<()> {
        self.writes.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Returns a canned edit, or the input unchanged when none was set.
#[derive(Default)]
pub struct ScriptedEditor {
    response: Mutex<Option<String>>,
    programs: Mutex<Vec<String>>,
}

impl ScriptedEditor {
    pub fn respond_with(&self, content: &str) {
        *self.response.lock().unwrap() = Some(content.to_string());
    }

    pub fn programs(&self) -> Vec<String> {
        self.programs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Editor for ScriptedEditor {
    async fn edit(
        &self,
        program: &str,
        content: &str,
        token: &CancellationToken,
    ) -> Result<Zeroizing<String>, EditorError> {
        if token.is_cancelled() {
            return Err(EditorError::Cancelled);
        }
        self.programs.lock().unwrap().push(program.to_string());
        let response = self.response.lock().unwrap().clone();
        Ok(Zeroizing::new(response.unwrap_or_else(|| content.to_string())))
    }
}

/// A repository in a temp dir wired to scripted services.
pub struct TestBed {
    pub dir: TempDir,
    pub services: Services,
    pub view: Arc<ScriptedView>,
    pub sink: Arc<RecordingSink>,
    pub editor: Arc<ScriptedEditor>,
}

impl TestBed {
    pub const PASSWORD: &'static str = "correct horse";

    /// Must be called inside a tokio runtime.
    pub fn new(inputs: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repository");
        std::fs::create_dir(&root).unwrap();

        let repository = Repository::with_cipher(
            &root,
            Box::new(PasswordCipher::with_params(
                Self::PASSWORD,
                KdfParams::insecure_fast(),
            )),
            Box::new(Base64Encoder),
        );
        let view = Arc::new(ScriptedView::new(inputs));
        let sink = Arc::new(RecordingSink::default());
        let editor = Arc::new(ScriptedEditor::default());
        let services = Services {
            state: State::new(view.clone()),
            repository: Arc::new(repository),
            view: view.clone(),
            clipboard: Arc::new(Clipboard::new(sink.clone())),
            editor: editor.clone(),
            lock: Arc::new(SessionLock::new(Self::PASSWORD)),
            settings: Arc::new(Settings {
                repository_dir: root,
                clear_after: Duration::from_secs(5),
                editor: None,
            }),
        };
        Self {
            dir,
            services,
            view,
            sink,
            editor,
        }
    }

    pub fn seed(&self, name: &str, content: &str) {
        self.services.repository.write(name, content).unwrap();
    }

    pub fn new_file(&self, name: &str) -> Context {
        Context::NewFile(NewFile::new(self.services.clone(), name.to_string()))
    }
}
