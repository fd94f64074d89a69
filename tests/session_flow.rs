use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use pwd_shell::clipboard::{Clipboard, ClipboardSink};
use pwd_shell::config::Settings;
use pwd_shell::context::{Context, Services, Session, SessionLock, State};
use pwd_shell::crypto::{Base64Encoder, KdfParams, PasswordCipher};
use pwd_shell::editor::ExternalEditor;
use pwd_shell::error::{RepositoryError, ViewError};
use pwd_shell::storage::Repository;
use pwd_shell::view::{parse_answer, Answer, Suggestions, View};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

const PASSWORD: &str = "Integration-1";

struct Script {
    lines: Mutex<VecDeque<String>>,
    printed: Mutex<Vec<String>>,
}

impl Script {
    fn new(lines: &[&str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().map(|s| s.to_string()).collect()),
            printed: Mutex::new(Vec::new()),
        }
    }

    fn printed(&self) -> Vec<String> {
        self.printed.lock().unwrap().clone()
    }

    fn next(&self, token: &CancellationToken) -> Result<String, ViewError> {
        if token.is_cancelled() {
            return Err(ViewError::Cancelled);
        }
        self.lines.lock().unwrap().pop_front().ok_or(ViewError::Closed)
    }
}

#[async_trait]
impl View for Script {
    fn write_line(&self, text: &str) {
        self.printed.lock().unwrap().push(text.to_string());
    }

    fn clear(&self) {}

    async fn read_line(
        &self,
        _prompt: &str,
        _suggestions: &(dyn Suggestions + Sync),
        token: &CancellationToken,
    ) -> Result<String, ViewError> {
        self.next(token)
    }

    async fn confirm(
        &self,
        _question: &str,
        default: Answer,
        token: &CancellationToken,
    ) -> Result<bool, ViewError> {
        Ok(parse_answer(&self.next(token)?, default))
    }

    async fn read_secret(
        &self,
        _prompt: &str,
        token: &CancellationToken,
    ) -> Result<Zeroizing<String>, ViewError> {
        self.next(token).map(Zeroizing::new)
    }
}

#[derive(Default)]
struct Sink(Mutex<Vec<String>>);

impl ClipboardSink for Sink {
    fn copy(&self, text: &str) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn repository(root: &std::path::Path, password: &str) -> Repository {
    Repository::with_cipher(
        root,
        Box::new(PasswordCipher::with_params(password, KdfParams::insecure_fast())),
        Box::new(Base64Encoder),
    )
}

/// Runs a whole session over `lines` and returns what it printed. Waits for
/// `copies` clipboard writes before the clipboard is disposed.
async fn run_session(
    root: &std::path::Path,
    sink: Arc<Sink>,
    copies: usize,
    lines: &[&str],
) -> Vec<String> {
    let view = Arc::new(Script::new(lines));
    let state = State::new(view.clone());
    let clipboard = Arc::new(Clipboard::new(sink.clone()));
    let services = Services {
        state: state.clone(),
        repository: Arc::new(repository(root, PASSWORD)),
        view: view.clone(),
        clipboard: clipboard.clone(),
        editor: Arc::new(ExternalEditor),
        lock: Arc::new(SessionLock::new(PASSWORD)),
        settings: Arc::new(Settings {
            repository_dir: root.to_path_buf(),
            clear_after: Duration::from_secs(30),
            editor: None,
        }),
    };
    state
        .open(Context::Session(Session::new(services)))
        .await
        .unwrap();
    state.run().await.unwrap();
    assert!(state.is_terminated());

    for _ in 0..1000 {
        if sink.0.lock().unwrap().len() >= copies {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    clipboard.dispose();
    view.printed()
}

#[tokio::test]
async fn create_open_copy_and_quit() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(Sink::default());
    let printed = run_session(
        dir.path(),
        sink.clone(),
        1,
        &[
            ".add web/mail",
            "user: bob",
            "password: ***",
            "",
            "web/mail",
            ".ccu",
            "..",
            ".quit",
        ],
    )
    .await;

    let stored = repository(dir.path(), PASSWORD).read("web/mail").unwrap();
    assert!(stored.starts_with("user: bob\npassword: "));
    assert_eq!(pwd_shell::content::field(&stored, "password").chars().count(), 20);
    assert!(printed.contains(&"'web/mail' has been saved.".to_string()));
    assert!(printed.contains(&"user: bob\npassword: ************\n".to_string()));
    assert_eq!(sink.0.lock().unwrap().first().map(String::as_str), Some("bob"));
}

#[tokio::test]
async fn errors_are_reported_and_the_session_continues() {
    let dir = TempDir::new().unwrap();
    repository(dir.path(), PASSWORD).write("a", "user: x\n").unwrap();
    let sink = Arc::new(Sink::default());
    let printed = run_session(dir.path(), sink, 0, &[".open missing", ".add a", ""]).await;

    let errors: Vec<&String> = printed.iter().filter(|l| l.starts_with("Error: ")).collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(printed.last().map(String::as_str), Some("a"));
}

#[tokio::test]
async fn rename_and_delete_inside_a_record() {
    let dir = TempDir::new().unwrap();
    let repo = repository(dir.path(), PASSWORD);
    repo.write("old", "password: p\n").unwrap();
    repo.write("doomed", "password: q\n").unwrap();
    let sink = Arc::new(Sink::default());
    run_session(
        dir.path(),
        sink,
        0,
        &["old", ".rename new/place", "..", "doomed", ".rm", "y", ".quit"],
    )
    .await;

    let names: Vec<String> = repo.list("").unwrap().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["new/place"]);
    assert_eq!(repo.read("new/place").unwrap().as_str(), "password: p\n");
}

#[tokio::test]
async fn wrong_password_cannot_read_records() {
    let dir = TempDir::new().unwrap();
    repository(dir.path(), PASSWORD).write("bank", "pin: 1").unwrap();
    let other = repository(dir.path(), "not-the-password");
    assert!(matches!(other.read("bank"), Err(RepositoryError::Decrypt(_))));
}
