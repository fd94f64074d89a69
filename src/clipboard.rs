use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub const DEFAULT_CLEAR_AFTER: Duration = Duration::from_secs(5);

/// Where clipboard text ends up.
pub trait ClipboardSink: Send + Sync + 'static {
    fn copy(&self, text: &str) -> Result<()>;
}

/// The OS clipboard through `arboard`, falling back to the usual helper
/// executables when no clipboard connection can be made.
#[derive(Default)]
pub struct SystemClipboard {
    // X11 and Wayland drop the content together with the owning handle
    native: Mutex<Option<arboard::Clipboard>>,
}

const HELPERS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("xsel", &["--clipboard", "--input"]),
    ("clip.exe", &[]),
];

fn copy_with_helper(program: &str, args: &[&str], text: &str) -> Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("{program} exited with {status}"))
    }
}

impl ClipboardSink for SystemClipboard {
    fn copy(&self, text: &str) -> Result<()> {
        let native_err = {
            let mut native = self.native.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if native.is_none() {
                *native = arboard::Clipboard::new().ok();
            }
            match native.as_mut().map(|c| c.set_text(text.to_string())) {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => e.to_string(),
                None => "no clipboard connection".to_string(),
            }
        };
        for (program, args) in HELPERS {
            match copy_with_helper(program, args, text) {
                Ok(()) => return Ok(()),
                Err(e) => debug!(helper = program, "clipboard helper failed: {e}"),
            }
        }
        Err(anyhow!("Cannot copy to the clipboard: {native_err}"))
    }
}

/// Single-writer channel to the clipboard.
///
/// Writes are applied by one worker in enqueue order, so a [`Clipboard::clear`]
/// issued after a [`Clipboard::put`] always wins. The auto-clear timer is a
/// single shot that every `put` rearms.
pub struct Clipboard {
    tx: Mutex<Option<UnboundedSender<Zeroizing<String>>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    token: CancellationToken,
    runtime: Handle,
}

impl Clipboard {
    /// Must be called from within a tokio runtime.
    pub fn new(sink: Arc<dyn ClipboardSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Zeroizing<String>>();
        let token = CancellationToken::new();
        let runtime = Handle::current();

        let worker_token = token.clone();
        runtime.spawn(async move {
            let warned = AtomicBool::new(false);
            loop {
                let text = tokio::select! {
                    _ = worker_token.cancelled() => break,
                    text = rx.recv() => match text {
                        Some(text) => text,
                        None => break,
                    },
                };
                // arboard and the helper executables block
                let writer = sink.clone();
                match tokio::task::spawn_blocking(move || writer.copy(&text)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) if warned.swap(true, Ordering::Relaxed) => {
                        debug!("clipboard write failed: {e}")
                    }
                    Ok(Err(e)) => warn!("{e}"),
                    Err(e) => debug!("clipboard write panicked: {e}"),
                }
            }
        });

        Self {
            tx: Mutex::new(Some(tx)),
            timer: Mutex::new(None),
            token,
            runtime,
        }
    }

    /// Copies `text` and schedules a clear after `clear_after`.
    pub fn put(&self, text: &str, clear_after: Duration) {
        let Some(tx) = self.sender() else {
            return;
        };
        if tx.send(Zeroizing::new(text.to_string())).is_err() {
            debug!("clipboard worker is gone");
        }
        self.rearm(Some(clear_after), tx);
    }

    /// Replaces the clipboard content with an empty string.
    pub fn clear(&self) {
        let Some(tx) = self.sender() else {
            return;
        };
        if tx.send(Zeroizing::new(String::new())).is_err() {
            debug!("clipboard worker is gone");
        }
        self.rearm(None, tx);
    }

    /// Stops the worker; later writes are dropped.
    pub fn dispose(&self) {
        self.token.cancel();
        self.lock_tx().take();
        if let Some(timer) = self.lock_timer().take() {
            timer.abort();
        }
    }

    fn sender(&self) -> Option<UnboundedSender<Zeroizing<String>>> {
        self.lock_tx().clone()
    }

    fn lock_tx(&self) -> std::sync::MutexGuard<'_, Option<UnboundedSender<Zeroizing<String>>>> {
        self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn rearm(&self, delay: Option<Duration>, tx: UnboundedSender<Zeroizing<String>>) {
        let mut timer = self.lock_timer();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        if let Some(delay) = delay {
            let token = self.token.clone();
            *timer = Some(self.runtime.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        tx.send(Zeroizing::new(String::new())).ok();
                    }
                }
            }));
        }
    }
}

impl Drop for Clipboard {
    fn drop(&mut self) {
        self.dispose();
    }
}
