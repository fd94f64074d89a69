//! The navigation stack and the input loop that drives its top context.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::Context;
use crate::error::{is_cancellation, ViewError};
use crate::view::View;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Lifecycle {
    Created = 0,
    Started = 1,
    Stopping = 2,
    Stopped = 3,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Started,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// A context on the stack together with its stop signal.
#[derive(Clone)]
pub struct ContextHandle {
    id: u64,
    token: CancellationToken,
    lifecycle: Arc<AtomicU8>,
    context: Arc<AsyncMutex<Context>>,
}

impl ContextHandle {
    fn new(id: u64, context: Context, token: CancellationToken) -> Self {
        Self {
            id,
            token,
            lifecycle: Arc::new(AtomicU8::new(Lifecycle::Created as u8)),
            context: Arc::new(AsyncMutex::new(context)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::SeqCst))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    async fn start(&self) -> Result<()> {
        let started = self.lifecycle.compare_exchange(
            Lifecycle::Created as u8,
            Lifecycle::Started as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if started.is_err() {
            return Ok(());
        }
        let mut context = self.context.lock().await;
        if self.token.is_cancelled() {
            return Ok(());
        }
        context.start(&self.token).await
    }

    /// Signals the context to stop. Returns false when it was already stopping.
    pub fn stop(&self) -> bool {
        let transitioned = self
            .lifecycle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < Lifecycle::Stopping as u8).then_some(Lifecycle::Stopping as u8)
            })
            .is_ok();
        if transitioned {
            self.token.cancel();
            self.lifecycle.store(Lifecycle::Stopped as u8, Ordering::SeqCst);
        }
        transitioned
    }
}

/// Owns the stack of contexts; only the top one receives input.
pub struct State {
    view: Arc<dyn View>,
    stack: Mutex<Vec<ContextHandle>>,
    shutdown: CancellationToken,
    next_id: AtomicU64,
}

impl State {
    pub fn new(view: Arc<dyn View>) -> Arc<Self> {
        Arc::new(Self {
            view,
            stack: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            next_id: AtomicU64::new(1),
        })
    }

    fn lock_stack(&self) -> MutexGuard<'_, Vec<ContextHandle>> {
        self.stack.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts `context` and makes it the top of the stack. The previous top
    /// stays started and resumes once this one is gone.
    pub async fn open(&self, context: Context) -> Result<ContextHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = ContextHandle::new(id, context, self.shutdown.child_token());
        if let Err(e) = handle.start().await {
            handle.stop();
            return Err(e);
        }
        self.lock_stack().push(handle.clone());
        if self.shutdown.is_cancelled() {
            self.shutdown();
        }
        debug!(context = id, depth = self.depth(), "context opened");
        Ok(handle)
    }

    /// Stops and pops the top context. Popping the root ends the session.
    pub fn back(&self) {
        let (popped, empty) = {
            let mut stack = self.lock_stack();
            let popped = stack.pop();
            (popped, stack.is_empty())
        };
        if let Some(handle) = popped {
            handle.stop();
            debug!(context = handle.id(), "context closed");
        }
        if empty {
            self.shutdown.cancel();
        }
    }

    /// Stops every context, top first, and ends the session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<ContextHandle> = self.lock_stack().drain(..).rev().collect();
        for handle in drained {
            handle.stop();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn depth(&self) -> usize {
        self.lock_stack().len()
    }

    pub fn top(&self) -> Option<ContextHandle> {
        self.lock_stack().last().cloned()
    }

    fn remove(&self, id: u64) {
        self.lock_stack().retain(|handle| handle.id() != id);
    }

    /// Feeds input lines to the top context until the stack is empty or the
    /// input ends.
    pub async fn run(&self) -> Result<()> {
        loop {
            let Some(handle) = self.top() else {
                break;
            };
            if handle.token().is_cancelled() {
                self.remove(handle.id());
                continue;
            }

            let mut context = handle.context.lock().await;
            let prompt = context.prompt();
            let input = match self.view.read_line(&prompt, &*context, handle.token()).await {
                Ok(input) => input,
                Err(ViewError::Cancelled) => continue,
                Err(ViewError::Closed) => {
                    self.shutdown();
                    break;
                }
                Err(e) => {
                    self.shutdown();
                    return Err(e.into());
                }
            };

            if let Err(e) = context.process(&input, handle.token()).await {
                self.report(&e, handle.token());
            }
        }
        debug!("session finished");
        Ok(())
    }

    fn report(&self, err: &anyhow::Error, token: &CancellationToken) {
        if is_cancellation(err) && token.is_cancelled() {
            debug!("command cancelled");
            return;
        }
        error!("command failed: {err:#}");
        self.view.write_line(&format!("Error: {err:#}"));
    }
}
