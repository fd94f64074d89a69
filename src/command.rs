use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One resolved user action.
#[async_trait]
pub trait Command: Send {
    async fn execute(self: Box<Self>, token: CancellationToken) -> Result<()>;
}

/// Maps raw input to zero or one command. `None` means "not mine".
pub trait CommandFactory: Send + Sync {
    fn parse(&self, input: &str) -> Option<Box<dyn Command>>;
}

pub type BoxFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A command backed by a closure.
pub struct DelegateCommand {
    action: Box<dyn FnOnce(CancellationToken) -> BoxFuture + Send>,
}

impl DelegateCommand {
    pub fn new<F, Fut>(action: F) -> Box<dyn Command>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Box::new(Self {
            action: Box::new(move |token| Box::pin(action(token))),
        })
    }
}

#[async_trait]
impl Command for DelegateCommand {
    async fn execute(self: Box<Self>, token: CancellationToken) -> Result<()> {
        (self.action)(token).await
    }
}

/// Tries `factories` strictly in order; the first that recognizes `input` wins.
pub fn dispatch(factories: &[Box<dyn CommandFactory>], input: &str) -> Option<Box<dyn Command>> {
    factories.iter().find_map(|factory| factory.parse(input))
}

/// `.name argument` split into its parts; `None` for input that is not a
/// dot command.
pub fn parse_command(input: &str) -> Option<(&str, &str)> {
    let rest = input.trim().strip_prefix('.')?;
    match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => Some((name, argument.trim())),
        None => Some((rest, "")),
    }
}
