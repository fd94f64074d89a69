use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use rpassword::prompt_password;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use crate::clipboard::{Clipboard, SystemClipboard};
use crate::config::{config_path, default_base_dir, ensure_repository_dir, load_config, save_config};
use crate::context::{Context, Services, Session, SessionLock, State};
use crate::editor::ExternalEditor;
use crate::error::RepositoryError;
use crate::storage::Repository;
use crate::view::ConsoleView;

pub const LOG_ENV: &str = "PWD_SHELL_LOG";

const UNLOCK_ATTEMPTS: usize = 3;

/// Terminal credential manager over a directory of encrypted records.
#[derive(Parser, Debug)]
#[command(name = "pwd-shell", version, about)]
pub struct Cli {
    /// Repository directory, overrides the config file
    #[arg(long, value_name = "DIR")]
    pub repository: Option<PathBuf>,

    /// Seconds before a copied value is cleared from the clipboard
    #[arg(long, value_name = "SECS")]
    pub clear_after: Option<u64>,

    /// Write the effective settings to the config file
    #[arg(long)]
    pub init_config: bool,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let base_dir = default_base_dir()?;
    let config_file = config_path()?;
    let mut config = load_config(&config_file)?;
    let settings = config.settings(&base_dir, cli.repository.as_deref(), cli.clear_after)?;
    if cli.init_config {
        config.repository_dir = Some(settings.repository_dir.clone());
        config.clear_after_secs = settings.clear_after.as_secs();
        save_config(&config_file, &config)?;
        println!("Config written to {}", config_file.display());
    }
    ensure_repository_dir(&settings.repository_dir)?;
    info!(repository = %settings.repository_dir.display(), "starting");

    let (repository, password) = unlock(&settings.repository_dir).await?;

    let view = Arc::new(ConsoleView::new());
    let state = State::new(view.clone());
    let clipboard = Arc::new(Clipboard::new(Arc::new(SystemClipboard::default())));
    let services = Services {
        state: state.clone(),
        repository: Arc::new(repository),
        view,
        clipboard: clipboard.clone(),
        editor: Arc::new(ExternalEditor),
        lock: Arc::new(SessionLock::new(&password)),
        settings: Arc::new(settings),
    };
    drop(password);

    state.open(Context::Session(Session::new(services))).await?;
    let result = state.run().await;
    clipboard.clear();
    clipboard.dispose();
    result
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Asks for the repository password. A new repository gets a confirmed
/// password; an existing one is checked against its first record.
async fn unlock(root: &std::path::Path) -> Result<(Repository, Zeroizing<String>)> {
    let first = Repository::create("", root).list("")?.into_iter().next();
    let Some(first) = first else {
        println!("The repository is empty. Choose a password for it.");
        let password = blocking(prompt_new_password).await?;
        return Ok((Repository::create(&password, root), password));
    };

    for _ in 0..UNLOCK_ATTEMPTS {
        let password = blocking(|| Ok(Zeroizing::new(prompt_password("Password: ")?))).await?;
        let repository = Repository::create(&password, root);
        match repository.read(&first.name) {
            Ok(_) => return Ok((repository, password)),
            Err(RepositoryError::Decrypt(_)) => println!("Wrong password."),
            Err(e) => return Err(e.into()),
        }
    }
    Err(anyhow!("Too many failed attempts"))
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn prompt_new_password() -> Result<Zeroizing<String>> {
    loop {
        let p1 = Zeroizing::new(prompt_password("Set a password: ")?);
        let p2 = Zeroizing::new(prompt_password("Confirm password: ")?);
        if *p1 != *p2 {
            println!("Passwords did not match, try again.");
            continue;
        }
        match validate_password(&p1) {
            Ok(()) => return Ok(p1),
            Err(e) => println!("{e}"),
        }
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        return Err(anyhow!("Password should be at least 8 characters."));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(anyhow!("Password should include at least one uppercase letter."));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(anyhow!("Password should include at least one number."));
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        return Err(anyhow!(
            "Password should include at least one special character."
        ));
    }
    Ok(())
}
