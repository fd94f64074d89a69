use thiserror::Error;

/// Failures reported by [`crate::storage::Repository`].
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("'{0}' not found")]
    NotFound(String),

    #[error("'{0}' already exists")]
    AlreadyExists(String),

    #[error("cannot decrypt '{0}': wrong password or corrupted record")]
    Decrypt(String),

    #[error("invalid record name: '{0}'")]
    InvalidName(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("encryption failed")]
    Encrypt,

    /// Authentication tag mismatch, truncated payload or bad encoding.
    #[error("decryption failed")]
    Decrypt,
}

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("cancelled")]
    Cancelled,

    #[error("input closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("the editor is not specified and the environment variable EDITOR is not set")]
    NotConfigured,

    #[error("starting the editor '{program}' failed: {source}")]
    Start {
        program: String,
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// True when `err` is the graceful stop signal rather than a failure.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(cause.downcast_ref::<ViewError>(), Some(ViewError::Cancelled))
            || matches!(cause.downcast_ref::<EditorError>(), Some(EditorError::Cancelled))
    })
}
