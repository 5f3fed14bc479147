use log::{error, warn};
use std::error::Error;
use thiserror::Error;

/// The three buckets every fallible operation in this crate sorts into.
///
/// `SanityCheckFailed` means an internal invariant broke (a bug here, not
/// bad input). `UserInputError` means the caller handed us something
/// invalid. `InternalServerError` wraps a failure from a dependency this
/// crate doesn't itself diagnose further (transport, filesystem).
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("{0}")]
    SanityCheckFailed(String),
    #[error("{0}")]
    UserInputError(String),
    #[error(transparent)]
    InternalServerError(#[from] anyhow::Error),
}

pub type WalletResult<T> = Result<T, WalletError>;

impl WalletError {
    pub fn sanity_check(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        error!("sanity check failed: {msg}");
        WalletError::SanityCheckFailed(msg)
    }

    pub fn user_input(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        warn!("rejected user input: {msg}");
        WalletError::UserInputError(msg)
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        let err = err.into();
        error!("internal error: {err:#}");
        WalletError::InternalServerError(err)
    }
}

/// Lets a call site decide, at the point of use, which bucket a lower-level
/// error belongs to instead of leaving it to a single blanket conversion.
pub trait ResultExt<T> {
    fn to_sanity_check(self) -> WalletResult<T>;
    fn to_user_input_error(self) -> WalletResult<T>;
    fn to_internal_server_error(self) -> WalletResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn to_sanity_check(self) -> WalletResult<T> {
        self.map_err(|e| WalletError::sanity_check(e.to_string()))
    }

    fn to_user_input_error(self) -> WalletResult<T> {
        self.map_err(|e| WalletError::user_input(e.to_string()))
    }

    fn to_internal_server_error(self) -> WalletResult<T> {
        self.map_err(|e| WalletError::internal(anyhow::Error::new(e)))
    }
}
