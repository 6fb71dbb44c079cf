//! Contains the error types returned by the session core.

use crate::{transfer::TransferMode, vfs};
use derive_more::Display;
use std::io;
use thiserror::Error;

/// Failure to allocate a passive mode listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Every port of the configured range is in use.
    #[error("all passive ports in {start}-{end} are in use")]
    RangeExhausted {
        /// First port of the range.
        start: u16,
        /// Last port of the range.
        end: u16,
    },
    /// The requested port lies outside the configured range.
    #[error("port {port} is outside the passive range {start}-{end}")]
    OutOfRange {
        /// The port that was asked for.
        port: u16,
        /// First port of the range.
        start: u16,
        /// Last port of the range.
        end: u16,
    },
    /// Binding or listening failed.
    #[error("could not set up passive listener: {0}")]
    Network(#[source] io::Error),
}

impl ListenerError {
    /// The category of the underlying socket error, if this is a network failure.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            ListenerError::Network(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<io::Error> for ListenerError {
    fn from(err: io::Error) -> Self {
        ListenerError::Network(err)
    }
}

/// Failure to start or cancel a background command.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum BackgroundCommandError {
    /// A background command is already running or still cancelling.
    #[error("a background command is already running")]
    AlreadyRunning,
    /// There is nothing to cancel.
    #[error("no background command is running")]
    NotRunning,
    /// The handler has been disposed together with its session.
    #[error("the background command handler has been disposed")]
    Disposed,
}

/// Failure of a session level operation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation needs a logged in user.
    #[error("not logged in")]
    NotLoggedIn,
    /// The file system cannot serve the requested transfer mode.
    #[error("transfer mode {0} is not supported")]
    NotSupported(TransferMode),
    /// No `PORT` or `PASV` preceded the transfer, or the passive listener was already used.
    #[error("no data connection has been set up")]
    NoDataConnection,
    /// The file system refused the operation.
    #[error(transparent)]
    FileSystem(#[from] vfs::Error),
    /// The background handler cannot take a transfer right now.
    #[error(transparent)]
    Background(#[from] BackgroundCommandError),
}

/// The part of the teardown a [`DisposalWarning`] comes from.
#[derive(Debug, Display, PartialEq, Eq, Clone, Copy)]
pub enum DisposalStage {
    /// Stopping the background command.
    #[display("background command handler")]
    BackgroundCommand,
    /// Closing the passive listener.
    #[display("passive listener")]
    PassiveListener,
    /// Releasing the file system.
    #[display("file system")]
    FileSystem,
}

/// A non-fatal failure during session teardown. Teardown always runs to completion; these are
/// reported so the host can log them.
#[derive(Debug, Error)]
#[error("disposing the {stage} failed: {message}")]
pub struct DisposalWarning {
    /// Where it happened.
    pub stage: DisposalStage,
    /// What happened.
    pub message: String,
}
