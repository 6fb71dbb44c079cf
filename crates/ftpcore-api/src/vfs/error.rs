use crate::BoxError;
use derive_more::Display;
use thiserror::Error;

/// The Error returned by file system backends. Backends should choose the [`ErrorKind`]
/// carefully since that is what determines the reply the FTP client gets to see.
///
/// Once constructed an `Error` cannot be changed.
#[derive(Debug, Error)]
#[error("file system error: {kind}")]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Creates a new file system error wrapping the given cause.
    pub fn new<E>(kind: ErrorKind, error: E) -> Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error {
            kind,
            message: None,
            source: Some(error.into()),
        }
    }

    /// Creates a new file system error with a message for the client instead of the default one.
    pub fn with_message<M: Into<String>>(kind: ErrorKind, message: M) -> Error {
        Error {
            kind,
            message: Some(message.into()),
            source: None,
        }
    }

    /// The category of the failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The FTP reply code the client should receive.
    pub fn reply_code(&self) -> u16 {
        self.kind.reply().0
    }

    /// The human readable part of the reply.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_else(|| self.kind.reply().1)
    }

    /// Attempts to get a reference to the inner `std::io::Error` if there is one.
    pub fn get_io_error(&self) -> Option<&std::io::Error> {
        self.source.as_ref()?.downcast_ref::<std::io::Error>()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            kind,
            message: None,
            source: None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        use std::io::ErrorKind as Io;
        let kind = match err.kind() {
            Io::NotFound => ErrorKind::NotFound,
            Io::PermissionDenied | Io::ReadOnlyFilesystem => ErrorKind::PermissionDenied,
            Io::AlreadyExists => ErrorKind::AlreadyExists,
            Io::NotADirectory => ErrorKind::NotADirectory,
            Io::DirectoryNotEmpty => ErrorKind::DirectoryNotEmpty,
            Io::InvalidInput => ErrorKind::BadParameter,
            Io::StorageFull => ErrorKind::InsufficientStorage,
            Io::ResourceBusy | Io::WouldBlock | Io::TimedOut | Io::Interrupted => ErrorKind::TransientFileNotAvailable,
            Io::Unsupported => ErrorKind::CommandNotImplemented,
            _ => ErrorKind::IoFailure,
        };
        Error::new(kind, err)
    }
}

/// The categories a file system failure is classified into before it reaches the protocol layer.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum ErrorKind {
    /// The command is not implemented for the given parameter. Results in a 504 reply.
    #[display("504 Bad parameter")]
    BadParameter,
    /// The user may not access the entry. Results in a 550 reply.
    #[display("550 Permission denied")]
    PermissionDenied,
    /// The path does not resolve to an entry. Results in a 550 reply.
    #[display("550 File not found")]
    NotFound,
    /// The target of a create or rename already exists. Results in a 550 reply.
    #[display("550 File already exists")]
    AlreadyExists,
    /// A path segment that had to be a directory is a file. Results in a 550 reply.
    #[display("550 Not a directory")]
    NotADirectory,
    /// The directory to remove still has entries. Results in a 550 reply.
    #[display("550 Directory not empty")]
    DirectoryNotEmpty,
    /// Generic backend failure while processing. Results in a 451 reply.
    #[display("451 Local error")]
    IoFailure,
    /// The entry is busy and the action may be retried. Results in a 450 reply.
    #[display("450 Transient file not available")]
    TransientFileNotAvailable,
    /// Results in a 452 reply.
    #[display("452 Insufficient storage space")]
    InsufficientStorage,
    /// The name is not valid for this backend. Results in a 553 reply.
    #[display("553 File name not allowed")]
    FileNameNotAllowed,
    /// The backend has no support for the operation at all. Results in a 502 reply.
    #[display("502 Command not implemented")]
    CommandNotImplemented,
}

impl ErrorKind {
    /// Maps the category to its FTP reply code and default message.
    pub const fn reply(self) -> (u16, &'static str) {
        match self {
            ErrorKind::BadParameter => (504, "Command not implemented for that parameter."),
            ErrorKind::PermissionDenied => (550, "Permission denied."),
            ErrorKind::NotFound => (550, "File not found."),
            ErrorKind::AlreadyExists => (550, "File already exists."),
            ErrorKind::NotADirectory => (550, "Not a directory."),
            ErrorKind::DirectoryNotEmpty => (550, "Directory not empty."),
            ErrorKind::IoFailure => (451, "Requested action aborted: local error in processing."),
            ErrorKind::TransientFileNotAvailable => (450, "File unavailable, try again later."),
            ErrorKind::InsufficientStorage => (452, "Insufficient storage space in system."),
            ErrorKind::FileNameNotAllowed => (553, "File name not allowed."),
            ErrorKind::CommandNotImplemented => (502, "Command not implemented."),
        }
    }
}
