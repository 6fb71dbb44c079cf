//! Contains the [`Reply`] type and the mapping from every core error onto a stable reply code.

use super::error::{BackgroundCommandError, ListenerError, SessionError};
use crate::{auth::AuthenticationError, vfs};
use std::{
    fmt::{self, Display, Formatter},
    net::Ipv4Addr,
};

/// A reply to the FTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing is sent.
    None,
    /// A single line reply.
    CodeAndMsg {
        /// The reply code.
        code: ReplyCode,
        /// The text following the code.
        msg: String,
    },
    /// A multi line reply.
    MultiLine {
        /// The reply code.
        code: ReplyCode,
        /// The lines, the last one is preceded by the code.
        lines: Vec<String>,
    },
}

/// The reply codes according to RFC 959.
//
// From: https://cr.yp.to/ftp/request.html#response
//
// The three digits form a code. Codes between 100 and 199 indicate marks; codes between 200
// and 399 indicate acceptance; codes between 400 and 599 indicate rejection.
//
// The server can reject any request with code
// - 421 if the server is about to close the connection;
// - 500, 501, 502, or 504 for unacceptable syntax; or
// - 530 if permission is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum ReplyCode {
    FileStatusOkay = 150,

    CommandOkay = 200,
    ClosingDataConnection = 226,
    EnteringPassiveMode = 227,
    EnteringExtendedPassiveMode = 229,
    UserLoggedIn = 230,
    FileActionOkay = 250,
    DirCreated = 257,

    FileActionPending = 350,

    ServiceNotAvailable = 421,
    CantOpenDataConnection = 425,
    ConnectionClosed = 426,
    TransientFileError = 450,
    LocalError = 451,
    OutOfSpace = 452,

    ParameterSyntaxError = 501,
    CommandNotImplemented = 502,
    BadCommandSequence = 503,
    CommandNotImplementedForParameter = 504,
    NotLoggedIn = 530,
    FileError = 550,
    BadFileName = 553,
}

impl ReplyCode {
    /// The numeric code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// True for 1xx, 2xx and 3xx codes.
    pub fn is_positive(self) -> bool {
        self.code() < 400
    }
}

impl Reply {
    /// Creates a single line reply.
    pub fn new(code: ReplyCode, message: &str) -> Self {
        Reply::CodeAndMsg {
            code,
            msg: message.to_string(),
        }
    }

    /// Creates a single line reply from an owned message.
    pub fn new_with_string(code: ReplyCode, msg: String) -> Self {
        Reply::CodeAndMsg { code, msg }
    }

    /// Creates a multi line reply.
    pub fn new_multiline<I>(code: ReplyCode, lines: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        Reply::MultiLine {
            code,
            lines: lines.into_iter().map(|item| format!("{}", item)).collect(),
        }
    }

    /// A no-reply
    pub fn none() -> Self {
        Reply::None
    }

    /// The reply code, if anything is sent.
    pub fn code(&self) -> Option<ReplyCode> {
        match self {
            Reply::None => None,
            Reply::CodeAndMsg { code, .. } | Reply::MultiLine { code, .. } => Some(*code),
        }
    }

    /// True if the reply signals acceptance.
    pub fn is_positive(&self) -> bool {
        self.code().is_none_or(ReplyCode::is_positive)
    }

    /// The `227` reply for `PASV`.
    pub fn passive_mode(ip: Ipv4Addr, port: u16) -> Self {
        let octets = ip.octets();
        let p1 = port >> 8;
        let p2 = port - (p1 * 256);
        Reply::new_with_string(
            ReplyCode::EnteringPassiveMode,
            format!("Entering Passive Mode ({},{},{},{},{},{})", octets[0], octets[1], octets[2], octets[3], p1, p2),
        )
    }

    /// The `229` reply for `EPSV`.
    pub fn extended_passive_mode(port: u16) -> Self {
        Reply::new_with_string(ReplyCode::EnteringExtendedPassiveMode, format!("Entering Extended Passive Mode (|||{}|)", port))
    }

    /// Sent in reply to an `ABOR` that cancelled a running transfer. The transfer itself replies
    /// with `426` once it has unwound.
    pub fn abort_acknowledged() -> Self {
        Reply::new(ReplyCode::ClosingDataConnection, "Abort command successful; transfer aborting")
    }

    /// Sent by an aborted transfer.
    pub fn transfer_aborted() -> Self {
        Reply::new(ReplyCode::ConnectionClosed, "Connection closed; transfer aborted")
    }
}

// Renders the reply the way it goes over the wire, CRLF terminated.
impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reply::None => Ok(()),
            Reply::CodeAndMsg { code, msg } => {
                if msg.is_empty() {
                    write!(f, "{}\r\n", code.code())
                } else {
                    write!(f, "{} {}\r\n", code.code(), msg)
                }
            }
            Reply::MultiLine { code, lines } => {
                let Some((last_line, lines)) = lines.split_last() else {
                    return write!(f, "{} \r\n", code.code());
                };
                if lines.is_empty() {
                    return write!(f, "{} {}\r\n", code.code(), last_line);
                }
                write!(f, "{}-", code.code())?;
                for (i, line) in lines.iter().enumerate() {
                    // Lines starting with a digit should be indented
                    if i > 0 && line.starts_with(|c: char| c.is_ascii_digit()) {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}\r\n", line)?;
                }
                write!(f, "{} {}\r\n", code.code(), last_line)
            }
        }
    }
}

fn code_for_kind(kind: vfs::ErrorKind) -> ReplyCode {
    match kind {
        vfs::ErrorKind::BadParameter => ReplyCode::CommandNotImplementedForParameter,
        vfs::ErrorKind::PermissionDenied
        | vfs::ErrorKind::NotFound
        | vfs::ErrorKind::AlreadyExists
        | vfs::ErrorKind::NotADirectory
        | vfs::ErrorKind::DirectoryNotEmpty => ReplyCode::FileError,
        vfs::ErrorKind::IoFailure => ReplyCode::LocalError,
        vfs::ErrorKind::TransientFileNotAvailable => ReplyCode::TransientFileError,
        vfs::ErrorKind::InsufficientStorage => ReplyCode::OutOfSpace,
        vfs::ErrorKind::FileNameNotAllowed => ReplyCode::BadFileName,
        vfs::ErrorKind::CommandNotImplemented => ReplyCode::CommandNotImplemented,
    }
}

impl From<&vfs::Error> for Reply {
    fn from(err: &vfs::Error) -> Self {
        Reply::new(code_for_kind(err.kind()), err.message())
    }
}

impl From<&ListenerError> for Reply {
    fn from(err: &ListenerError) -> Self {
        match err {
            ListenerError::RangeExhausted { .. } => Reply::new(ReplyCode::CantOpenDataConnection, "No free passive port available"),
            ListenerError::OutOfRange { .. } => Reply::new(ReplyCode::ParameterSyntaxError, "Port outside of the passive port range"),
            ListenerError::Network(_) => Reply::new(ReplyCode::CantOpenDataConnection, "No data connection established"),
        }
    }
}

impl From<&BackgroundCommandError> for Reply {
    fn from(err: &BackgroundCommandError) -> Self {
        match err {
            BackgroundCommandError::AlreadyRunning => Reply::new(ReplyCode::TransientFileError, "A transfer is already running"),
            BackgroundCommandError::NotRunning => Reply::new(ReplyCode::ClosingDataConnection, "No transfer in progress"),
            BackgroundCommandError::Disposed => Reply::new(ReplyCode::ServiceNotAvailable, "Session is closing"),
        }
    }
}

impl From<&SessionError> for Reply {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::NotLoggedIn => Reply::new(ReplyCode::NotLoggedIn, "Please authenticate"),
            SessionError::NotSupported(mode) => {
                Reply::new_with_string(ReplyCode::CommandNotImplementedForParameter, format!("Transfer mode {} not supported", mode))
            }
            SessionError::NoDataConnection => Reply::new(ReplyCode::CantOpenDataConnection, "Use PORT or PASV first"),
            SessionError::FileSystem(e) => e.into(),
            SessionError::Background(e) => e.into(),
        }
    }
}

impl From<&AuthenticationError> for Reply {
    fn from(_: &AuthenticationError) -> Self {
        Reply::new(ReplyCode::NotLoggedIn, "Wrong username or password")
    }
}
