//! The data channel: opening the data connection and moving bytes over it for `RETR` and `STOR`
//! while watching for `ABOR`.

use super::{
    background::CommandOutcome,
    passive::PassiveListener,
    reply::{Reply, ReplyCode},
    session::ConnectionSetupKind,
    transport::{DataConnection, Transport},
};
use crate::{
    vfs::{self, DirectoryEntry, Entry, ErrorKind, FileStream, FileSystem, OpenMode},
};
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// The chunk size of [`copy_cancellable`]. Cancellation is noticed within one chunk.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Where the next data connection comes from, as set up by `PORT` or `PASV`.
#[derive(Debug)]
pub enum DataEndpoint {
    /// Connect to the client at this address.
    Active(SocketAddr),
    /// Wait for the client on this listener.
    Passive(PassiveListener),
}

impl DataEndpoint {
    /// The command that produced this endpoint.
    pub fn kind(&self) -> ConnectionSetupKind {
        match self {
            DataEndpoint::Active(_) => ConnectionSetupKind::Port,
            DataEndpoint::Passive(_) => ConnectionSetupKind::Pasv,
        }
    }

    /// Opens the data connection, giving up after `timeout`. A passive listener is closed once a
    /// client connected to it.
    pub async fn connect(self, transport: &dyn Transport, timeout: Duration) -> io::Result<Box<dyn DataConnection>> {
        let connecting = async move {
            match self {
                DataEndpoint::Active(addr) => transport.connect(addr).await,
                DataEndpoint::Passive(listener) => listener.accept().await.map(|(conn, _peer)| conn),
            }
        };
        match tokio::time::timeout(timeout, connecting).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "no data connection within timeout")),
        }
    }
}

/// What a transfer works with, taken from the session by
/// [`Session::start_transfer`](super::Session::start_transfer).
///
/// There is no transfer mode in here: data is moved byte for byte whatever `TYPE` was set.
#[derive(Debug)]
pub struct TransferContext {
    /// The logged in user's file system.
    pub file_system: Arc<dyn FileSystem>,
    /// The working directory when the transfer was started.
    pub directory: DirectoryEntry,
    /// Offset from `REST`, 0 without.
    pub start_pos: u64,
    /// Where the data connection comes from.
    pub endpoint: DataEndpoint,
    /// How long to wait for the data connection.
    pub timeout: Duration,
    /// The session's logger.
    pub logger: slog::Logger,
}

/// How [`copy_cancellable`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The reader reached its end.
    Completed {
        /// Bytes copied.
        bytes: u64,
    },
    /// The token was cancelled first.
    Aborted {
        /// Bytes copied before that.
        bytes: u64,
    },
}

/// Copies `reader` into `writer` in chunks of [`CHUNK_SIZE`], stopping as soon as `token` is
/// cancelled, also while blocked on either side.
pub async fn copy_cancellable<R, W>(reader: &mut R, writer: &mut W, token: &CancellationToken) -> io::Result<CopyOutcome>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes = 0u64;
    loop {
        let n = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(CopyOutcome::Aborted { bytes }),
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            writer.flush().await?;
            return Ok(CopyOutcome::Completed { bytes });
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(CopyOutcome::Aborted { bytes }),
            written = writer.write_all(&buf[..n]) => written?,
        }
        bytes += n as u64;
    }
}

fn failed(err: &vfs::Error) -> CommandOutcome {
    CommandOutcome::Failed(err.into())
}

async fn open_data_connection(
    endpoint: DataEndpoint,
    transport: &dyn Transport,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<Box<dyn DataConnection>, CommandOutcome> {
    tokio::select! {
        _ = token.cancelled() => Err(CommandOutcome::Aborted),
        conn = endpoint.connect(transport, timeout) => conn.map_err(|_| {
            CommandOutcome::Failed(Reply::new(ReplyCode::CantOpenDataConnection, "Can't open data connection"))
        }),
    }
}

/// Runs `RETR path`: sends the file over the data connection unchanged, also in ASCII mode.
/// Meant to run on the
/// [`BackgroundCommandHandler`](super::BackgroundCommandHandler).
#[tracing_attributes::instrument(skip(ctx, transport, token))]
pub async fn retrieve(ctx: TransferContext, transport: Arc<dyn Transport>, path: String, token: CancellationToken) -> CommandOutcome {
    let TransferContext {
        file_system,
        directory,
        start_pos,
        endpoint,
        timeout,
        logger,
    } = ctx;

    let file = match file_system.resolve(&directory, &path).await {
        Ok(Entry::File(file)) => file,
        Ok(Entry::Directory(_)) => return failed(&vfs::Error::with_message(ErrorKind::NotFound, "Not a regular file")),
        Err(e) => return failed(&e),
    };
    let mut reader = match file_system.open(&file, OpenMode::Read { start_pos }).await {
        Ok(FileStream::Reader(reader)) => reader,
        Ok(FileStream::Writer(_)) => return failed(&vfs::Error::with_message(ErrorKind::IoFailure, "Backend returned a writer for reading")),
        Err(e) => return failed(&e),
    };
    let mut conn = match open_data_connection(endpoint, transport.as_ref(), timeout, &token).await {
        Ok(conn) => conn,
        Err(outcome) => return outcome,
    };

    match copy_cancellable(&mut reader, &mut conn, &token).await {
        Ok(CopyOutcome::Completed { bytes }) => {
            // Everything was written already; a failing close is only worth a log line.
            if let Err(e) = conn.shutdown().await {
                slog::warn!(logger, "Error closing data connection"; "path" => &path, "error" => %e);
            }
            slog::info!(logger, "File sent"; "path" => &path, "bytes" => bytes);
            CommandOutcome::Completed(Reply::new(ReplyCode::ClosingDataConnection, "Successfully sent"))
        }
        Ok(CopyOutcome::Aborted { bytes }) => {
            slog::info!(logger, "Sending aborted"; "path" => &path, "bytes" => bytes);
            CommandOutcome::Aborted
        }
        Err(e) => {
            slog::warn!(logger, "Error sending file"; "path" => &path, "error" => %e);
            failed(&vfs::Error::from(e))
        }
    }
}

/// Runs `STOR path`: writes what arrives on the data connection to the file unchanged, creating
/// it if needed. The file is only created or truncated once the client connected. On abort the
/// partial file is shut down and left in place.
#[tracing_attributes::instrument(skip(ctx, transport, token))]
pub async fn store(ctx: TransferContext, transport: Arc<dyn Transport>, path: String, token: CancellationToken) -> CommandOutcome {
    let TransferContext {
        file_system,
        directory,
        start_pos,
        endpoint,
        timeout,
        logger,
    } = ctx;

    let (parent, name) = match path.rsplit_once('/') {
        Some(("", name)) => (file_system.root(), name),
        Some((dir, name)) => match file_system.resolve(&directory, dir).await {
            Ok(Entry::Directory(parent)) => (parent, name),
            Ok(Entry::File(_)) => return failed(&vfs::Error::from(ErrorKind::NotADirectory)),
            Err(e) => return failed(&e),
        },
        None => (directory, path.as_str()),
    };
    if name.is_empty() {
        return failed(&vfs::Error::with_message(ErrorKind::FileNameNotAllowed, "File name missing"));
    }
    let mut conn = match open_data_connection(endpoint, transport.as_ref(), timeout, &token).await {
        Ok(conn) => conn,
        Err(outcome) => return outcome,
    };
    let file = match file_system.create(&parent, name).await {
        Ok(file) => file,
        Err(e) => return failed(&e),
    };
    let mut writer = match file_system.open(&file, OpenMode::Write { start_pos }).await {
        Ok(FileStream::Writer(writer)) => writer,
        Ok(FileStream::Reader(_)) => return failed(&vfs::Error::with_message(ErrorKind::IoFailure, "Backend returned a reader for writing")),
        Err(e) => return failed(&e),
    };

    let copied = copy_cancellable(&mut conn, &mut writer, &token).await;
    // Whatever arrived is kept, the writer is closed in every case.
    let closed = writer.shutdown().await;
    match copied {
        Ok(CopyOutcome::Completed { bytes }) => match closed {
            Ok(()) => {
                slog::info!(logger, "File stored"; "path" => &path, "bytes" => bytes);
                CommandOutcome::Completed(Reply::new(ReplyCode::ClosingDataConnection, "File successfully written"))
            }
            Err(e) => {
                slog::warn!(logger, "Error closing stored file"; "path" => &path, "error" => %e);
                failed(&vfs::Error::from(e))
            }
        },
        Ok(CopyOutcome::Aborted { bytes }) => {
            slog::info!(logger, "Storing aborted"; "path" => &path, "bytes" => bytes);
            CommandOutcome::Aborted
        }
        Err(e) => {
            slog::warn!(logger, "Error storing file"; "path" => &path, "error" => %e);
            failed(&vfs::Error::from(e))
        }
    }
}
