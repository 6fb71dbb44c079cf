//! Contains the [`Session`]: everything the server remembers about one control connection.

use super::{
    background::{BackgroundCommandHandler, CommandCompletion, CommandOutcome, HandlerState},
    datachan::{DataEndpoint, TransferContext},
    directory::DirectoryStack,
    error::{BackgroundCommandError, DisposalStage, DisposalWarning, SessionError},
    passive::PassiveListener,
    user_data::UserData,
};
use crate::{
    auth::{AuthenticationError, Identity},
    metrics,
    options::SessionOptions,
    transfer::TransferMode,
    vfs::{self, DirectoryEntry, Entry, ErrorKind, FileSystem, FileSystemProvider},
};
use derive_more::Display;
use std::{fmt, future::Future, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifies a session, also in the passive port registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// A new random id.
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        SessionId::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The two ends of the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionContext {
    /// The client.
    pub peer: SocketAddr,
    /// Our side. Its IP is what `PASV` advertises by default.
    pub local: SocketAddr,
}

/// The command that set up the pending data connection.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSetupKind {
    /// Active mode: we connect to the client.
    #[display("PORT")]
    Port,
    /// Passive mode: the client connects to us.
    #[display("PASV")]
    Pasv,
}

/// How file names are encoded in `NLST` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NlstEncoding {
    /// UTF-8, what `OPTS UTF8 ON` clients expect.
    #[default]
    Utf8,
    /// ISO-8859-1. Characters outside of it are sent as `?`.
    Latin1,
}

impl NlstEncoding {
    /// Encodes a file name for the wire.
    pub fn encode(self, name: &str) -> Vec<u8> {
        match self {
            NlstEncoding::Utf8 => name.as_bytes().to_vec(),
            NlstEncoding::Latin1 => name.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')).collect(),
        }
    }
}

/// The state of one control connection.
///
/// Owned by the control loop. A running transfer only sees the snapshot taken by
/// [`start_transfer`](Session::start_transfer), it never touches the session itself.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    context: ConnectionContext,
    username: Option<String>,
    logged_in: bool,
    anonymous: bool,
    // Shared with a running transfer; teardown stops the transfer before disposing it.
    file_system: Option<Arc<dyn FileSystem>>,
    directories: DirectoryStack,
    transfer_mode: TransferMode,
    default_transfer_mode: TransferMode,
    nlst_encoding: NlstEncoding,
    last_setup: Option<ConnectionSetupKind>,
    data_endpoint: Option<DataEndpoint>,
    restart_position: Option<u64>,
    rename_from: Option<Entry>,
    background: BackgroundCommandHandler,
    user_data: UserData,
    data_connection_timeout: Duration,
    disposed: bool,
    logger: slog::Logger,
}

impl Session {
    /// Creates the session for a freshly accepted control connection.
    pub fn new(context: ConnectionContext, options: &SessionOptions, logger: slog::Logger) -> Self {
        let id = SessionId::new();
        let logger = logger.new(slog::o!("session" => id.to_string()));
        slog::debug!(logger, "Session created"; "peer" => %context.peer);
        metrics::inc_session();
        Session {
            id,
            context,
            username: None,
            logged_in: false,
            anonymous: false,
            file_system: None,
            directories: DirectoryStack::new(),
            transfer_mode: options.default_transfer_mode,
            default_transfer_mode: options.default_transfer_mode,
            nlst_encoding: NlstEncoding::default(),
            last_setup: None,
            data_endpoint: None,
            restart_position: None,
            rename_from: None,
            background: BackgroundCommandHandler::new(logger.clone()),
            user_data: UserData::default(),
            data_connection_timeout: options.data_connection_timeout,
            disposed: false,
            logger,
        }
    }

    /// This session's id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The control connection's endpoints.
    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// The session's logger.
    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    /// The user name given at login.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// True after a successful [`login`](Session::login).
    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// True if the logged in user is anonymous.
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// The file system of the logged in user.
    pub fn file_system(&self) -> Option<&Arc<dyn FileSystem>> {
        self.file_system.as_ref()
    }

    /// Binds the file system `provider` hands out for `identity`.
    ///
    /// If the provider rejects the identity nothing changes, not even an earlier login. Otherwise
    /// an earlier login is logged out first and the session starts at the root. A disposed
    /// session refuses every login without asking the provider.
    #[tracing_attributes::instrument(skip(self, provider))]
    pub async fn login(&mut self, identity: Identity, provider: &dyn FileSystemProvider) -> Result<(), AuthenticationError> {
        if self.disposed {
            slog::warn!(self.logger, "Login on a disposed session refused"; "username" => &identity.username);
            return Err(AuthenticationError::Rejected("session is closed".to_string()));
        }
        let file_system = match provider.provide(&identity).await {
            Ok(fs) => fs,
            Err(e) => {
                slog::warn!(self.logger, "File system provider rejected user"; "username" => &identity.username, "error" => %e);
                return Err(e);
            }
        };

        if self.logged_in {
            for warning in self.logout().await {
                slog::warn!(self.logger, "{}", warning);
            }
        }

        slog::info!(self.logger, "User logged in"; "username" => &identity.username, "anonymous" => identity.anonymous);
        self.username = Some(identity.username);
        self.anonymous = identity.anonymous;
        self.logged_in = true;
        self.file_system = Some(file_system);
        self.directories.clear();
        Ok(())
    }

    /// Forgets the logged in user: stops a running transfer, drops the data connection setup
    /// and releases the file system. The session can log in again afterwards.
    pub async fn logout(&mut self) -> Vec<DisposalWarning> {
        let mut warnings = Vec::new();
        if let Err(warning) = self.background.stop().await {
            warnings.push(warning);
        }
        self.release_data_endpoint(&mut warnings).await;
        self.release_file_system(&mut warnings).await;

        self.username = None;
        self.logged_in = false;
        self.anonymous = false;
        self.directories.clear();
        self.transfer_mode = self.default_transfer_mode;
        self.restart_position = None;
        self.rename_from = None;
        self.last_setup = None;
        warnings
    }

    /// The working directory: the root if the stack is empty, else the top of the stack. `None`
    /// only before login.
    pub fn current_directory(&self) -> Option<DirectoryEntry> {
        let fs = self.file_system.as_ref()?;
        let root = fs.root();
        Some(self.directories.current(&root).clone())
    }

    /// Enters `entry`. The caller resolved it through the file system.
    pub fn push_directory(&mut self, entry: DirectoryEntry) {
        self.directories.push(entry);
    }

    /// Leaves the working directory. At the root this does nothing and returns `None`.
    pub fn pop_directory(&mut self) -> Option<DirectoryEntry> {
        self.directories.pop()
    }

    /// `CWD`: walks `path` from the working directory. On failure the working directory stays
    /// where it was.
    pub async fn change_directory(&mut self, path: &str) -> Result<(), SessionError> {
        let fs = self.file_system.clone().ok_or(SessionError::NotLoggedIn)?;
        match self.directories.walk(fs.as_ref(), path).await {
            Ok(walked) => {
                self.directories = walked;
                Ok(())
            }
            Err(e) => {
                slog::debug!(self.logger, "CWD failed"; "path" => path, "error" => %e);
                Err(e.into())
            }
        }
    }

    /// The working directory path, as shown by `PWD`.
    pub fn working_directory(&self) -> PathBuf {
        self.directories.path()
    }

    /// The directory stack.
    pub fn directories(&self) -> &DirectoryStack {
        &self.directories
    }

    /// Checks that the working directory was not removed or replaced since it was entered.
    /// Reports [`ErrorKind::NotFound`] if it was and leaves the stack alone; the caller decides
    /// whether to move the user.
    pub async fn validate_current_directory(&self) -> Result<(), SessionError> {
        let fs = self.file_system.as_ref().ok_or(SessionError::NotLoggedIn)?;
        let root = fs.root();
        let current = self.directories.current(&root);
        if fs.is_current(current).await {
            Ok(())
        } else {
            Err(vfs::Error::with_message(ErrorKind::NotFound, "Working directory no longer exists").into())
        }
    }

    /// The transfer mode set by `TYPE` and `STRU`.
    pub fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    /// Changes the transfer mode if the file system can serve it.
    ///
    /// The mode is what the client negotiated; `RETR` and `STOR` move the bytes unchanged in
    /// every mode, there is no end of line translation for ASCII.
    pub fn set_transfer_mode(&mut self, mode: TransferMode) -> Result<(), SessionError> {
        let fs = self.file_system.as_ref().ok_or(SessionError::NotLoggedIn)?;
        if !fs.capabilities().supports(&mode) {
            slog::debug!(self.logger, "Transfer mode not supported"; "mode" => %mode);
            return Err(SessionError::NotSupported(mode));
        }
        self.transfer_mode = mode;
        Ok(())
    }

    /// The encoding used for `NLST`.
    pub fn nlst_encoding(&self) -> NlstEncoding {
        self.nlst_encoding
    }

    /// Changes the encoding used for `NLST`.
    pub fn set_nlst_encoding(&mut self, encoding: NlstEncoding) {
        self.nlst_encoding = encoding;
    }

    /// Stores the result of `PORT` or `PASV`, closing whatever an earlier one left behind.
    pub async fn record_connection_setup(&mut self, endpoint: DataEndpoint) {
        let kind = endpoint.kind();
        self.last_setup = Some(kind);
        let Some(stale) = self.data_endpoint.replace(endpoint) else {
            return;
        };
        slog::info!(self.logger, "Replacing stale data connection setup"; "stale" => %stale.kind(), "new" => %kind);
        if let DataEndpoint::Passive(listener) = stale {
            let addr = listener.local_addr();
            if let Err(e) = listener.close().await {
                slog::warn!(self.logger, "Closing stale passive listener failed"; "addr" => %addr, "error" => %e);
            }
        }
    }

    /// Which of `PORT` or `PASV` was used last.
    pub fn last_connection_setup(&self) -> Option<ConnectionSetupKind> {
        self.last_setup
    }

    /// The address given with `PORT`, if that is the pending setup.
    pub fn port_address(&self) -> Option<SocketAddr> {
        match &self.data_endpoint {
            Some(DataEndpoint::Active(addr)) => Some(*addr),
            _ => None,
        }
    }

    /// The listener created by `PASV`, until a transfer takes it.
    pub fn passive_listener(&self) -> Option<&PassiveListener> {
        match &self.data_endpoint {
            Some(DataEndpoint::Passive(listener)) => Some(listener),
            _ => None,
        }
    }

    /// `REST`: the offset the next transfer starts at.
    pub fn set_restart_position(&mut self, offset: u64) {
        self.restart_position = Some(offset);
    }

    /// The pending restart offset.
    pub fn restart_position(&self) -> Option<u64> {
        self.restart_position
    }

    /// `RNFR`: remembers what to rename.
    pub fn set_rename_from(&mut self, entry: Entry) {
        self.rename_from = Some(entry);
    }

    /// `RNTO`: takes the entry remembered by `RNFR`.
    pub fn take_rename_from(&mut self) -> Option<Entry> {
        self.rename_from.take()
    }

    /// Session scoped values for command handlers.
    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    /// Mutable access to the session scoped values.
    pub fn user_data_mut(&mut self) -> &mut UserData {
        &mut self.user_data
    }

    /// The handler transfer commands run on.
    pub fn background(&self) -> &BackgroundCommandHandler {
        &self.background
    }

    /// Starts a transfer command on the background handler with a fresh [`TransferContext`].
    ///
    /// The handler must be idle. If it is not, this fails with
    /// [`SessionError::Background`] before anything is taken, so the passive listener and the
    /// restart offset are still there for the next attempt.
    pub fn start_transfer<F, Fut>(&mut self, command: F) -> Result<CommandCompletion, SessionError>
    where
        F: FnOnce(TransferContext, CancellationToken) -> Fut,
        Fut: Future<Output = CommandOutcome> + Send + 'static,
    {
        match self.background.state() {
            HandlerState::Idle => {}
            HandlerState::Running | HandlerState::Cancelling => return Err(BackgroundCommandError::AlreadyRunning.into()),
            HandlerState::Disposed => return Err(BackgroundCommandError::Disposed.into()),
        }
        let ctx = self.prepare_transfer()?;
        // Only the control loop starts commands and it holds `&mut self`, so the slot is still free.
        Ok(self.background.execute(move |token| command(ctx, token))?)
    }

    /// Takes what a transfer command needs into a [`TransferContext`] the background task can
    /// own: the passive listener moves out of the session and the restart offset is consumed.
    /// Nothing is taken if this fails. Prefer [`start_transfer`](Session::start_transfer), which
    /// checks the handler first.
    pub fn prepare_transfer(&mut self) -> Result<TransferContext, SessionError> {
        let file_system = self.file_system.clone().ok_or(SessionError::NotLoggedIn)?;
        let endpoint = match self.data_endpoint.take() {
            Some(DataEndpoint::Active(addr)) => {
                // PORT may be reused by the next transfer.
                self.data_endpoint = Some(DataEndpoint::Active(addr));
                DataEndpoint::Active(addr)
            }
            Some(passive) => passive,
            None => return Err(SessionError::NoDataConnection),
        };
        let root = file_system.root();
        let directory = self.directories.current(&root).clone();
        Ok(TransferContext {
            file_system,
            directory,
            start_pos: self.restart_position.take().unwrap_or(0),
            endpoint,
            timeout: self.data_connection_timeout,
            logger: self.logger.clone(),
        })
    }

    /// Tears the session down: the background handler first, then the passive listener, then
    /// the file system. Always runs to the end; failures are returned as warnings. Every stage
    /// only releases what is still held, so a second call releases anything bound since and
    /// otherwise does nothing.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn dispose(&mut self) -> Vec<DisposalWarning> {
        self.disposed = true;

        let mut warnings = Vec::new();
        if let Err(warning) = self.background.dispose().await {
            warnings.push(warning);
        }
        self.release_data_endpoint(&mut warnings).await;
        self.release_file_system(&mut warnings).await;
        self.logged_in = false;

        for warning in &warnings {
            slog::warn!(self.logger, "{}", warning);
        }
        slog::debug!(self.logger, "Session disposed");
        warnings
    }

    /// True once [`dispose`](Session::dispose) ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    async fn release_data_endpoint(&mut self, warnings: &mut Vec<DisposalWarning>) {
        if let Some(DataEndpoint::Passive(listener)) = self.data_endpoint.take() {
            let addr = listener.local_addr();
            if let Err(e) = listener.close().await {
                warnings.push(DisposalWarning {
                    stage: DisposalStage::PassiveListener,
                    message: format!("{}: {}", addr, e),
                });
            }
        }
    }

    async fn release_file_system(&mut self, warnings: &mut Vec<DisposalWarning>) {
        if let Some(fs) = self.file_system.take() {
            if let Err(e) = fs.dispose().await {
                warnings.push(DisposalWarning {
                    stage: DisposalStage::FileSystem,
                    message: e.to_string(),
                });
            }
        }
    }
}
