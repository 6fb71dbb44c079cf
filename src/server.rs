//! Contains the per-connection session core: [`Session`], the [`BackgroundCommandHandler`] its
//! transfers run on and the [`PassiveListenerFactory`] that serves `PASV`.

mod background;
mod datachan;
mod directory;
mod error;
mod passive;
mod reply;
mod session;
mod transport;
mod user_data;

pub use background::{BackgroundCommandHandler, CommandCompletion, CommandOutcome, HandlerState};
pub use datachan::{CHUNK_SIZE, CopyOutcome, DataEndpoint, TransferContext, copy_cancellable, retrieve, store};
pub use directory::DirectoryStack;
pub use error::{BackgroundCommandError, DisposalStage, DisposalWarning, ListenerError, SessionError};
pub use passive::{PassiveListener, PassiveListenerFactory};
pub use reply::{Reply, ReplyCode};
pub use session::{ConnectionContext, ConnectionSetupKind, NlstEncoding, Session, SessionId};
pub use transport::{DataConnection, DataListener, TcpTransport, Transport};
pub use user_data::{UserData, UserDataKey, UserDataValue};
