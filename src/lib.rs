#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(missing_docs)]

//! libftpcore is the session core of an async FTP server: the per-client state, the data
//! connection setup for active and passive mode, and the machinery that lets a data transfer
//! run next to the control channel so that `ABOR` can cancel it.
//!
//! Parsing control channel lines and dispatching them is left to the host. The host creates a
//! [`Session`](server::Session) for every control connection and calls into it per command:
//!
//! ```no_run
//! use libftpcore::options::{PassiveOptions, PassivePorts, SessionOptions};
//! use libftpcore::server::{ConnectionContext, PassiveListenerFactory, Session, TcpTransport};
//! use std::sync::Arc;
//!
//! # async fn demo(ctx: ConnectionContext) {
//! let logger = libftpcore::options::default_logger();
//! let factory = PassiveListenerFactory::new(
//!     Arc::new(TcpTransport),
//!     PassiveOptions::default().ports(PassivePorts::range(50000..=50100).unwrap()),
//!     logger.clone(),
//! );
//! let mut session = Session::new(ctx, &SessionOptions::default(), logger);
//! // PASV
//! let addr = factory.create_listener(&mut session, 0).await;
//! // ... on disconnect
//! let warnings = session.dispose().await;
//! # }
//! ```

pub mod auth;
pub(crate) mod metrics;
pub mod options;
pub mod server;

pub use crate::server::{BackgroundCommandHandler, PassiveListenerFactory, Session};
pub use ftpcore_api::transfer;
pub use ftpcore_api::vfs;
