//! Contains the setup options for sessions and for the passive listener factory.

use crate::transfer::TransferMode;
use slog::Drain;
use std::{
    fmt::{self, Display, Formatter},
    net::{IpAddr, Ipv4Addr},
    ops::RangeInclusive,
    time::Duration,
};
use thiserror::Error;

pub(crate) const DEFAULT_DATA_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);
pub(crate) const DEFAULT_PASSIVE_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// The number of background commands a session may run at the same time. Fixed, FTP only has
/// one data connection per session.
pub const MAX_BACKGROUND_COMMANDS: usize = 1;

/// The ports passive listeners are allowed to bind to.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub enum PassivePorts {
    /// Let the operating system pick a free port.
    #[default]
    Ephemeral,
    /// Only bind to ports within this inclusive range. Created with [`PassivePorts::range`].
    Range(PortRange),
}

/// A non-empty inclusive port range that does not contain port 0.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// The first port.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// The last port.
    pub fn end(&self) -> u16 {
        self.end
    }

    /// True if `port` lies within the range.
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

/// Returned when a passive port range is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid passive port range {start}..={end}")]
pub struct InvalidPortRange {
    start: u16,
    end: u16,
}

impl PassivePorts {
    /// Creates a validated port range. Port 0 means "any" to the OS so it may not be part of it.
    pub fn range(range: RangeInclusive<u16>) -> Result<Self, InvalidPortRange> {
        let (start, end) = (*range.start(), *range.end());
        if start == 0 || start > end {
            return Err(InvalidPortRange { start, end });
        }
        Ok(PassivePorts::Range(PortRange { start, end }))
    }

    /// True if `port` may be used.
    pub fn contains(&self, port: u16) -> bool {
        match self {
            PassivePorts::Ephemeral => true,
            PassivePorts::Range(range) => range.contains(port),
        }
    }
}

impl Display for PassivePorts {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PassivePorts::Ephemeral => f.write_str("ephemeral"),
            PassivePorts::Range(r) => write!(f, "{}-{}", r.start(), r.end()),
        }
    }
}

/// The option to `PassiveOptions::passive_host`. It allows the user to specify how the IP
/// address communicated in the _PASV_ response is determined.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub enum PassiveHost {
    /// Use the IP address of the control connection
    #[default]
    FromConnection,
    /// Advertise this specific IP address
    Ip(Ipv4Addr),
}

impl From<Ipv4Addr> for PassiveHost {
    fn from(ip: Ipv4Addr) -> Self {
        PassiveHost::Ip(ip)
    }
}

impl From<[u8; 4]> for PassiveHost {
    fn from(ip: [u8; 4]) -> Self {
        PassiveHost::Ip(ip.into())
    }
}

/// Configures the [`PassiveListenerFactory`](crate::server::PassiveListenerFactory).
#[derive(Debug, Clone)]
pub struct PassiveOptions {
    pub(crate) ports: PassivePorts,
    pub(crate) bind_ip: IpAddr,
    pub(crate) passive_host: PassiveHost,
}

impl Default for PassiveOptions {
    fn default() -> Self {
        PassiveOptions {
            ports: PassivePorts::default(),
            bind_ip: DEFAULT_PASSIVE_BIND_IP,
            passive_host: PassiveHost::default(),
        }
    }
}

impl PassiveOptions {
    /// Restricts passive listeners to `ports`.
    pub fn ports(mut self, ports: PassivePorts) -> Self {
        self.ports = ports;
        self
    }

    /// The local address passive listeners bind to.
    pub fn bind_ip<I: Into<IpAddr>>(mut self, ip: I) -> Self {
        self.bind_ip = ip.into();
        self
    }

    /// How the address in the `227` reply is chosen.
    pub fn passive_host<H: Into<PassiveHost>>(mut self, host: H) -> Self {
        self.passive_host = host.into();
        self
    }

    /// The configured port policy.
    pub fn passive_ports(&self) -> &PassivePorts {
        &self.ports
    }
}

/// Configures new sessions.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub(crate) default_transfer_mode: TransferMode,
    pub(crate) data_connection_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            default_transfer_mode: TransferMode::default(),
            data_connection_timeout: DEFAULT_DATA_CONNECTION_TIMEOUT,
        }
    }
}

impl SessionOptions {
    /// The transfer mode a session starts out with.
    pub fn default_transfer_mode(mut self, mode: TransferMode) -> Self {
        self.default_transfer_mode = mode;
        self
    }

    /// How long to wait for a client to connect to a passive listener.
    pub fn data_connection_timeout(mut self, timeout: Duration) -> Self {
        self.data_connection_timeout = timeout;
        self
    }
}

/// A logger that forwards to the `log` crate, for hosts that did not set up a slog drain.
pub fn default_logger() -> slog::Logger {
    slog::Logger::root(slog_stdlog::StdLog.fuse(), slog::o!())
}
