//! Contains the [`PassiveListenerFactory`] that binds listeners for `PASV` and `EPSV`.

use super::{
    datachan::DataEndpoint,
    error::ListenerError,
    session::{Session, SessionId},
    transport::{DataConnection, DataListener, Transport},
};
use crate::{
    metrics,
    options::{PassiveHost, PassiveOptions, PassivePorts, PortRange},
};
use dashmap::{DashMap, Entry};
use std::{
    fmt::{self, Debug, Formatter},
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

// Ports handed out and the session each one belongs to.
type PortRegistry = Arc<DashMap<u16, SessionId>>;

/// A bound passive listener, owned by the session that asked for it until a transfer takes it.
///
/// Dropping it closes the socket and frees the port in the factory's registry.
pub struct PassiveListener {
    inner: Box<dyn DataListener>,
    local_addr: SocketAddr,
    session_id: SessionId,
    registry: PortRegistry,
}

impl PassiveListener {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The session this listener was created for.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Waits for the client to connect.
    pub async fn accept(&self) -> io::Result<(Box<dyn DataConnection>, SocketAddr)> {
        self.inner.accept().await
    }

    /// Closes the listener and frees its port.
    pub async fn close(self) -> io::Result<()> {
        self.inner.close().await
    }
}

impl Debug for PassiveListener {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassiveListener")
            .field("local_addr", &self.local_addr)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl Drop for PassiveListener {
    fn drop(&mut self) {
        self.registry.remove_if(&self.local_addr.port(), |_, owner| *owner == self.session_id);
    }
}

/// Allocates passive mode listeners, honouring the configured port range.
#[derive(Debug)]
pub struct PassiveListenerFactory {
    transport: Arc<dyn Transport>,
    options: PassiveOptions,
    registry: PortRegistry,
    // Where the next range scan starts, rotated on every call to spread port reuse.
    next_offset: AtomicU32,
    logger: slog::Logger,
}

impl PassiveListenerFactory {
    /// Creates a factory binding through `transport`.
    pub fn new(transport: Arc<dyn Transport>, options: PassiveOptions, logger: slog::Logger) -> Self {
        let initial_offset = {
            let mut data = [0; 4];
            // Any starting point will do if the OS has no randomness for us.
            match getrandom::fill(&mut data) {
                Ok(()) => u32::from_ne_bytes(data),
                Err(_) => 0,
            }
        };
        PassiveListenerFactory {
            transport,
            options,
            registry: Arc::new(DashMap::new()),
            next_offset: AtomicU32::new(initial_offset),
            logger,
        }
    }

    /// Binds a listener for `session` and records it as the session's passive state, replacing
    /// a previous `PORT` address or passive listener.
    ///
    /// With a configured range the ports are tried in increasing order starting at a rotating
    /// offset; a `preferred_port` other than 0 must lie within the range. Without a range the
    /// OS picks a port, or `preferred_port` is used if it is not 0.
    #[tracing_attributes::instrument(skip(self, session))]
    pub async fn create_listener(&self, session: &mut Session, preferred_port: u16) -> Result<SocketAddr, ListenerError> {
        let listener = self.allocate(session.id(), preferred_port).await?;
        let addr = listener.local_addr();
        session.record_connection_setup(DataEndpoint::Passive(listener)).await;
        Ok(addr)
    }

    /// Like [`create_listener`](Self::create_listener) but hands the listener to the caller
    /// instead of storing it in a session.
    pub async fn allocate(&self, session_id: SessionId, preferred_port: u16) -> Result<PassiveListener, ListenerError> {
        let result = match &self.options.ports {
            PassivePorts::Ephemeral => self.bind_port(session_id, preferred_port).await,
            PassivePorts::Range(range) if preferred_port != 0 => {
                if !range.contains(preferred_port) {
                    return Err(ListenerError::OutOfRange {
                        port: preferred_port,
                        start: range.start(),
                        end: range.end(),
                    });
                }
                self.bind_port(session_id, preferred_port).await
            }
            PassivePorts::Range(range) => self.bind_in_range(session_id, *range).await,
        };
        match &result {
            Ok(listener) => {
                slog::debug!(self.logger, "Passive listener bound"; "addr" => %listener.local_addr(), "session" => %session_id);
                metrics::inc_passive_listener("allocated");
            }
            Err(ListenerError::RangeExhausted { .. }) => {
                slog::warn!(self.logger, "Out of passive ports"; "ports" => %self.options.ports);
                metrics::inc_passive_listener("exhausted");
            }
            Err(e) => {
                slog::warn!(self.logger, "Could not bind passive listener: {}", e);
                metrics::inc_passive_listener("failed");
            }
        }
        result
    }

    /// The session a passive port was handed out to, for correlating an accepted connection.
    pub fn session_for_port(&self, port: u16) -> Option<SessionId> {
        self.registry.get(&port).map(|owner| *owner)
    }

    /// The address to advertise in the `227` reply, given the local address of the control
    /// connection.
    pub fn advertised_ip(&self, control_local: SocketAddr) -> Option<Ipv4Addr> {
        match (&self.options.passive_host, control_local.ip()) {
            (PassiveHost::Ip(ip), _) => Some(*ip),
            (PassiveHost::FromConnection, IpAddr::V4(ip)) => Some(ip),
            (PassiveHost::FromConnection, IpAddr::V6(ip)) => ip.to_ipv4_mapped(),
        }
    }

    async fn bind_in_range(&self, session_id: SessionId, range: PortRange) -> Result<PassiveListener, ListenerError> {
        let (start, end) = (range.start(), range.end());
        let Some(size) = end.checked_sub(start).map(|span| u32::from(span) + 1) else {
            return Err(ListenerError::RangeExhausted { start, end });
        };
        let offset = self.next_offset.fetch_add(1, Ordering::Relaxed) % size;

        for i in 0..size {
            let port = start + ((offset + i) % size) as u16;
            slog::debug!(self.logger, "Trying if port {} is available", port);
            match self.bind_port(session_id, port).await {
                Ok(listener) => return Ok(listener),
                Err(ListenerError::Network(e)) if e.kind() == io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ListenerError::RangeExhausted { start, end })
    }

    // Claims the port in the registry first so two sessions never race for it, then binds.
    async fn bind_port(&self, session_id: SessionId, port: u16) -> Result<PassiveListener, ListenerError> {
        if port != 0 {
            match self.registry.entry(port) {
                Entry::Occupied(_) => return Err(io::Error::from(io::ErrorKind::AddrInUse).into()),
                Entry::Vacant(entry) => {
                    entry.insert(session_id);
                }
            }
        }

        let bound = async {
            let inner = self.transport.listen(SocketAddr::new(self.options.bind_ip, port)).await?;
            let local_addr = inner.local_addr()?;
            Ok::<_, io::Error>((inner, local_addr))
        }
        .await;

        match bound {
            Ok((inner, local_addr)) => {
                if port == 0 {
                    self.registry.insert(local_addr.port(), session_id);
                }
                Ok(PassiveListener {
                    inner,
                    local_addr,
                    session_id,
                    registry: Arc::clone(&self.registry),
                })
            }
            Err(e) => {
                if port != 0 {
                    self.registry.remove(&port);
                }
                Err(ListenerError::Network(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        options::SessionOptions,
        server::{session::ConnectionContext, transport::TcpTransport},
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::{Mutex, atomic::AtomicUsize};

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn factory(transport: Arc<dyn Transport>, ports: PassivePorts) -> PassiveListenerFactory {
        PassiveListenerFactory::new(transport, PassiveOptions::default().ports(ports).bind_ip(Ipv4Addr::LOCALHOST), logger())
    }

    fn session() -> Session {
        let ctx = ConnectionContext {
            peer: "127.0.0.1:40000".parse().unwrap(),
            local: "127.0.0.1:21".parse().unwrap(),
        };
        Session::new(ctx, &SessionOptions::default(), logger())
    }

    // Pretends every port in `taken` is bound by someone else and records what was tried.
    #[derive(Debug, Default)]
    struct FakeTransport {
        taken: Vec<u16>,
        denied: bool,
        attempts: Mutex<Vec<u16>>,
        closed: Arc<AtomicUsize>,
    }

    #[derive(Debug)]
    struct FakeListener(SocketAddr, Arc<AtomicUsize>);

    #[async_trait]
    impl DataListener for FakeListener {
        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(self.0)
        }

        async fn accept(&self) -> io::Result<(Box<dyn DataConnection>, SocketAddr)> {
            Err(io::ErrorKind::Unsupported.into())
        }

        async fn close(&self) -> io::Result<()> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn listen(&self, addr: SocketAddr) -> io::Result<Box<dyn DataListener>> {
            self.attempts.lock().unwrap().push(addr.port());
            if self.denied {
                return Err(io::ErrorKind::PermissionDenied.into());
            }
            if self.taken.contains(&addr.port()) {
                return Err(io::ErrorKind::AddrInUse.into());
            }
            let port = if addr.port() == 0 { 40123 } else { addr.port() };
            Ok(Box::new(FakeListener(SocketAddr::new(addr.ip(), port), self.closed.clone())))
        }

        async fn connect(&self, _addr: SocketAddr) -> io::Result<Box<dyn DataConnection>> {
            Err(io::ErrorKind::Unsupported.into())
        }
    }

    #[tokio::test]
    async fn range_exhausted_when_all_ports_are_bound() {
        let _a = std::net::TcpListener::bind("127.0.0.1:5000").unwrap();
        let _b = std::net::TcpListener::bind("127.0.0.1:5001").unwrap();
        let _c = std::net::TcpListener::bind("127.0.0.1:5002").unwrap();
        let factory = factory(Arc::new(TcpTransport), PassivePorts::range(5000..=5002).unwrap());

        let err = factory.create_listener(&mut session(), 0).await.unwrap_err();
        assert!(matches!(err, ListenerError::RangeExhausted { start: 5000, end: 5002 }));
    }

    #[tokio::test]
    async fn picks_the_only_free_port() {
        let transport = Arc::new(FakeTransport {
            taken: vec![5000, 5002],
            ..Default::default()
        });
        for _ in 0..3 {
            let factory = factory(transport.clone(), PassivePorts::range(5000..=5002).unwrap());
            let mut session = session();
            let addr = factory.create_listener(&mut session, 0).await.unwrap();
            assert_eq!(addr.port(), 5001);
            assert!(session.passive_listener().is_some());
        }
    }

    #[tokio::test]
    async fn scans_every_port_once_from_a_rotating_offset() {
        let transport = Arc::new(FakeTransport {
            taken: vec![7000, 7001, 7002, 7003],
            ..Default::default()
        });
        let factory = factory(transport.clone(), PassivePorts::range(7000..=7003).unwrap());
        assert!(matches!(factory.allocate(SessionId::new(), 0).await, Err(ListenerError::RangeExhausted { .. })));
        assert!(matches!(factory.allocate(SessionId::new(), 0).await, Err(ListenerError::RangeExhausted { .. })));

        let attempts = transport.attempts.lock().unwrap().clone();
        let (first, second) = attempts.split_at(4);
        let mut sorted = first.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![7000, 7001, 7002, 7003]);
        // The second scan starts one port further along.
        let next = if first[0] == 7003 { 7000 } else { first[0] + 1 };
        assert_eq!(second[0], next);
    }

    #[tokio::test]
    async fn preferred_port_outside_range_is_refused() {
        let factory = factory(Arc::new(FakeTransport::default()), PassivePorts::range(5000..=5002).unwrap());
        let err = factory.allocate(SessionId::new(), 6000).await.unwrap_err();
        assert!(matches!(err, ListenerError::OutOfRange { port: 6000, .. }));

        let listener = factory.allocate(SessionId::new(), 5002).await.unwrap();
        assert_eq!(listener.local_addr().port(), 5002);
    }

    #[tokio::test]
    async fn ephemeral_and_preferred_without_range() {
        let factory = factory(Arc::new(FakeTransport::default()), PassivePorts::Ephemeral);
        assert_eq!(factory.allocate(SessionId::new(), 0).await.unwrap().local_addr().port(), 40123);
        assert_eq!(factory.allocate(SessionId::new(), 2121).await.unwrap().local_addr().port(), 2121);
    }

    #[tokio::test]
    async fn network_errors_keep_their_category() {
        let transport = Arc::new(FakeTransport {
            denied: true,
            ..Default::default()
        });
        let factory = factory(transport, PassivePorts::range(5000..=5002).unwrap());
        let err = factory.allocate(SessionId::new(), 0).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(io::ErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn ports_are_registered_until_the_listener_is_dropped() {
        let factory = factory(Arc::new(FakeTransport::default()), PassivePorts::range(8000..=8000).unwrap());
        let id = SessionId::new();
        let listener = factory.allocate(id, 0).await.unwrap();
        assert_eq!(factory.session_for_port(8000), Some(id));

        // Claimed by the first session, so a second one cannot get it.
        assert!(matches!(factory.allocate(SessionId::new(), 0).await, Err(ListenerError::RangeExhausted { .. })));

        drop(listener);
        assert_eq!(factory.session_for_port(8000), None);
        assert!(factory.allocate(SessionId::new(), 0).await.is_ok());
    }

    #[tokio::test]
    async fn replaced_listener_is_closed() {
        let transport = Arc::new(FakeTransport::default());
        let factory = factory(transport.clone(), PassivePorts::range(8100..=8101).unwrap());
        let mut session = session();

        let first = factory.create_listener(&mut session, 8100).await.unwrap();
        factory.create_listener(&mut session, 8101).await.unwrap();
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
        assert_eq!(factory.session_for_port(first.port()), None);

        session.record_connection_setup(DataEndpoint::Active("127.0.0.1:40001".parse().unwrap())).await;
        assert_eq!(transport.closed.load(Ordering::SeqCst), 2);
        assert_eq!(factory.session_for_port(8101), None);
    }

    #[test]
    fn advertised_ip() {
        let f = factory(Arc::new(FakeTransport::default()), PassivePorts::Ephemeral);
        assert_eq!(f.advertised_ip("10.0.0.1:21".parse().unwrap()), Some(Ipv4Addr::new(10, 0, 0, 1)));

        let f = PassiveListenerFactory::new(
            Arc::new(FakeTransport::default()),
            PassiveOptions::default().passive_host([1, 2, 3, 4]),
            logger(),
        );
        assert_eq!(f.advertised_ip("10.0.0.1:21".parse().unwrap()), Some(Ipv4Addr::new(1, 2, 3, 4)));
    }
}
