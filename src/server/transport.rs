//! Contains the [`Transport`] capability: binding listeners and opening data connections.

use async_trait::async_trait;
use std::{fmt::Debug, io, net::SocketAddr};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpSocket, TcpStream},
};

/// A data connection stream.
pub trait DataConnection: AsyncRead + AsyncWrite + Send + Sync + Unpin + Debug {}

impl<T> DataConnection for T where T: AsyncRead + AsyncWrite + Send + Sync + Unpin + Debug {}

/// A listener that is bound and ready to accept one data connection.
#[async_trait]
pub trait DataListener: Send + Sync + Debug {
    /// The address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Waits for a client to connect.
    async fn accept(&self) -> io::Result<(Box<dyn DataConnection>, SocketAddr)>;

    /// Stops listening. Dropping the listener closes it too, this only exists for transports
    /// that can report a failure while doing so.
    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Socket primitives the session core uses for data connections.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Binds a listener to `addr`. Port 0 lets the operating system choose.
    async fn listen(&self, addr: SocketAddr) -> io::Result<Box<dyn DataListener>>;

    /// Connects to a client for an active mode transfer.
    async fn connect(&self, addr: SocketAddr) -> io::Result<Box<dyn DataConnection>>;
}

/// [`Transport`] implementation on top of tokio TCP sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

#[derive(Debug)]
struct TcpDataListener {
    inner: TcpListener,
}

#[async_trait]
impl DataListener for TcpDataListener {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    async fn accept(&self) -> io::Result<(Box<dyn DataConnection>, SocketAddr)> {
        let (stream, peer) = self.inner.accept().await?;
        Ok((Box::new(stream), peer))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    #[tracing_attributes::instrument]
    async fn listen(&self, addr: SocketAddr) -> io::Result<Box<dyn DataListener>> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        // Only lets us rebind ports lingering in TIME_WAIT, a port with a live listener still fails.
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1024)?;
        Ok(Box::new(TcpDataListener { inner: listener }))
    }

    #[tracing_attributes::instrument]
    async fn connect(&self, addr: SocketAddr) -> io::Result<Box<dyn DataConnection>> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn listen_accept_and_connect() {
        let transport = TcpTransport;
        let listener = transport.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let client = tokio::spawn(async move {
            let mut conn = TcpTransport.connect(addr).await.unwrap();
            conn.write_all(b"hello").await.unwrap();
        });

        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        conn.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
        client.await.unwrap();
    }

    #[tokio::test]
    async fn bound_port_cannot_be_bound_twice() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let err = TcpTransport.listen(addr).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }
}
