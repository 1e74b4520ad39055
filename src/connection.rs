use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

#[allow(async_fn_in_trait)]
pub trait Connection {
    fn peer(&self) -> String;

    /// Blocking read of up to `buf.len()` bytes. `Ok(0)` means the peer closed.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Zero-timeout readiness check followed by a non-blocking read.
    /// `Ok(None)` when nothing is waiting; never blocks.
    async fn poll_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    async fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait Acceptor {
    type Conn: Connection;

    async fn accept(&mut self) -> io::Result<Self::Conn>;
}

pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }
}

impl Connection for TcpConnection {
    fn peer(&self) -> String {
        self.peer.to_string()
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn poll_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        // Batches run without yielding; give the reactor one turn so socket
        // readiness reflects what arrived during the last batch.
        tokio::task::yield_now().await;
        match self.stream.try_read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Acceptor for TcpAcceptor {
    type Conn = TcpConnection;

    async fn accept(&mut self) -> io::Result<TcpConnection> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(TcpConnection::new(stream, peer))
    }
}
