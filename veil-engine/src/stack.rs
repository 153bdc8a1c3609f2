//! Tunnel backend abstraction
//!
//! A [`Stack`] is one tunnel backend: it pumps packets for the life of the
//! session and dials TCP/UDP endpoints that are reachable through the
//! tunnel. The engine's resolver, dialer and UDP forwarder all consume this
//! trait and never care which backend is active.

use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

use crate::error::Result;

/// A bidirectional byte/datagram stream, tunnel-dialed or direct
pub trait Conn: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Conn for T {}

/// Boxed connection handed out by dialers
pub type BoxConn = Box<dyn Conn>;

/// One tunnel backend
#[async_trait]
pub trait Stack: Send + Sync {
    /// Run the backend's packet pump until the session ends
    async fn run(&self) -> Result<()>;

    /// Dial a tunnel-reachable TCP endpoint
    async fn dial_tcp(&self, addr: SocketAddr) -> Result<BoxConn>;

    /// Dial a tunnel-reachable UDP endpoint
    async fn dial_udp(&self, addr: SocketAddr) -> Result<BoxConn>;

    /// Install the DNS-hijack callback
    ///
    /// Only meaningful for backends that see raw packets (the TUN backend);
    /// the default is a no-op.
    fn setup_resolve(&self, _server: Arc<dyn LocalDnsServer>) {}
}

/// Local DNS answering service consumed by the packet engine
#[async_trait]
pub trait LocalDnsServer: Send + Sync {
    /// Answer one DNS message using tunnel-aware resolution
    async fn handle_dns_msg(&self, msg: &Message) -> Result<Message>;

    /// Whether a UDP:53 packet to `dst` should be hijacked rather than
    /// forwarded
    fn check_dns_hijack(&self, dst: Ipv4Addr) -> bool;
}

/// Connected UDP socket adapted to the [`Conn`] shape
///
/// One datagram per read/write. Used for direct UDP dials so the dialer can
/// hand out the same connection type regardless of route.
pub struct UdpConn {
    socket: UdpSocket,
}

impl UdpConn {
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

impl AsyncRead for UdpConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.socket.poll_recv(cx, buf)
    }
}

impl AsyncWrite for UdpConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_udp_conn_round_trip() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(peer_addr).await.unwrap();
        let mut conn = UdpConn::new(socket);

        conn.write_all(b"hello").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, src) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        peer.send_to(b"world", src).await.unwrap();
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"world");
    }
}
