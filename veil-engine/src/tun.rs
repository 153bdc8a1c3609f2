//! TUN-backed packet engine
//!
//! When the tunnel is exposed as an OS TUN device, routing decisions happen
//! per raw IPv4 packet instead of per connection. The engine pumps packets
//! between the device and the tunnel transport, applies the IP resource
//! rules at packet granularity, and hijacks UDP DNS queries leaving the
//! tunnel's address space so they can be answered locally by the
//! tunnel-aware resolver.
//!
//! There is no "direct" path here: direct traffic never enters the TUN
//! device at all (the OS routing table sees to that), so a packet matching
//! no rule is dropped with a diagnostic.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpSocket, UdpSocket};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use veil_tcpip::{
    IcmpPacket, Ipv4Packet, TcpPacket, UdpPacket, IPV4_HEADER_MIN_LEN, IPV4_VERSION,
    PROTOCOL_ICMP, PROTOCOL_TCP, PROTOCOL_UDP, UDP_HEADER_LEN,
};

use crate::error::{Error, Result};
use crate::resource::IpResource;
use crate::stack::{BoxConn, LocalDnsServer, Stack, UdpConn};

/// Tunnel MTU; packet buffers are sized to this
pub const MTU: usize = 1400;

/// Whole-IP-packet I/O endpoint (a TUN device or a tunnel transport)
#[async_trait]
pub trait PacketIo: Send + Sync {
    /// Read one whole packet into `buf`, returning its length
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write one whole packet
    async fn write_packet(&self, packet: &[u8]) -> Result<()>;
}

/// [`PacketIo`] over a packet-preserving byte stream
///
/// One `read` must yield one whole packet (true of TUN file descriptors and
/// message-framed tunnel transports). Reads and writes are each serialized
/// behind their own lock so concurrent flows cannot interleave partial
/// packets onto the stream.
pub struct FramedIo<T> {
    reader: Mutex<ReadHalf<T>>,
    writer: Mutex<WriteHalf<T>>,
}

impl<T: AsyncRead + AsyncWrite + Send> FramedIo<T> {
    pub fn new(inner: T) -> Self {
        let (reader, writer) = tokio::io::split(inner);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Send> PacketIo for FramedIo<T> {
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize> {
        let n = self.reader.lock().await.read(buf).await?;
        if n == 0 {
            return Err(Error::Tunnel("packet stream closed".into()));
        }
        Ok(n)
    }

    async fn write_packet(&self, packet: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(packet).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// [`PacketIo`] over a plain byte stream, length-prefix framed
///
/// TCP coalesces and splits segments, so packet boundaries must be carried
/// explicitly: each packet travels behind a 2-byte big-endian length, the
/// same framing DNS uses over TCP. Use this for stream tunnel transports;
/// [`FramedIo`] is only for endpoints that already preserve packet
/// boundaries.
pub struct LengthFramedIo<T> {
    reader: Mutex<ReadHalf<T>>,
    writer: Mutex<WriteHalf<T>>,
}

impl<T: AsyncRead + AsyncWrite + Send> LengthFramedIo<T> {
    pub fn new(inner: T) -> Self {
        let (reader, writer) = tokio::io::split(inner);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Send> PacketIo for LengthFramedIo<T> {
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize> {
        let mut reader = self.reader.lock().await;
        let mut len_buf = [0u8; 2];
        reader.read_exact(&mut len_buf).await?;
        let len = usize::from(u16::from_be_bytes(len_buf));
        if len == 0 {
            return Err(Error::Tunnel("zero-length frame".into()));
        }
        if len > buf.len() {
            return Err(Error::Tunnel(format!(
                "frame of {len} bytes exceeds the {} byte buffer",
                buf.len()
            )));
        }
        reader.read_exact(&mut buf[..len]).await?;
        Ok(len)
    }

    async fn write_packet(&self, packet: &[u8]) -> Result<()> {
        let len = u16::try_from(packet.len())
            .map_err(|_| Error::Tunnel(format!("packet of {} bytes unframeable", packet.len())))?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(packet).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// TUN-mode tunnel backend
pub struct TunStack {
    device: Arc<dyn PacketIo>,
    tunnel: Arc<dyn PacketIo>,
    /// Interface address; outgoing tunnel dials bind to it so the OS
    /// routes them through the device
    local_ip: Ipv4Addr,
    ip_resources: Arc<Vec<IpResource>>,
    resolve: StdRwLock<Option<Arc<dyn LocalDnsServer>>>,
    shutdown: Arc<AtomicBool>,
}

impl TunStack {
    pub fn new(
        device: Arc<dyn PacketIo>,
        tunnel: Arc<dyn PacketIo>,
        local_ip: Ipv4Addr,
        ip_resources: Vec<IpResource>,
    ) -> Self {
        Self {
            device,
            tunnel,
            local_ip,
            ip_resources: Arc::new(ip_resources),
            resolve: StdRwLock::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal shutdown; in-progress pump errors are suppressed afterwards
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn dns_server(&self) -> Option<Arc<dyn LocalDnsServer>> {
        self.resolve.read().expect("resolve lock poisoned").clone()
    }

    /// The TUN → tunnel decision loop
    async fn uplink(&self) -> Result<()> {
        loop {
            let mut buf = vec![0u8; MTU];
            let n = match self.device.read_packet(&mut buf).await {
                Ok(n) => n,
                Err(_) if self.shutdown.load(Ordering::SeqCst) => return Ok(()),
                Err(e) => {
                    error!("TUN device read failed: {e}");
                    return Err(e);
                }
            };
            buf.truncate(n);

            if n < IPV4_HEADER_MIN_LEN {
                continue;
            }
            match veil_tcpip::ip_version(&buf) {
                Some(IPV4_VERSION) => {}
                version => {
                    debug!(?version, "not IPv4, skip");
                    continue;
                }
            }

            if let Err(e) = self.process_ipv4(buf).await {
                debug!("packet not forwarded: {e}");
            }
        }
    }

    /// The tunnel → TUN pump
    async fn downlink(
        tunnel: Arc<dyn PacketIo>,
        device: Arc<dyn PacketIo>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<()> {
        loop {
            let mut buf = vec![0u8; MTU];
            let n = match tunnel.read_packet(&mut buf).await {
                Ok(n) => n,
                Err(_) if shutdown.load(Ordering::SeqCst) => return Ok(()),
                Err(e) => {
                    error!("tunnel read failed: {e}");
                    return Err(e);
                }
            };
            device.write_packet(&buf[..n]).await?;
        }
    }

    async fn process_ipv4(&self, packet: Vec<u8>) -> Result<()> {
        let view = Ipv4Packet::new(&packet[..])?;
        let dst = view.destination_ip();
        let protocol = view.protocol();

        let port = match protocol {
            PROTOCOL_TCP => Some(TcpPacket::new(view.payload())?.destination_port()),
            PROTOCOL_UDP => {
                let udp = UdpPacket::new(view.payload())?;
                if udp.destination_port() == 53 {
                    if let Some(server) = self.dns_server() {
                        if server.check_dns_hijack(dst) {
                            self.spawn_dns_hijack(server, packet);
                            return Ok(());
                        }
                    }
                }
                Some(udp.destination_port())
            }
            PROTOCOL_ICMP => None,
            other => {
                return Err(Error::Tunnel(format!("protocol {other} not supported, skip")));
            }
        };

        // The kernel probes its own routes through the device; bounce
        // anything that is not globally routable straight back.
        if !is_global_unicast(dst) {
            return self.device.write_packet(&packet).await;
        }

        if protocol == PROTOCOL_ICMP {
            let icmp = IcmpPacket::new(view.payload())?;
            if icmp.code() != 0 {
                return Ok(());
            }
        }

        if self
            .ip_resources
            .iter()
            .any(|rule| rule.matches(dst, port, protocol))
        {
            self.tunnel.write_packet(&packet).await
        } else {
            match port {
                Some(port) => debug!("no VPN resource for {dst}:{port} [{protocol}], drop"),
                None => debug!("no VPN resource for {dst} [{protocol}], drop"),
            }
            Ok(())
        }
    }

    /// Answer a hijacked DNS query on its own task so resolution latency
    /// never stalls the decision loop
    fn spawn_dns_hijack(&self, server: Arc<dyn LocalDnsServer>, packet: Vec<u8>) {
        let device = Arc::clone(&self.device);
        tokio::spawn(async move {
            if let Err(e) = hijack_dns(device, server, packet).await {
                warn!("DNS hijack failed: {e}");
            }
        });
    }
}

/// Build and send the forged reply for one hijacked DNS query packet
async fn hijack_dns(
    device: Arc<dyn PacketIo>,
    server: Arc<dyn LocalDnsServer>,
    query_packet: Vec<u8>,
) -> Result<()> {
    let query_view = Ipv4Packet::new(&query_packet[..])?;
    let query_udp = UdpPacket::new(query_view.payload())?;
    debug!(
        "hijack dns {}:{} -> {}:{}",
        query_view.source_ip(),
        query_udp.source_port(),
        query_view.destination_ip(),
        query_udp.destination_port()
    );

    let msg = Message::from_vec(query_udp.payload()).map_err(|e| Error::Dns(e.to_string()))?;
    let reply = server.handle_dns_msg(&msg).await?;
    let reply_bytes = reply.to_vec().map_err(|e| Error::Dns(e.to_string()))?;

    let header_len = query_view.header_len();
    let total_len = header_len + UDP_HEADER_LEN + reply_bytes.len();
    let mut out = vec![0u8; total_len];
    out[..header_len].copy_from_slice(&query_packet[..header_len]);

    {
        let mut ip = Ipv4Packet::new_unchecked(&mut out[..]);
        ip.set_total_length(total_len as u16);
        ip.set_source_ip(query_view.destination_ip());
        ip.set_destination_ip(query_view.source_ip());
        let pseudo_sum = ip.pseudo_sum();

        let mut udp = UdpPacket::new(ip.payload_mut())?;
        udp.set_source_port(query_udp.destination_port());
        udp.set_destination_port(query_udp.source_port());
        udp.set_length((UDP_HEADER_LEN + reply_bytes.len()) as u16);
        udp.payload_mut().copy_from_slice(&reply_bytes);
        udp.fill_checksum(pseudo_sum);

        ip.fill_checksum();
    }

    device.write_packet(&out).await
}

/// Globally routable IPv4 unicast check
fn is_global_unicast(ip: Ipv4Addr) -> bool {
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        || ip.is_link_local()
        || ip.is_broadcast())
}

#[async_trait]
impl Stack for TunStack {
    async fn run(&self) -> Result<()> {
        let downlink = tokio::spawn(Self::downlink(
            Arc::clone(&self.tunnel),
            Arc::clone(&self.device),
            Arc::clone(&self.shutdown),
        ));

        tokio::select! {
            res = downlink => {
                res.map_err(|e| Error::Tunnel(format!("downlink task failed: {e}")))?
            }
            res = self.uplink() => res,
        }
    }

    async fn dial_tcp(&self, addr: std::net::SocketAddr) -> Result<BoxConn> {
        let socket = TcpSocket::new_v4()?;
        socket.bind(std::net::SocketAddr::new(self.local_ip.into(), 0))?;
        let stream = socket.connect(addr).await?;
        Ok(Box::new(stream))
    }

    async fn dial_udp(&self, addr: std::net::SocketAddr) -> Result<BoxConn> {
        let socket = UdpSocket::bind(std::net::SocketAddr::new(self.local_ip.into(), 0)).await?;
        socket.connect(addr).await?;
        Ok(Box::new(UdpConn::new(socket)))
    }

    fn setup_resolve(&self, server: Arc<dyn LocalDnsServer>) {
        *self.resolve.write().expect("resolve lock poisoned") = Some(server);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Protocol;
    use hickory_proto::op::{MessageType, OpCode, Query};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, RecordType};
    use std::str::FromStr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// In-memory packet endpoint backed by channels
    struct ChannelIo {
        rx: Mutex<mpsc::Receiver<Vec<u8>>>,
        tx: mpsc::Sender<Vec<u8>>,
    }

    impl ChannelIo {
        /// Returns the endpoint plus (inject, capture) channel ends
        fn new() -> (Arc<Self>, mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
            let (inject_tx, inject_rx) = mpsc::channel(16);
            let (capture_tx, capture_rx) = mpsc::channel(16);
            let io = Arc::new(Self {
                rx: Mutex::new(inject_rx),
                tx: capture_tx,
            });
            (io, inject_tx, capture_rx)
        }
    }

    #[async_trait]
    impl PacketIo for ChannelIo {
        async fn read_packet(&self, buf: &mut [u8]) -> Result<usize> {
            let packet = self
                .rx
                .lock()
                .await
                .recv()
                .await
                .ok_or_else(|| Error::Tunnel("endpoint closed".into()))?;
            buf[..packet.len()].copy_from_slice(&packet);
            Ok(packet.len())
        }

        async fn write_packet(&self, packet: &[u8]) -> Result<()> {
            self.tx
                .send(packet.to_vec())
                .await
                .map_err(|_| Error::Tunnel("endpoint closed".into()))
        }
    }

    /// Answers every A question with a fixed address
    struct FixedDnsServer {
        answer: Ipv4Addr,
    }

    #[async_trait]
    impl LocalDnsServer for FixedDnsServer {
        async fn handle_dns_msg(&self, msg: &Message) -> Result<Message> {
            let mut reply = Message::new();
            reply
                .set_id(msg.id())
                .set_message_type(MessageType::Response)
                .set_op_code(OpCode::Query)
                .set_recursion_available(true);
            for q in msg.queries() {
                reply.add_query(q.clone());
                if q.query_type() == RecordType::A {
                    reply.add_answer(hickory_proto::rr::Record::from_rdata(
                        q.name().clone(),
                        60,
                        RData::A(A(self.answer)),
                    ));
                }
            }
            Ok(reply)
        }

        fn check_dns_hijack(&self, dst: Ipv4Addr) -> bool {
            dst != Ipv4Addr::new(10, 0, 0, 53)
        }
    }

    fn corp_resources() -> Vec<IpResource> {
        vec![IpResource {
            ip_min: Ipv4Addr::new(10, 0, 0, 0),
            ip_max: Ipv4Addr::new(10, 255, 255, 255),
            port_min: 0,
            port_max: u16::MAX,
            protocol: Protocol::All,
            app_id: None,
            node_group_id: None,
        }]
    }

    /// Build an IPv4/UDP packet with valid checksums
    fn udp_packet(
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let total_len = IPV4_HEADER_MIN_LEN + UDP_HEADER_LEN + payload.len();
        let mut buf = vec![0u8; total_len];
        buf[0] = 0x45;
        buf[8] = 64;
        buf[9] = PROTOCOL_UDP;

        let mut ip = Ipv4Packet::new_unchecked(&mut buf[..]);
        ip.set_total_length(total_len as u16);
        ip.set_source_ip(src);
        ip.set_destination_ip(dst);
        let pseudo_sum = ip.pseudo_sum();

        let mut udp = UdpPacket::new(ip.payload_mut()).unwrap();
        udp.set_source_port(src_port);
        udp.set_destination_port(dst_port);
        udp.set_length((UDP_HEADER_LEN + payload.len()) as u16);
        udp.payload_mut().copy_from_slice(payload);
        udp.fill_checksum(pseudo_sum);
        ip.fill_checksum();
        buf
    }

    struct Harness {
        stack: Arc<TunStack>,
        tun_in: mpsc::Sender<Vec<u8>>,
        tun_out: mpsc::Receiver<Vec<u8>>,
        tunnel_out: mpsc::Receiver<Vec<u8>>,
        _tunnel_in: mpsc::Sender<Vec<u8>>,
    }

    fn start_stack(resources: Vec<IpResource>, dns: Option<Arc<dyn LocalDnsServer>>) -> Harness {
        let (device, tun_in, tun_out) = ChannelIo::new();
        let (tunnel, tunnel_in, tunnel_out) = ChannelIo::new();
        let stack = Arc::new(TunStack::new(
            device,
            tunnel,
            Ipv4Addr::new(10, 0, 254, 2),
            resources,
        ));
        if let Some(dns) = dns {
            stack.setup_resolve(dns);
        }
        let runner = Arc::clone(&stack);
        tokio::spawn(async move { runner.run().await });
        Harness {
            stack,
            tun_in,
            tun_out,
            tunnel_out,
            _tunnel_in: tunnel_in,
        }
    }

    async fn recv_timeout(rx: &mut mpsc::Receiver<Vec<u8>>) -> Option<Vec<u8>> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_matching_packet_forwarded_to_tunnel() {
        let mut h = start_stack(corp_resources(), None);
        let packet = udp_packet(
            Ipv4Addr::new(10, 0, 254, 2),
            40000,
            Ipv4Addr::new(10, 1, 2, 3),
            5000,
            b"payload",
        );
        h.tun_in.send(packet.clone()).await.unwrap();
        assert_eq!(recv_timeout(&mut h.tunnel_out).await.unwrap(), packet);
        h.stack.shutdown();
    }

    #[tokio::test]
    async fn test_unmatched_packet_dropped() {
        let mut h = start_stack(corp_resources(), None);
        let packet = udp_packet(
            Ipv4Addr::new(10, 0, 254, 2),
            40000,
            Ipv4Addr::new(8, 8, 4, 4),
            5000,
            b"payload",
        );
        h.tun_in.send(packet).await.unwrap();
        assert!(recv_timeout(&mut h.tunnel_out).await.is_none());
        h.stack.shutdown();
    }

    #[tokio::test]
    async fn test_non_global_unicast_looped_back() {
        let mut h = start_stack(corp_resources(), None);
        let packet = udp_packet(
            Ipv4Addr::new(10, 0, 254, 2),
            40000,
            Ipv4Addr::new(224, 0, 0, 251), // multicast
            5353,
            b"mdns",
        );
        h.tun_in.send(packet.clone()).await.unwrap();
        assert_eq!(recv_timeout(&mut h.tun_out).await.unwrap(), packet);
        h.stack.shutdown();
    }

    #[tokio::test]
    async fn test_non_ipv4_dropped() {
        let mut h = start_stack(corp_resources(), None);
        let mut packet = vec![0u8; 60];
        packet[0] = 0x60; // IPv6
        h.tun_in.send(packet).await.unwrap();
        assert!(recv_timeout(&mut h.tunnel_out).await.is_none());
        assert!(recv_timeout(&mut h.tun_out).await.is_none());
        h.stack.shutdown();
    }

    #[tokio::test]
    async fn test_dns_hijack_reply_shape() {
        let resolved = Ipv4Addr::new(10, 77, 0, 1);
        let mut h = start_stack(
            corp_resources(),
            Some(Arc::new(FixedDnsServer { answer: resolved })),
        );

        // Spoofed query: A? portal.corp.example.com to 8.8.8.8:53
        let mut query = Message::new();
        query
            .set_id(0xbeef)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(
                Name::from_str("portal.corp.example.com.").unwrap(),
                RecordType::A,
            ));
        let client = Ipv4Addr::new(10, 0, 254, 2);
        let dns = Ipv4Addr::new(8, 8, 8, 8);
        let packet = udp_packet(client, 51000, dns, 53, &query.to_vec().unwrap());
        h.tun_in.send(packet).await.unwrap();

        let reply_packet = recv_timeout(&mut h.tun_out).await.expect("no hijack reply");

        let ip = Ipv4Packet::new(&reply_packet[..]).unwrap();
        assert_eq!(ip.source_ip(), dns);
        assert_eq!(ip.destination_ip(), client);
        assert!(ip.verify_checksum());

        let pseudo_sum = ip.pseudo_sum();
        let udp = UdpPacket::new(ip.payload()).unwrap();
        assert_eq!(udp.source_port(), 53);
        assert_eq!(udp.destination_port(), 51000);
        assert!(udp.verify_checksum(pseudo_sum));
        assert_eq!(usize::from(udp.length()), UDP_HEADER_LEN + udp.payload().len());

        let reply = Message::from_vec(udp.payload()).unwrap();
        assert_eq!(reply.id(), 0xbeef);
        assert_eq!(reply.answers().len(), 1);
        match reply.answers()[0].data() {
            Some(RData::A(a)) => assert_eq!(a.0, resolved),
            other => panic!("unexpected answer {other:?}"),
        }

        // Nothing was forwarded to the tunnel for the hijacked query
        assert!(recv_timeout(&mut h.tunnel_out).await.is_none());
        h.stack.shutdown();
    }

    #[tokio::test]
    async fn test_query_to_tunnel_dns_not_hijacked() {
        let mut h = start_stack(
            corp_resources(),
            Some(Arc::new(FixedDnsServer {
                answer: Ipv4Addr::new(10, 77, 0, 1),
            })),
        );
        let packet = udp_packet(
            Ipv4Addr::new(10, 0, 254, 2),
            51000,
            Ipv4Addr::new(10, 0, 0, 53), // the tunnel's own DNS
            53,
            b"\x12\x34\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00",
        );
        h.tun_in.send(packet.clone()).await.unwrap();
        // Forwarded through the tunnel instead of answered locally
        assert_eq!(recv_timeout(&mut h.tunnel_out).await.unwrap(), packet);
        h.stack.shutdown();
    }

    #[tokio::test]
    async fn test_icmp_echo_forwarded_nonzero_code_dropped() {
        let mut h = start_stack(corp_resources(), None);

        let make_icmp = |code: u8| {
            let total_len = IPV4_HEADER_MIN_LEN + 8;
            let mut buf = vec![0u8; total_len];
            buf[0] = 0x45;
            buf[9] = PROTOCOL_ICMP;
            let mut ip = Ipv4Packet::new_unchecked(&mut buf[..]);
            ip.set_total_length(total_len as u16);
            ip.set_source_ip(Ipv4Addr::new(10, 0, 254, 2));
            ip.set_destination_ip(Ipv4Addr::new(10, 1, 1, 1));
            let payload = ip.payload_mut();
            payload[0] = 8; // echo request
            payload[1] = code;
            let mut icmp = IcmpPacket::new(&mut payload[..]).unwrap();
            icmp.fill_checksum();
            ip.fill_checksum();
            buf
        };

        h.tun_in.send(make_icmp(0)).await.unwrap();
        assert!(recv_timeout(&mut h.tunnel_out).await.is_some());

        h.tun_in.send(make_icmp(1)).await.unwrap();
        assert!(recv_timeout(&mut h.tunnel_out).await.is_none());
        h.stack.shutdown();
    }

    #[tokio::test]
    async fn test_length_framed_io_keeps_packet_boundaries() {
        let (near, mut far) = tokio::io::duplex(4096);
        let io = LengthFramedIo::new(near);

        let first = udp_packet(
            Ipv4Addr::new(10, 0, 254, 2),
            40000,
            Ipv4Addr::new(10, 1, 2, 3),
            5000,
            b"first",
        );
        let second = udp_packet(
            Ipv4Addr::new(10, 0, 254, 2),
            40001,
            Ipv4Addr::new(10, 1, 2, 4),
            5001,
            b"second-longer",
        );

        // Both frames land in one contiguous write, as TCP may deliver them
        let mut wire = Vec::new();
        for packet in [&first, &second] {
            wire.extend_from_slice(&(packet.len() as u16).to_be_bytes());
            wire.extend_from_slice(packet);
        }
        far.write_all(&wire).await.unwrap();

        let mut buf = vec![0u8; MTU];
        let n = io.read_packet(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &first[..]);
        let n = io.read_packet(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &second[..]);
    }

    #[tokio::test]
    async fn test_length_framed_io_round_trip() {
        let (near, far) = tokio::io::duplex(4096);
        let tx = LengthFramedIo::new(near);
        let rx = LengthFramedIo::new(far);

        let packet = udp_packet(
            Ipv4Addr::new(10, 0, 254, 2),
            40000,
            Ipv4Addr::new(10, 1, 2, 3),
            5000,
            b"payload",
        );
        tx.write_packet(&packet).await.unwrap();
        tx.write_packet(&packet).await.unwrap();

        let mut buf = vec![0u8; MTU];
        assert_eq!(rx.read_packet(&mut buf).await.unwrap(), packet.len());
        assert_eq!(&buf[..packet.len()], &packet[..]);
        assert_eq!(rx.read_packet(&mut buf).await.unwrap(), packet.len());
    }

    #[tokio::test]
    async fn test_length_framed_io_rejects_oversized_frame() {
        let (near, mut far) = tokio::io::duplex(4096);
        let io = LengthFramedIo::new(near);

        far.write_all(&(2000u16).to_be_bytes()).await.unwrap();
        far.write_all(&[0u8; 64]).await.unwrap();

        let mut buf = vec![0u8; MTU];
        assert!(matches!(
            io.read_packet(&mut buf).await,
            Err(Error::Tunnel(_))
        ));
    }

    #[test]
    fn test_is_global_unicast() {
        assert!(is_global_unicast(Ipv4Addr::new(8, 8, 8, 8)));
        assert!(is_global_unicast(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!is_global_unicast(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(!is_global_unicast(Ipv4Addr::new(224, 0, 0, 1)));
        assert!(!is_global_unicast(Ipv4Addr::new(255, 255, 255, 255)));
        assert!(!is_global_unicast(Ipv4Addr::new(169, 254, 1, 1)));
        assert!(!is_global_unicast(Ipv4Addr::new(0, 0, 0, 0)));
    }
}
