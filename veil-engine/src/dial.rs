//! VPN-vs-direct connection dialing
//!
//! The dialer turns a routing decision into an actual connection: through
//! the tunnel [`Stack`] when a rule or flag says so, directly otherwise.
//! Direct connections may chain through one configured upstream HTTP or
//! SOCKS5 proxy.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::proxy::DirectProxy;
use crate::resolve::{Resolution, Resolver};
use crate::resource::Ipv4RangeSet;
use crate::stack::{BoxConn, Stack, UdpConn};

/// Split-tunnel dialer
pub struct Dialer {
    stack: Arc<dyn Stack>,
    resolver: Arc<Resolver>,
    ip_set: Ipv4RangeSet,
    /// Route everything through the tunnel regardless of rules
    proxy_all: bool,
    direct_proxy: DirectProxy,
}

impl Dialer {
    pub fn new(
        stack: Arc<dyn Stack>,
        resolver: Arc<Resolver>,
        ip_set: Ipv4RangeSet,
        proxy_all: bool,
        direct_proxy_url: Option<&str>,
    ) -> Self {
        Self {
            stack,
            resolver,
            ip_set,
            proxy_all,
            direct_proxy: DirectProxy::parse(direct_proxy_url),
        }
    }

    /// Dial `host:port`, resolving the host first
    ///
    /// Resolution failure does not abort the dial: the hostname is handed to
    /// the OS to resolve on a direct connection, mirroring the resolver's
    /// degrade-don't-fail policy.
    pub async fn dial(&self, network: &str, addr: &str) -> Result<BoxConn> {
        let (host, port) = split_host_port(addr)?;

        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.dial_decided(network, ip, port, None).await;
        }

        match self.resolver.resolve(&host).await {
            Ok(resolution) => {
                self.dial_decided(network, resolution.ip, port, Some(&resolution))
                    .await
            }
            Err(e) => {
                debug!(host, %e, "resolve failed, dialing direct by hostname");
                self.dial_direct(network, addr, addr).await
            }
        }
    }

    /// Dial a literal `ip:port` with no routing hints beyond the IP rules
    pub async fn dial_ip_port(&self, network: &str, addr: &str) -> Result<BoxConn> {
        let (host, port) = split_host_port(addr)?;
        let ip = host
            .parse::<IpAddr>()
            .map_err(|_| Error::Address(addr.to_string()))?;
        self.dial_decided(network, ip, port, None).await
    }

    /// The routing decision: tunnel if forced or rule-matched, else direct
    async fn dial_decided(
        &self,
        network: &str,
        ip: IpAddr,
        port: u16,
        resolution: Option<&Resolution>,
    ) -> Result<BoxConn> {
        let ip_addr = format!("{}", SocketAddr::new(ip, port));
        // The proxy CONNECT target keeps the hostname when we have one, for
        // SNI/virtual-hosting at the far end.
        let host_addr = match resolution {
            Some(res) => format!("{}:{}", res.host, port),
            None => ip_addr.clone(),
        };

        // IPv6 always bypasses the tunnel
        let IpAddr::V4(ipv4) = ip else {
            return self.dial_direct(network, &ip_addr, &host_addr).await;
        };

        let use_tunnel = self.proxy_all
            || resolution.is_some_and(|res| res.use_tunnel)
            || self.ip_set.contains(ipv4);

        if !use_tunnel {
            return self.dial_direct(network, &ip_addr, &host_addr).await;
        }

        let addr = SocketAddr::new(ip, port);
        match network {
            "tcp" => {
                info!("{ip_addr} -> VPN");
                self.stack.dial_tcp(addr).await
            }
            "udp" => {
                info!("{ip_addr} -> VPN");
                self.stack.dial_udp(addr).await
            }
            other => {
                warn!("VPN only supports tcp/udp; {ip_addr} ({other}) will use direct connection");
                self.dial_direct(network, &ip_addr, &host_addr).await
            }
        }
    }

    /// Direct dial, chained through the upstream proxy when one is
    /// configured (TCP only; UDP always goes straight out)
    async fn dial_direct(&self, network: &str, ip_addr: &str, host_addr: &str) -> Result<BoxConn> {
        match (&self.direct_proxy, network) {
            (DirectProxy::Http(proxy), "tcp") => {
                info!("{host_addr} -> PROXY[http://{proxy}]");
                let conn = crate::proxy::http_connect(proxy, host_addr).await?;
                Ok(Box::new(conn))
            }
            (DirectProxy::Socks5(proxy), "tcp") => {
                info!("{host_addr} -> PROXY[socks://{proxy}]");
                let conn = crate::proxy::socks5_connect(proxy, host_addr).await?;
                Ok(Box::new(conn))
            }
            _ => self.dial_direct_without_proxy(network, ip_addr).await,
        }
    }

    async fn dial_direct_without_proxy(&self, network: &str, addr: &str) -> Result<BoxConn> {
        info!("{addr} -> DIRECT");
        match network {
            "udp" => {
                let target = addr
                    .parse::<SocketAddr>()
                    .map_err(|_| Error::Address(addr.to_string()))?;
                let socket = UdpSocket::bind(if target.is_ipv4() {
                    "0.0.0.0:0"
                } else {
                    "[::]:0"
                })
                .await?;
                socket.connect(target).await?;
                Ok(Box::new(UdpConn::new(socket)))
            }
            // Anything that is not UDP dials as a TCP stream; the hostname
            // form is allowed here so the OS can resolve it.
            _ => Ok(Box::new(TcpStream::connect(addr).await?)),
        }
    }
}

/// Split `host:port`, accepting `[v6]:port` and bare-v6-with-port forms
pub(crate) fn split_host_port(addr: &str) -> Result<(String, u16)> {
    // Bracketed IPv6
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, port) = rest
            .split_once("]:")
            .ok_or_else(|| Error::Address(addr.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::Address(addr.to_string()))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::Address(addr.to_string()))?;
    if host.is_empty() {
        return Err(Error::Address(addr.to_string()));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::Address(addr.to_string()))?;
    Ok((host.to_string(), port))
}
