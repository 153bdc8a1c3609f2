//! Upstream proxy chaining for direct connections
//!
//! A direct (non-tunnel) TCP dial can be redirected through exactly one
//! configured upstream proxy: an HTTP proxy spoken to with `CONNECT`, or a
//! SOCKS5 proxy per RFC 1928 (no-auth method only). Proxy handshake
//! failures are reported as [`Error::Proxy`] so callers can tell "proxy
//! rejected" from "network unreachable".

use std::net::IpAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::warn;

use crate::dial::split_host_port;
use crate::error::{Error, Result};

const SOCKS5_VERSION: u8 = 0x05;
const SOCKS5_METHOD_NO_AUTH: u8 = 0x00;
const SOCKS5_CMD_CONNECT: u8 = 0x01;
const SOCKS5_ATYP_IPV4: u8 = 0x01;
const SOCKS5_ATYP_DOMAIN: u8 = 0x03;
const SOCKS5_ATYP_IPV6: u8 = 0x04;

/// Which upstream proxy, if any, direct dials go through
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DirectProxy {
    #[default]
    None,
    /// `host:port` of an HTTP CONNECT proxy
    Http(String),
    /// `host:port` of a SOCKS5 proxy
    Socks5(String),
}

impl DirectProxy {
    /// Parse a proxy URL of the form `http://host:port` or
    /// `socks://host:port`
    ///
    /// An unrecognized scheme disables proxying with a warning; it is never
    /// a startup failure.
    pub fn parse(url: Option<&str>) -> Self {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            return DirectProxy::None;
        };
        if let Some(addr) = url.strip_prefix("http://") {
            DirectProxy::Http(addr.to_string())
        } else if let Some(addr) = url.strip_prefix("socks://") {
            DirectProxy::Socks5(addr.to_string())
        } else {
            warn!("unsupported direct-proxy scheme in {url:?}, proxying disabled");
            DirectProxy::None
        }
    }
}

/// Establish a tunnel to `target` through an HTTP CONNECT proxy
///
/// `target` may be `host:port` or `ip:port`; the proxy resolves it. The
/// response status line must carry a `200`.
pub async fn http_connect(proxy: &str, target: &str) -> Result<TcpStream> {
    let mut conn = TcpStream::connect(proxy).await?;
    conn.write_all(format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n").as_bytes())
        .await?;

    // Read until the end of the response headers
    let mut response = Vec::with_capacity(256);
    let mut buf = [0u8; 256];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        if response.len() > 8192 {
            return Err(Error::Proxy("oversized CONNECT response".into()));
        }
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Proxy("proxy closed during CONNECT".into()));
        }
        response.extend_from_slice(&buf[..n]);
    }

    let header = String::from_utf8_lossy(&response);
    if header.contains("200") {
        Ok(conn)
    } else {
        let status = header.lines().next().unwrap_or_default().to_string();
        Err(Error::Proxy(format!("CONNECT to {target} refused: {status}")))
    }
}

/// Establish a tunnel to `target` through a SOCKS5 proxy (RFC 1928)
///
/// The destination is encoded as IPv4/IPv6 when `target`'s host parses as
/// an address, and as a domain otherwise.
pub async fn socks5_connect(proxy: &str, target: &str) -> Result<TcpStream> {
    let (host, port) = split_host_port(target)?;
    let mut conn = TcpStream::connect(proxy).await?;

    // Method negotiation: we offer no-auth only
    conn.write_all(&[SOCKS5_VERSION, 1, SOCKS5_METHOD_NO_AUTH])
        .await?;
    let mut method_reply = [0u8; 2];
    conn.read_exact(&mut method_reply).await?;
    if method_reply[0] != SOCKS5_VERSION || method_reply[1] != SOCKS5_METHOD_NO_AUTH {
        return Err(Error::Proxy(format!(
            "SOCKS5 method negotiation failed: {method_reply:?}"
        )));
    }

    // CONNECT request
    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_CONNECT, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(SOCKS5_ATYP_IPV4);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(SOCKS5_ATYP_IPV6);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            if host.len() > 255 {
                return Err(Error::Address(target.to_string()));
            }
            request.push(SOCKS5_ATYP_DOMAIN);
            request.push(host.len() as u8);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    conn.write_all(&request).await?;

    // Reply: VER REP RSV ATYP BND.ADDR BND.PORT
    let mut reply = [0u8; 4];
    conn.read_exact(&mut reply).await?;
    if reply[0] != SOCKS5_VERSION {
        return Err(Error::Proxy(format!("bad SOCKS5 reply version {}", reply[0])));
    }
    if reply[1] != 0x00 {
        return Err(Error::Proxy(format!(
            "SOCKS5 CONNECT to {target} refused: reply code {}",
            reply[1]
        )));
    }
    let bound_len = match reply[3] {
        SOCKS5_ATYP_IPV4 => 4 + 2,
        SOCKS5_ATYP_IPV6 => 16 + 2,
        SOCKS5_ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            conn.read_exact(&mut len).await?;
            usize::from(len[0]) + 2
        }
        other => return Err(Error::Proxy(format!("bad SOCKS5 bound address type {other}"))),
    };
    let mut bound = vec![0u8; bound_len];
    conn.read_exact(&mut bound).await?;

    Ok(conn)
}
