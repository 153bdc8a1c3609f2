//! Veil Engine
//!
//! The traffic-routing core of a split-tunnel VPN client: given an
//! established tunnel session (a [`Stack`](stack::Stack) implementation),
//! this crate decides per destination whether traffic goes through the
//! tunnel or directly, and carries it either way.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      veil-cli / embedder                  │
//! └───────────────────────────┬───────────────────────────────┘
//!                             ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                       veil-engine                         │
//! │  Resolver ── tunnel-aware DNS, caching, dedup             │
//! │  Dialer ──── per-connection VPN/direct decision           │
//! │  TunStack ── per-packet decision loop + DNS hijack        │
//! │  UdpForwarder ── local UDP ports relayed via the tunnel   │
//! └───────────────────────────┬───────────────────────────────┘
//!                             ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │  veil-tcpip: raw IPv4/TCP/UDP/ICMP packet views           │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dial;
pub mod dns;
pub mod error;
pub mod forward;
pub mod proxy;
pub mod resolve;
pub mod resource;
pub mod stack;
pub mod tun;

pub use config::{Config, EngineConfig, UdpForwardSpec};
pub use dial::Dialer;
pub use dns::DnsService;
pub use error::{Error, Result};
pub use forward::{ForwardCallbacks, UdpForwarder, DEFAULT_NAT_TIMEOUT};
pub use proxy::DirectProxy;
pub use resolve::{Resolution, Resolver, ResolverConfig};
pub use resource::{DomainResource, DomainTable, IpResource, Ipv4RangeSet, Protocol};
pub use stack::{BoxConn, Conn, LocalDnsServer, Stack, UdpConn};
pub use tun::{FramedIo, LengthFramedIo, PacketIo, TunStack, MTU};
