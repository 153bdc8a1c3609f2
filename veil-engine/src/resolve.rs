//! Split-tunnel-aware DNS resolution
//!
//! The resolver decides, per hostname, whether a destination lives inside
//! the tunnel, and turns the hostname into an IP. Remote (tunnel-side)
//! lookups go through the active [`Stack`]; failures degrade to the
//! secondary/system resolver and are never surfaced to the caller unless
//! every path is exhausted.
//!
//! Concurrency: at most one remote DNS query is in flight per hostname. The
//! first task to try a host takes its dedup lock and performs the query;
//! concurrent tasks for the same host wait on the lock and then read the
//! answer from the cache.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use lru::LruCache;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::resource::DomainTable;
use crate::stack::{BoxConn, Stack};

/// DNS query timeout against the tunnel DNS server
const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// How long UDP remote DNS stays disabled after a UDP failure with a TCP
/// success
const UDP_DISABLE_COOLDOWN: Duration = Duration::from_secs(600);

/// Maximum UDP DNS response size
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Maximum number of cached host entries
const MAX_CACHE_ENTRIES: usize = 4096;

/// Outcome of a resolution
///
/// Replaces the original design's stringly-keyed context values: the routing
/// hint and the literal resolved host travel with the IP as one typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved address
    pub ip: IpAddr,
    /// The host string that was resolved, for SNI/Host-header use downstream
    pub host: String,
    /// Whether a domain rule or pinned entry forces this destination through
    /// the tunnel
    pub use_tunnel: bool,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    ip: IpAddr,
    /// `None` means permanent (custom DNS), which never expires
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if Instant::now() >= at)
    }
}

#[derive(Debug, Default)]
struct TcpMode {
    use_tcp: bool,
    reset_armed: bool,
}

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Tunnel-side DNS server; `None` disables remote DNS entirely
    pub remote_dns_server: Option<Ipv4Addr>,
    /// Explicit secondary DNS server; `None` uses the system resolver
    pub secondary_dns_server: Option<IpAddr>,
    /// Cache TTL for remote answers
    pub ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            remote_dns_server: None,
            secondary_dns_server: None,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Split-tunnel-aware resolver
pub struct Resolver {
    stack: Arc<dyn Stack>,
    remote_dns_server: Option<Ipv4Addr>,
    secondary_dns_server: Option<IpAddr>,
    ttl: Duration,
    domain_table: DomainTable,
    /// Pinned host → IP overrides (server-provided or user-configured)
    static_dns: HashMap<String, IpAddr>,
    cache: RwLock<LruCache<String, CacheEntry>>,
    /// UDP-vs-TCP remote query mode with its one-shot cooldown state
    tcp_mode: Arc<RwLock<TcpMode>>,
    /// Per-host dedup locks, purged periodically to bound memory
    resolve_locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Resolver {
    pub fn new(
        stack: Arc<dyn Stack>,
        config: ResolverConfig,
        domain_table: DomainTable,
        static_dns: HashMap<String, IpAddr>,
    ) -> Arc<Self> {
        let resolver = Arc::new(Self {
            stack,
            remote_dns_server: config.remote_dns_server,
            secondary_dns_server: config.secondary_dns_server,
            ttl: config.ttl,
            domain_table,
            static_dns,
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(MAX_CACHE_ENTRIES).expect("cache size is non-zero"),
            )),
            tcp_mode: Arc::new(RwLock::new(TcpMode::default())),
            resolve_locks: Arc::new(StdMutex::new(HashMap::new())),
        });

        // Purge the dedup lock map every 10×TTL; in-flight holders keep
        // their Arc alive.
        let locks = Arc::clone(&resolver.resolve_locks);
        let interval = config.ttl * 10;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let purged = {
                    let mut locks = locks.lock().expect("resolve lock map poisoned");
                    let purged = locks.len();
                    locks.clear();
                    purged
                };
                debug!(purged, "purged resolve lock map");
            }
        });

        resolver
    }

    /// Cache TTL configured for this resolver
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Pin a host to an IP forever
    ///
    /// Permanent entries take priority over every other resolution path and
    /// never expire.
    pub async fn set_permanent_dns(&self, host: &str, ip: IpAddr) {
        self.cache.write().await.put(
            host.to_string(),
            CacheEntry {
                ip,
                expires_at: None,
            },
        );
    }

    /// Resolve a host to an IP, stamping the tunnel routing hint
    ///
    /// Resolution order: domain-rule marking, cache, pinned overrides,
    /// remote (tunnel) DNS with dedup and UDP→TCP fallback, secondary DNS.
    pub async fn resolve(&self, host: &str) -> Result<Resolution> {
        let mut use_tunnel = false;
        if let Some((domain, _)) = self.domain_table.match_suffix(host) {
            debug!(host, domain, "domain resource matched");
            use_tunnel = true;
        }

        if let Some(ip) = self.cache_get(host).await {
            info!("{host} -> {ip} (cached)");
            return Ok(Resolution {
                ip,
                host: host.to_string(),
                use_tunnel,
            });
        }

        if let Some(&ip) = self.static_dns.get(host) {
            info!("{host} -> {ip} (pinned)");
            return Ok(Resolution {
                ip,
                host: host.to_string(),
                use_tunnel: true,
            });
        }

        let Some(remote_dns) = self.remote_dns_server else {
            return self.resolve_with_secondary(host, use_tunnel).await;
        };

        let lock = self.dedup_lock(host);
        match Arc::clone(&lock).try_lock_owned() {
            Ok(_guard) => {
                let use_tcp = self.tcp_mode.read().await.use_tcp;
                let ip = if !use_tcp {
                    match self.query_remote_udp(remote_dns, host).await {
                        Ok(ip) => Some(ip),
                        Err(udp_err) => match self.query_remote_tcp(remote_dns, host).await {
                            Ok(ip) => {
                                debug!(host, %udp_err, "UDP remote DNS failed, TCP succeeded");
                                self.arm_tcp_cooldown().await;
                                Some(ip)
                            }
                            Err(_) => None,
                        },
                    }
                } else {
                    self.query_remote_tcp(remote_dns, host).await.ok()
                };

                match ip {
                    Some(ip) => {
                        self.cache_put(host, ip).await;
                        info!("{host} -> {ip}");
                        Ok(Resolution {
                            ip,
                            host: host.to_string(),
                            use_tunnel,
                        })
                    }
                    None => {
                        warn!(host, "remote DNS failed, using secondary DNS");
                        self.resolve_with_secondary(host, use_tunnel).await
                    }
                }
            }
            Err(_) => {
                // Another task is resolving this host; wait for it, then the
                // answer must be in the cache.
                drop(lock.lock().await);
                if let Some(ip) = self.cache_get(host).await {
                    return Ok(Resolution {
                        ip,
                        host: host.to_string(),
                        use_tunnel,
                    });
                }
                self.resolve_with_secondary(host, use_tunnel).await
            }
        }
    }

    /// Resolve via the secondary/system resolver, A first, then AAAA
    ///
    /// Answers are not cached here: the OS resolver (or the secondary
    /// server) already caches. Exhaustion of both record types is the only
    /// error this resolver ever surfaces.
    pub async fn resolve_with_secondary(&self, host: &str, use_tunnel: bool) -> Result<Resolution> {
        let ip = match self.secondary_dns_server {
            Some(server) => {
                let server = SocketAddr::new(server, 53);
                match query_plain_udp(server, host, RecordType::A).await {
                    Ok(ip) => ip,
                    Err(_) => {
                        debug!(host, "secondary A lookup failed, trying AAAA");
                        query_plain_udp(server, host, RecordType::AAAA)
                            .await
                            .map_err(|e| Error::Resolve {
                                host: host.to_string(),
                                reason: e.to_string(),
                            })?
                    }
                }
            }
            None => {
                let mut addrs = tokio::net::lookup_host((host, 0))
                    .await
                    .map_err(|e| Error::Resolve {
                        host: host.to_string(),
                        reason: e.to_string(),
                    })?
                    .map(|addr| addr.ip())
                    .peekable();
                let first = addrs.peek().copied();
                addrs
                    .find(|ip| ip.is_ipv4())
                    .or(first)
                    .ok_or_else(|| Error::Resolve {
                        host: host.to_string(),
                        reason: "no A or AAAA record".to_string(),
                    })?
            }
        };

        info!("{host} -> {ip} (secondary)");
        Ok(Resolution {
            ip,
            host: host.to_string(),
            use_tunnel,
        })
    }

    async fn cache_get(&self, host: &str) -> Option<IpAddr> {
        let mut cache = self.cache.write().await;
        match cache.get(host) {
            Some(entry) if entry.is_expired() => {
                cache.pop(host);
                None
            }
            Some(entry) => Some(entry.ip),
            None => None,
        }
    }

    async fn cache_put(&self, host: &str, ip: IpAddr) {
        self.cache.write().await.put(
            host.to_string(),
            CacheEntry {
                ip,
                expires_at: Some(Instant::now() + self.ttl),
            },
        );
    }

    fn dedup_lock(&self, host: &str) -> Arc<Mutex<()>> {
        let mut locks = self.resolve_locks.lock().expect("resolve lock map poisoned");
        Arc::clone(
            locks
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Disable remote UDP DNS for the cooldown window, arming the reset
    /// timer at most once
    async fn arm_tcp_cooldown(&self) {
        let mut mode = self.tcp_mode.write().await;
        mode.use_tcp = true;
        if !mode.reset_armed {
            mode.reset_armed = true;
            let tcp_mode = Arc::clone(&self.tcp_mode);
            tokio::spawn(async move {
                tokio::time::sleep(UDP_DISABLE_COOLDOWN).await;
                let mut mode = tcp_mode.write().await;
                mode.use_tcp = false;
                mode.reset_armed = false;
                debug!("remote DNS cooldown elapsed, back to UDP");
            });
        }
    }

    async fn query_remote_udp(&self, server: Ipv4Addr, host: &str) -> Result<IpAddr> {
        let conn = self
            .stack
            .dial_udp(SocketAddr::new(IpAddr::V4(server), 53))
            .await?;
        tokio::time::timeout(DNS_TIMEOUT, query_over_udp_conn(conn, host, RecordType::A))
            .await
            .map_err(|_| Error::Dns(format!("UDP DNS query for {host} timed out")))?
    }

    async fn query_remote_tcp(&self, server: Ipv4Addr, host: &str) -> Result<IpAddr> {
        let conn = self
            .stack
            .dial_tcp(SocketAddr::new(IpAddr::V4(server), 53))
            .await?;
        tokio::time::timeout(DNS_TIMEOUT, query_over_tcp_conn(conn, host, RecordType::A))
            .await
            .map_err(|_| Error::Dns(format!("TCP DNS query for {host} timed out")))?
    }
}

/// Build a recursive query message for one host
fn build_query(host: &str, record_type: RecordType) -> Result<Message> {
    let name = Name::from_utf8(host).map_err(|e| Error::Dns(format!("bad name {host}: {e}")))?;
    let mut message = Message::new();
    message
        .set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, record_type));
    Ok(message)
}

/// Pull the first address of the queried type out of a response
fn first_answer(response: &Message, record_type: RecordType) -> Result<IpAddr> {
    response
        .answers()
        .iter()
        .find_map(|record| match record.data() {
            Some(RData::A(a)) if record_type == RecordType::A => Some(IpAddr::V4(a.0)),
            Some(RData::AAAA(aaaa)) if record_type == RecordType::AAAA => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .ok_or_else(|| Error::Dns(format!("no {record_type} answer")))
}

/// One query/response exchange over a datagram-shaped connection
async fn query_over_udp_conn(mut conn: BoxConn, host: &str, record_type: RecordType) -> Result<IpAddr> {
    let query = build_query(host, record_type)?;
    let bytes = query.to_vec().map_err(|e| Error::Dns(e.to_string()))?;
    conn.write_all(&bytes).await?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    let n = conn.read(&mut buf).await?;
    let response = Message::from_vec(&buf[..n]).map_err(|e| Error::Dns(e.to_string()))?;
    first_answer(&response, record_type)
}

/// One query/response exchange over a stream connection, RFC 1035 framed
/// with the 2-byte length prefix
async fn query_over_tcp_conn(mut conn: BoxConn, host: &str, record_type: RecordType) -> Result<IpAddr> {
    let query = build_query(host, record_type)?;
    let bytes = query.to_vec().map_err(|e| Error::Dns(e.to_string()))?;
    conn.write_all(&(bytes.len() as u16).to_be_bytes()).await?;
    conn.write_all(&bytes).await?;

    let mut len_buf = [0u8; 2];
    conn.read_exact(&mut len_buf).await?;
    let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    conn.read_exact(&mut buf).await?;
    let response = Message::from_vec(&buf).map_err(|e| Error::Dns(e.to_string()))?;
    first_answer(&response, record_type)
}

/// Query a DNS server over a plain (non-tunnel) UDP socket
async fn query_plain_udp(server: SocketAddr, host: &str, record_type: RecordType) -> Result<IpAddr> {
    let socket = UdpSocket::bind(if server.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    })
    .await?;
    socket.connect(server).await?;

    let query = build_query(host, record_type)?;
    let bytes = query.to_vec().map_err(|e| Error::Dns(e.to_string()))?;
    socket.send(&bytes).await?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    let n = tokio::time::timeout(DNS_TIMEOUT, socket.recv(&mut buf))
        .await
        .map_err(|_| Error::Dns(format!("secondary DNS query for {host} timed out")))??;
    let response = Message::from_vec(&buf[..n]).map_err(|e| Error::Dns(e.to_string()))?;
    first_answer(&response, record_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DomainResource, Protocol};
    use crate::stack::LocalDnsServer;
    use async_trait::async_trait;
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::Record;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stack stub that answers every A query with a fixed address and
    /// counts dials per transport
    struct MockStack {
        answer: Ipv4Addr,
        udp_dials: AtomicUsize,
        tcp_dials: AtomicUsize,
        fail_udp: bool,
        delay: Duration,
    }

    impl MockStack {
        fn new(answer: Ipv4Addr) -> Self {
            Self {
                answer,
                udp_dials: AtomicUsize::new(0),
                tcp_dials: AtomicUsize::new(0),
                fail_udp: false,
                delay: Duration::ZERO,
            }
        }

        fn serve(&self, framed: bool) -> BoxConn {
            let (local, mut remote) = tokio::io::duplex(4096);
            let answer = self.answer;
            let delay = self.delay;
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let query = if framed {
                    let mut len_buf = [0u8; 2];
                    remote.read_exact(&mut len_buf).await.unwrap();
                    let len = usize::from(u16::from_be_bytes(len_buf));
                    remote.read_exact(&mut buf[..len]).await.unwrap();
                    Message::from_vec(&buf[..len]).unwrap()
                } else {
                    let n = remote.read(&mut buf).await.unwrap();
                    Message::from_vec(&buf[..n]).unwrap()
                };

                tokio::time::sleep(delay).await;

                let mut response = Message::new();
                response
                    .set_id(query.id())
                    .set_message_type(MessageType::Response)
                    .set_recursion_available(true);
                for q in query.queries() {
                    response.add_query(q.clone());
                    response.add_answer(Record::from_rdata(
                        q.name().clone(),
                        60,
                        RData::A(A(answer)),
                    ));
                }
                let bytes = response.to_vec().unwrap();
                if framed {
                    remote
                        .write_all(&(bytes.len() as u16).to_be_bytes())
                        .await
                        .unwrap();
                }
                remote.write_all(&bytes).await.unwrap();
            });
            Box::new(local)
        }
    }

    #[async_trait]
    impl Stack for MockStack {
        async fn run(&self) -> Result<()> {
            Ok(())
        }

        async fn dial_udp(&self, _addr: SocketAddr) -> Result<BoxConn> {
            self.udp_dials.fetch_add(1, Ordering::SeqCst);
            if self.fail_udp {
                return Err(Error::Tunnel("UDP path blocked".into()));
            }
            Ok(self.serve(false))
        }

        async fn dial_tcp(&self, _addr: SocketAddr) -> Result<BoxConn> {
            self.tcp_dials.fetch_add(1, Ordering::SeqCst);
            Ok(self.serve(true))
        }
    }

    fn resolver_with(stack: Arc<MockStack>, domain_table: DomainTable) -> Arc<Resolver> {
        Resolver::new(
            stack,
            ResolverConfig {
                remote_dns_server: Some(Ipv4Addr::new(10, 0, 0, 53)),
                secondary_dns_server: None,
                ttl: Duration::from_secs(60),
            },
            domain_table,
            HashMap::new(),
        )
    }

    fn corp_domain_table() -> DomainTable {
        let mut rules = HashMap::new();
        rules.insert(
            "corp.example.com".to_string(),
            DomainResource {
                port_min: 0,
                port_max: u16::MAX,
                protocol: Protocol::All,
                app_id: None,
                node_group_id: None,
            },
        );
        DomainTable::new(rules)
    }

    #[tokio::test]
    async fn test_remote_resolution_and_cache() {
        let stack = Arc::new(MockStack::new(Ipv4Addr::new(10, 1, 2, 3)));
        let resolver = resolver_with(Arc::clone(&stack), DomainTable::default());

        let res = resolver.resolve("internal.example.com").await.unwrap();
        assert_eq!(res.ip, IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(res.host, "internal.example.com");
        assert!(!res.use_tunnel);

        // Second resolve is served from the cache
        resolver.resolve("internal.example.com").await.unwrap();
        assert_eq!(stack.udp_dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_domain_rule_sets_tunnel_marker() {
        let stack = Arc::new(MockStack::new(Ipv4Addr::new(10, 1, 2, 3)));
        let resolver = resolver_with(stack, corp_domain_table());

        let res = resolver.resolve("git.corp.example.com").await.unwrap();
        assert!(res.use_tunnel);
        let res = resolver.resolve("public.example.org").await.unwrap();
        assert!(!res.use_tunnel);
    }

    #[tokio::test]
    async fn test_permanent_entry_wins_and_keeps_marker() {
        let stack = Arc::new(MockStack::new(Ipv4Addr::new(10, 1, 2, 3)));
        let resolver = resolver_with(Arc::clone(&stack), corp_domain_table());

        let pinned = IpAddr::V4(Ipv4Addr::new(10, 99, 99, 99));
        resolver.set_permanent_dns("git.corp.example.com", pinned).await;

        let res = resolver.resolve("git.corp.example.com").await.unwrap();
        assert_eq!(res.ip, pinned);
        assert!(res.use_tunnel);
        // No remote query happened
        assert_eq!(stack.udp_dials.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_static_override_forces_tunnel() {
        let stack = Arc::new(MockStack::new(Ipv4Addr::new(10, 1, 2, 3)));
        let mut static_dns = HashMap::new();
        let pinned = IpAddr::V4(Ipv4Addr::new(10, 5, 5, 5));
        static_dns.insert("pinned.example.com".to_string(), pinned);
        let resolver = Resolver::new(
            stack,
            ResolverConfig {
                remote_dns_server: Some(Ipv4Addr::new(10, 0, 0, 53)),
                secondary_dns_server: None,
                ttl: Duration::from_secs(60),
            },
            DomainTable::default(),
            static_dns,
        );

        let res = resolver.resolve("pinned.example.com").await.unwrap();
        assert_eq!(res.ip, pinned);
        assert!(res.use_tunnel);
    }

    #[tokio::test]
    async fn test_cache_ttl_expiry() {
        tokio::time::pause();
        let stack = Arc::new(MockStack::new(Ipv4Addr::new(10, 1, 2, 3)));
        let resolver = resolver_with(Arc::clone(&stack), DomainTable::default());

        resolver.resolve("ttl.example.com").await.unwrap();
        assert_eq!(stack.udp_dials.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;

        // Entry expired, a new remote query happens
        resolver.resolve("ttl.example.com").await.unwrap();
        assert_eq!(stack.udp_dials.load(Ordering::SeqCst), 2);

        // Permanent entries outlive any amount of time
        let pinned = IpAddr::V4(Ipv4Addr::new(10, 9, 9, 9));
        resolver.set_permanent_dns("forever.example.com", pinned).await;
        tokio::time::advance(Duration::from_secs(86400)).await;
        let res = resolver.resolve("forever.example.com").await.unwrap();
        assert_eq!(res.ip, pinned);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_dedup_to_one_query() {
        let stack = Arc::new(MockStack {
            delay: Duration::from_millis(50),
            ..MockStack::new(Ipv4Addr::new(10, 1, 2, 3))
        });
        let resolver = resolver_with(Arc::clone(&stack), DomainTable::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                resolver.resolve("burst.example.com").await.unwrap()
            }));
        }
        for handle in handles {
            let res = handle.await.unwrap();
            assert_eq!(res.ip, IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
        }
        assert_eq!(stack.udp_dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_udp_failure_falls_back_to_tcp_and_arms_cooldown() {
        let stack = Arc::new(MockStack {
            fail_udp: true,
            ..MockStack::new(Ipv4Addr::new(10, 1, 2, 3))
        });
        let resolver = resolver_with(Arc::clone(&stack), DomainTable::default());

        let res = resolver.resolve("first.example.com").await.unwrap();
        assert_eq!(res.ip, IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(stack.udp_dials.load(Ordering::SeqCst), 1);
        assert_eq!(stack.tcp_dials.load(Ordering::SeqCst), 1);

        // Cooldown armed: the next host goes straight to TCP
        resolver.resolve("second.example.com").await.unwrap();
        assert_eq!(stack.udp_dials.load(Ordering::SeqCst), 1);
        assert_eq!(stack.tcp_dials.load(Ordering::SeqCst), 2);
    }

    // Exercised by the packet engine's hijack tests too, but keep the trait
    // object shape honest here.
    #[test]
    fn test_local_dns_server_is_object_safe() {
        fn _takes(_: &dyn LocalDnsServer) {}
    }
}
