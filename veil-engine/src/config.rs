//! Configuration types for the tunnel engine
//!
//! The configuration file uses TOML format: an `[engine]` section for the
//! resolver/dialer knobs, rule lists for split-tunnel routing, pinned DNS
//! overrides, and any number of UDP port-forward instances.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::resolve::ResolverConfig;
use crate::resource::{DomainResource, DomainTable, IpResource};

/// Main configuration structure
///
/// # Example Configuration
///
/// ```toml
/// [engine]
/// tunnel_ip = "10.0.254.2"
/// remote_dns_server = "10.0.0.53"
/// secondary_dns_server = "1.1.1.1"
/// dns_ttl = 3600
/// proxy_all = false
///
/// [[ip_resource]]
/// ip_min = "10.0.0.0"
/// ip_max = "10.255.255.255"
/// protocol = "all"
///
/// [[domain_resource]]
/// domain = ".corp.example.com"
///
/// [dns_overrides]
/// "git.corp.example.com" = "10.3.0.9"
///
/// [[udp_forward]]
/// bind = "127.0.0.1:5353"
/// remote = "10.0.0.53:53"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// IP-range reachability rules
    #[serde(default, rename = "ip_resource")]
    pub ip_resources: Vec<IpResource>,

    /// Domain-suffix reachability rules
    #[serde(default, rename = "domain_resource")]
    pub domain_resources: Vec<DomainRule>,

    /// Pinned host → IP entries, consulted before any DNS query and
    /// never expiring
    #[serde(default)]
    pub dns_overrides: HashMap<String, IpAddr>,

    /// UDP port-forward instances
    #[serde(default, rename = "udp_forward")]
    pub udp_forwards: Vec<UdpForwardSpec>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        for resource in &self.ip_resources {
            resource.validate()?;
        }

        for rule in &self.domain_resources {
            if rule.domain.is_empty() {
                return Err(Error::Config("domain_resource.domain is required".into()));
            }
        }

        for forward in &self.udp_forwards {
            if forward.bind.is_empty() {
                return Err(Error::Config("udp_forward.bind is required".into()));
            }
        }

        Ok(())
    }

    /// Resolver settings derived from the engine section
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            remote_dns_server: if self.engine.use_remote_dns {
                self.engine.remote_dns_server
            } else {
                None
            },
            secondary_dns_server: self.engine.secondary_dns_server,
            ttl: Duration::from_secs(self.engine.dns_ttl),
        }
    }

    /// Domain rules keyed by suffix
    pub fn domain_table(&self) -> DomainTable {
        DomainTable::new(
            self.domain_resources
                .iter()
                .map(|r| (r.domain.clone(), r.rule.clone()))
                .collect(),
        )
    }

    /// Generate a sample configuration
    pub fn sample() -> String {
        r#"# Veil split-tunnel client configuration

[engine]
# Address assigned to the TUN interface by the VPN server
tunnel_ip = "10.0.254.2"

# DNS server inside the remote network, queried through the tunnel
remote_dns_server = "10.0.0.53"

# Fallback DNS server for hosts the tunnel DNS cannot answer (optional;
# the system resolver is used when unset)
# secondary_dns_server = "1.1.1.1"

# Use the tunnel DNS server at all (default: true). When false, every
# lookup goes to the secondary/system resolver.
use_remote_dns = true

# DNS cache TTL in seconds (default: 3600)
dns_ttl = 3600

# Route every connection through the tunnel regardless of rules
proxy_all = false

# Upstream proxy for DIRECT connections: "http://host:port" or
# "socks://host:port" (optional)
# direct_proxy = "http://127.0.0.1:7890"

# Idle timeout in seconds for UDP forward NAT entries (default: 300)
nat_timeout = 300

# Remote-network reachability rules. A connection matching any rule's
# IP range x port range x protocol goes through the tunnel.
[[ip_resource]]
ip_min = "10.0.0.0"
ip_max = "10.255.255.255"
protocol = "all"

# port_min/port_max default to the full range; protocol to "all"
# [[ip_resource]]
# ip_min = "172.16.0.0"
# ip_max = "172.16.255.255"
# port_min = 443
# port_max = 443
# protocol = "tcp"

# Domain-suffix rules: hosts ending in the suffix are routed through
# the tunnel whatever address they resolve to.
[[domain_resource]]
domain = ".corp.example.com"

# Pinned DNS entries, used before any query and never expiring
[dns_overrides]
# "git.corp.example.com" = "10.3.0.9"

# UDP port forwards through the tunnel (repeatable)
# [[udp_forward]]
# bind = "127.0.0.1:5353"
# remote = "10.0.0.53:53"
"#
        .to_string()
    }
}

/// Settings for the resolver, dialer, and packet engine
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Address assigned to the TUN interface
    pub tunnel_ip: Option<Ipv4Addr>,

    /// DNS server inside the remote network, reached through the tunnel
    pub remote_dns_server: Option<Ipv4Addr>,

    /// Fallback DNS server for hosts the tunnel DNS cannot answer
    pub secondary_dns_server: Option<IpAddr>,

    /// Query the tunnel DNS server at all
    #[serde(default = "default_true")]
    pub use_remote_dns: bool,

    /// DNS cache TTL in seconds
    #[serde(default = "default_dns_ttl")]
    pub dns_ttl: u64,

    /// Route everything through the tunnel regardless of rules
    #[serde(default)]
    pub proxy_all: bool,

    /// Upstream proxy URL for direct connections
    #[serde(default)]
    pub direct_proxy: Option<String>,

    /// Idle timeout in seconds for UDP forward NAT entries
    #[serde(default = "default_nat_timeout")]
    pub nat_timeout: u64,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dns_ttl == 0 {
            return Err(Error::Config("dns_ttl must be positive".into()));
        }
        if self.nat_timeout == 0 {
            return Err(Error::Config("nat_timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn nat_timeout(&self) -> Duration {
        Duration::from_secs(self.nat_timeout)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tunnel_ip: None,
            remote_dns_server: None,
            secondary_dns_server: None,
            use_remote_dns: true,
            dns_ttl: default_dns_ttl(),
            proxy_all: false,
            direct_proxy: None,
            nat_timeout: default_nat_timeout(),
        }
    }
}

/// One domain-suffix rule as it appears in the file
#[derive(Debug, Clone, Deserialize)]
pub struct DomainRule {
    /// Suffix the query host is matched against
    pub domain: String,

    #[serde(flatten)]
    pub rule: DomainResource,
}

/// One UDP port-forward instance
#[derive(Debug, Clone, Deserialize)]
pub struct UdpForwardSpec {
    /// Local `host:port` to bind
    pub bind: String,

    /// Tunnel-side endpoint datagrams are relayed to
    pub remote: SocketAddr,
}

fn default_true() -> bool {
    true
}

fn default_dns_ttl() -> u64 {
    3600
}

fn default_nat_timeout() -> u64 {
    300
}
