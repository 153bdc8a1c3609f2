//! Tunnel reachability rules
//!
//! The remote side publishes which destinations are reachable through the
//! tunnel as two rule kinds: IP-range rules ([`IpResource`]) and domain
//! suffix rules ([`DomainResource`]). Both are parsed once at session setup
//! and shared read-only; routing decisions never mutate them.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Transport protocol selector for a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    #[default]
    All,
}

impl Protocol {
    /// Whether this rule protocol admits the given IP protocol number
    pub fn admits(&self, ip_protocol: u8) -> bool {
        match self {
            Protocol::Tcp => ip_protocol == veil_tcpip::PROTOCOL_TCP,
            Protocol::Udp => ip_protocol == veil_tcpip::PROTOCOL_UDP,
            Protocol::Icmp => ip_protocol == veil_tcpip::PROTOCOL_ICMP,
            Protocol::All => true,
        }
    }
}

fn default_port_max() -> u16 {
    u16::MAX
}

/// One tunnel-reachable IP range: inclusive IP range × inclusive port range
/// × protocol
#[derive(Debug, Clone, Deserialize)]
pub struct IpResource {
    pub ip_min: Ipv4Addr,
    pub ip_max: Ipv4Addr,
    #[serde(default)]
    pub port_min: u16,
    #[serde(default = "default_port_max")]
    pub port_max: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Opaque policy tags carried through from the server's resource payload
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub node_group_id: Option<String>,
}

impl IpResource {
    /// Validate the range invariants
    pub fn validate(&self) -> Result<()> {
        if u32::from(self.ip_min) > u32::from(self.ip_max) {
            return Err(Error::Config(format!(
                "IP resource range is inverted: {} > {}",
                self.ip_min, self.ip_max
            )));
        }
        if self.port_min > self.port_max {
            return Err(Error::Config(format!(
                "port range is inverted: {} > {}",
                self.port_min, self.port_max
            )));
        }
        Ok(())
    }

    /// Full per-packet match: range, port and protocol
    ///
    /// ICMP rules ignore the port (ICMP has none); `port` is only consulted
    /// for TCP/UDP.
    pub fn matches(&self, ip: Ipv4Addr, port: Option<u16>, ip_protocol: u8) -> bool {
        if !self.protocol.admits(ip_protocol) {
            return false;
        }
        let ip = u32::from(ip);
        if ip < u32::from(self.ip_min) || ip > u32::from(self.ip_max) {
            return false;
        }
        match port {
            Some(port) => self.port_min <= port && port <= self.port_max,
            None => true,
        }
    }
}

/// A domain suffix rule
#[derive(Debug, Clone, Deserialize)]
pub struct DomainResource {
    #[serde(default)]
    pub port_min: u16,
    #[serde(default = "default_port_max")]
    pub port_max: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub node_group_id: Option<String>,
}

/// Domain suffix → rule table
#[derive(Debug, Default, Clone)]
pub struct DomainTable {
    rules: HashMap<String, DomainResource>,
}

impl DomainTable {
    pub fn new(rules: HashMap<String, DomainResource>) -> Self {
        Self { rules }
    }

    /// Suffix-match a host against the table, first match wins
    pub fn match_suffix(&self, host: &str) -> Option<(&str, &DomainResource)> {
        self.rules
            .iter()
            .find(|(domain, _)| host.ends_with(domain.as_str()))
            .map(|(domain, resource)| (domain.as_str(), resource))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Sorted, merged set of inclusive IPv4 ranges for O(log n) membership
///
/// This is the dialer's IP-only view of the IP resources; the packet engine
/// keeps the full rule list because it also needs ports and protocols.
#[derive(Debug, Default, Clone)]
pub struct Ipv4RangeSet {
    // (start, end) inclusive, sorted by start, non-overlapping
    ranges: Vec<(u32, u32)>,
}

impl Ipv4RangeSet {
    /// Build a merged range set from resource rules
    pub fn new(resources: &[IpResource]) -> Self {
        let mut ranges: Vec<(u32, u32)> = resources
            .iter()
            .map(|r| (u32::from(r.ip_min), u32::from(r.ip_max)))
            .collect();
        ranges.sort_unstable();

        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                // Adjacent or overlapping ranges collapse into one
                Some((_, prev_end)) if start <= prev_end.saturating_add(1) => {
                    *prev_end = (*prev_end).max(end);
                }
                _ => merged.push((start, end)),
            }
        }
        Self { ranges: merged }
    }

    /// Membership test by binary search
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let ip = u32::from(ip);
        let idx = self.ranges.partition_point(|&(start, _)| start <= ip);
        idx > 0 && ip <= self.ranges[idx - 1].1
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}
