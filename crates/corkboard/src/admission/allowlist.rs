//! CIDR-based source address admission.

use std::net::IpAddr;
use std::str::FromStr;

use axum::{body::Body, http::Request};
use tracing::warn;

use super::{AdmissionError, ClientAddrResolver, client_addr::normalize};
use crate::pipeline::{Admitted, Rejection, Stage};

/// A network range in CIDR notation. A bare address is a single-host range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix_len: u8,
}

impl IpRange {
    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `addr` falls inside the range. Addresses of the other family
    /// never match.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix_len);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix_len);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn mask_u32(prefix_len: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0)
}

fn mask_u128(prefix_len: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0)
}

impl FromStr for IpRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let parsed = addr
            .parse::<IpAddr>()
            .map_err(|e| format!("invalid address '{}': {}", addr, e))?;
        let max_len = if parsed.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            Some(prefix) => prefix
                .parse::<u8>()
                .ok()
                .filter(|len| *len <= max_len)
                .ok_or_else(|| format!("invalid prefix length '{}'", prefix))?,
            None => max_len,
        };

        // An IPv4-mapped network becomes the IPv4 network it covers; a prefix
        // shorter than the mapped block keeps the IPv6 form.
        let network = normalize(parsed);
        if network.is_ipv4() && parsed.is_ipv6() && prefix_len >= 96 {
            return Ok(Self {
                network,
                prefix_len: prefix_len - 96,
            });
        }

        Ok(Self {
            network: parsed,
            prefix_len,
        })
    }
}

impl std::fmt::Display for IpRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Set of allowed ranges parsed from a comma-separated list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    ranges: Vec<IpRange>,
}

impl Allowlist {
    /// Parse a comma-separated list. Unparseable entries are logged and
    /// dropped; an allowlist left with no ranges admits nobody.
    pub fn parse(list: &str) -> Self {
        let ranges = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match entry.parse::<IpRange>() {
                Ok(range) => Some(range),
                Err(e) => {
                    warn!(entry, error = %e, "ignoring unparseable allowlist entry");
                    None
                }
            })
            .collect::<Vec<_>>();

        if ranges.is_empty() {
            warn!("allowlist has no valid ranges; all addresses will be rejected");
        }

        Self { ranges }
    }

    pub fn ranges(&self) -> &[IpRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = normalize(addr);
        self.ranges.iter().any(|range| range.contains(addr))
    }
}

/// Admits only requests whose source address is on the allowlist.
///
/// Without a configured allowlist the gate admits everything.
#[derive(Debug, Clone)]
pub struct AllowlistGate {
    allowlist: Option<Allowlist>,
    resolver: ClientAddrResolver,
}

impl AllowlistGate {
    pub fn new(allowlist: Option<Allowlist>, resolver: ClientAddrResolver) -> Self {
        Self {
            allowlist,
            resolver,
        }
    }

    /// Build from the raw config value. `None` or a blank string disables
    /// the gate.
    pub fn from_config(list: Option<&str>, resolver: ClientAddrResolver) -> Self {
        let allowlist = list
            .filter(|list| !list.trim().is_empty())
            .map(Allowlist::parse);
        Self::new(allowlist, resolver)
    }

    pub fn is_enabled(&self) -> bool {
        self.allowlist.is_some()
    }

    pub fn allowlist(&self) -> Option<&Allowlist> {
        self.allowlist.as_ref()
    }

    pub fn check(&self, addr: Option<IpAddr>) -> Result<(), AdmissionError> {
        let Some(allowlist) = &self.allowlist else {
            return Ok(());
        };

        match addr {
            Some(addr) if allowlist.contains(addr) => Ok(()),
            _ => Err(AdmissionError::AddressDenied),
        }
    }
}

impl Stage for AllowlistGate {
    fn name(&self) -> &'static str {
        "allowlist"
    }

    fn inspect(&self, req: &mut Request<Body>) -> Result<Admitted, Rejection> {
        if self.is_enabled() {
            let addr = self.resolver.resolve(req);
            if let Err(err) = self.check(addr) {
                warn!(
                    client = ?addr,
                    path = req.uri().path(),
                    "source address not on allowlist"
                );
                return Err(err.into());
            }
        }
        Ok(Admitted::pass())
    }
}
