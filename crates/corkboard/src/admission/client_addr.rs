//! Client address resolution.

use std::net::{IpAddr, SocketAddr};

use axum::{body::Body, extract::ConnectInfo, http::Request};

/// Header carrying the proxy chain, client first.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolves the address a request originates from.
///
/// Without proxy trust the connection's peer address is used. With proxy
/// trust the first hop of `X-Forwarded-For` wins, falling back to the peer
/// address when the header is absent or unparseable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAddrResolver {
    trust_proxy: bool,
}

impl ClientAddrResolver {
    pub fn new(trust_proxy: bool) -> Self {
        Self { trust_proxy }
    }

    /// Resolved and normalized client address, if any.
    pub fn resolve(&self, req: &Request<Body>) -> Option<IpAddr> {
        let forwarded = self
            .trust_proxy
            .then(|| first_forwarded_hop(req))
            .flatten();

        forwarded
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .map(normalize)
    }
}

fn first_forwarded_hop(req: &Request<Body>) -> Option<IpAddr> {
    let chain = req.headers().get(FORWARDED_FOR)?.to_str().ok()?;
    parse_addr(chain.split(',').next()?.trim())
}

/// Parse a bare address or an `addr:port` / `[v6]:port` pair.
fn parse_addr(text: &str) -> Option<IpAddr> {
    text.parse::<IpAddr>()
        .ok()
        .or_else(|| text.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

/// Collapse IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) to plain IPv4.
pub fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
