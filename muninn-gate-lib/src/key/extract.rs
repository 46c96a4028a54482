use http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Derives the client key a request is limited by.
///
/// Returning `None` skips admission control for the request entirely:
/// an unextractable key opens the gate rather than closing it.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, peer: SocketAddr, headers: &HeaderMap) -> Option<Ipv4Addr>;
}

impl<F> KeyExtractor for F
where
    F: Fn(SocketAddr, &HeaderMap) -> Option<Ipv4Addr> + Send + Sync,
{
    fn extract(&self, peer: SocketAddr, headers: &HeaderMap) -> Option<Ipv4Addr> {
        self(peer, headers)
    }
}

/// Keys requests by the connection peer address.
///
/// IPv4-mapped IPv6 peers (dual-stack listeners) are unmapped; other
/// IPv6 peers have no IPv4 key and bypass limiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddr;

impl KeyExtractor for PeerAddr {
    fn extract(&self, peer: SocketAddr, _headers: &HeaderMap) -> Option<Ipv4Addr> {
        match peer.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(ip) => ip.to_ipv4_mapped(),
        }
    }
}

/// Keys requests by the first entry of the `X-Forwarded-For` header.
///
/// For deployments behind another proxy layer. There is deliberately no
/// fallback to the peer address: a missing or malformed header bypasses
/// limiting instead of silently switching strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct XForwardedFor;

impl KeyExtractor for XForwardedFor {
    fn extract(&self, _peer: SocketAddr, headers: &HeaderMap) -> Option<Ipv4Addr> {
        let xff = headers.get("x-forwarded-for")?;
        let first = xff.to_str().ok()?.split(',').next()?;
        first.trim().parse::<Ipv4Addr>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn peer_v4(ip: [u8; 4], port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::from(ip), port))
    }

    fn headers_with_xff(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(hv) = HeaderValue::from_str(value) {
            headers.insert("x-forwarded-for", hv);
        }
        headers
    }

    #[test]
    fn peer_addr_uses_connection_ip() {
        let headers = HeaderMap::new();
        assert_eq!(
            PeerAddr.extract(peer_v4([192, 168, 1, 7], 4444), &headers),
            Some(Ipv4Addr::new(192, 168, 1, 7))
        );
    }

    #[test]
    fn peer_addr_unmaps_v4_mapped_v6() {
        let headers = HeaderMap::new();
        let mapped: SocketAddr = "[::ffff:10.1.2.3]:80".parse().expect("mapped addr");
        assert_eq!(PeerAddr.extract(mapped, &headers), Some(Ipv4Addr::new(10, 1, 2, 3)));

        let plain_v6: SocketAddr = "[2001:db8::1]:80".parse().expect("v6 addr");
        assert_eq!(PeerAddr.extract(plain_v6, &headers), None);
    }

    #[test]
    fn forwarded_takes_first_entry() {
        let peer = peer_v4([127, 0, 0, 1], 1234);
        let headers = headers_with_xff("203.0.113.9, 10.0.0.1, 10.0.0.2");
        assert_eq!(
            XForwardedFor.extract(peer, &headers),
            Some(Ipv4Addr::new(203, 0, 113, 9))
        );
    }

    #[test]
    fn forwarded_trims_whitespace() {
        let peer = peer_v4([127, 0, 0, 1], 1234);
        let headers = headers_with_xff("  203.0.113.9  , 10.0.0.1");
        assert_eq!(
            XForwardedFor.extract(peer, &headers),
            Some(Ipv4Addr::new(203, 0, 113, 9))
        );
    }

    #[test]
    fn forwarded_has_no_peer_fallback() {
        let peer = peer_v4([192, 168, 1, 7], 1234);
        assert_eq!(XForwardedFor.extract(peer, &HeaderMap::new()), None);
        assert_eq!(XForwardedFor.extract(peer, &headers_with_xff("not-an-ip")), None);
        assert_eq!(XForwardedFor.extract(peer, &headers_with_xff("2001:db8::1")), None);
    }

    #[test]
    fn closures_are_extractors() {
        let by_port = |peer: SocketAddr, _headers: &HeaderMap| -> Option<Ipv4Addr> {
            (peer.port() == 80).then_some(Ipv4Addr::LOCALHOST)
        };
        assert_eq!(by_port.extract(peer_v4([9, 9, 9, 9], 80), &HeaderMap::new()), Some(Ipv4Addr::LOCALHOST));
        assert_eq!(by_port.extract(peer_v4([9, 9, 9, 9], 81), &HeaderMap::new()), None);
    }
}
