//! Client key extraction and hashing.

mod extract;

pub use extract::{KeyExtractor, PeerAddr, XForwardedFor};

use std::net::Ipv4Addr;

/// Hashed client key, as stored in the bucket map.
pub type KeyHash = u64;

/// Pack an IPv4 address into its map key.
///
/// The four octets become the low 32 bits, so distinct addresses can
/// never collide. The widened key type leaves room for other fixed-width
/// key shapes without changing the store.
pub fn hash_key(ip: Ipv4Addr) -> KeyHash {
    u64::from(u32::from(ip))
}
