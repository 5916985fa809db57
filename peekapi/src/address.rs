//! Classifies textual host literals as private/reserved, without ever
//! resolving DNS. See [`is_private_host`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returns true iff `host` parses as an IPv4 or IPv6 literal that falls
/// inside a private, loopback, link-local, or carrier-grade-NAT range.
///
/// Non-IP input (DNS names, malformed literals) returns false. This is a
/// literal check only, never a DNS lookup.
pub fn is_private_host(host: &str) -> bool {
    // IPv6 literals in a URL authority are bracketed; strip brackets if present.
    let trimmed = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);

    match trimmed.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => is_private_v4(v4),
        Ok(IpAddr::V6(v6)) => is_private_v6(v6),
        Err(_) => false,
    }
}

fn is_private_v4(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    in_cidr(octets, [10, 0, 0, 0], 8)
        || in_cidr(octets, [172, 16, 0, 0], 12)
        || in_cidr(octets, [192, 168, 0, 0], 16)
        || in_cidr(octets, [100, 64, 0, 0], 10)
        || in_cidr(octets, [127, 0, 0, 0], 8)
        || in_cidr(octets, [169, 254, 0, 0], 16)
        || in_cidr(octets, [0, 0, 0, 0], 8)
}

fn in_cidr(octets: [u8; 4], network: [u8; 4], prefix_len: u32) -> bool {
    let addr = u32::from_be_bytes(octets);
    let net = u32::from_be_bytes(network);
    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    };
    (addr & mask) == (net & mask)
}

fn is_private_v6(addr: Ipv6Addr) -> bool {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_private_v4(v4);
    }

    if addr == Ipv6Addr::LOCALHOST {
        return true;
    }

    let segments = addr.segments();
    // fe80::/10: top 10 bits are 1111111010
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    // fc00::/7: top 7 bits are 1111110
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }

    false
}
