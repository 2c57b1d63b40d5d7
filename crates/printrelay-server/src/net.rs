// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Address shown to operators as "point your clients here".

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Public resolver used only to pick a route; no packet is sent.
const ROUTE_PROBE: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// The IPv4 address of the interface carrying the default route.
///
/// Falls back to loopback when there is no route or the answer is a
/// loopback, link-local or VirtualBox host-only address.
pub fn local_ipv4() -> IpAddr {
    route_address()
        .filter(is_useful)
        .map(IpAddr::V4)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn route_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(ROUTE_PROBE).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}

fn is_useful(ip: &Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    !(ip.is_loopback() || ip.is_link_local() || ip.is_unspecified() || (a, b, c) == (192, 168, 56))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_unhelpful_addresses() {
        assert!(is_useful(&Ipv4Addr::new(10, 0, 0, 12)));
        assert!(is_useful(&Ipv4Addr::new(192, 168, 1, 20)));
        assert!(!is_useful(&Ipv4Addr::LOCALHOST));
        assert!(!is_useful(&Ipv4Addr::new(169, 254, 3, 4)));
        assert!(!is_useful(&Ipv4Addr::new(192, 168, 56, 1)));
    }

    #[test]
    fn always_returns_an_ipv4_address() {
        assert!(local_ipv4().is_ipv4());
    }
}
