//! Picks the IPv4 address we advertise in our own offers.

use std::net::{IpAddr, Ipv4Addr};

use get_if_addrs::{get_if_addrs, IfAddr};
use tracing::{debug, warn};

const VIRTUAL_PREFIXES: [&str; 11] = [
    "docker", "veth", "br-", "virbr", "vmnet", "vboxnet", "utun", "tun", "tap", "zt", "wg",
];

pub trait AddressResolver: Send + Sync {
    fn resolve(&self) -> Option<Ipv4Addr>;
}

/// Always answers with the same address (or none).
#[derive(Debug, Clone, Copy)]
pub struct FixedResolver(pub Option<Ipv4Addr>);

impl AddressResolver for FixedResolver {
    fn resolve(&self) -> Option<Ipv4Addr> {
        self.0
    }
}

/// Enumerates local interfaces, public addresses first.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceResolver;

impl AddressResolver for InterfaceResolver {
    fn resolve(&self) -> Option<Ipv4Addr> {
        let candidates = match get_if_addrs() {
            Ok(interfaces) => interfaces
                .into_iter()
                .filter_map(|iface| match iface.addr {
                    IfAddr::V4(v4) => Some((iface.name, v4.ip)),
                    IfAddr::V6(_) => None,
                })
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!("[DCC - ADDRESS] Can't list interfaces: {}", e);
                Vec::new()
            }
        };

        pick_advertisable(&candidates).or_else(local_route_fallback)
    }
}

/// First public address, else first private one. Loopback, link-local and
/// virtual interfaces are never picked.
pub fn pick_advertisable(candidates: &[(String, Ipv4Addr)]) -> Option<Ipv4Addr> {
    let usable = candidates
        .iter()
        .filter(|(name, ip)| !is_virtual(name) && is_usable(ip))
        .map(|(_, ip)| *ip)
        .collect::<Vec<Ipv4Addr>>();

    let public = usable.iter().find(|ip| !ip.is_private()).copied();
    if public.is_some() {
        return public;
    }
    usable.first().copied()
}

fn is_virtual(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn is_usable(ip: &Ipv4Addr) -> bool {
    !(ip.is_loopback() || ip.is_link_local() || ip.is_unspecified() || ip.is_broadcast())
}

fn local_route_fallback() -> Option<Ipv4Addr> {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(ip)) if is_usable(&ip) => Some(ip),
        Ok(other) => {
            debug!("[DCC - ADDRESS] Fallback address {} is not usable", other);
            None
        }
        Err(e) => {
            debug!("[DCC - ADDRESS] No fallback address: {}", e);
            None
        }
    }
}
