//! Socket option defaults and bind-address resolution (spec.md §6).

use socket2::{Domain, Protocol, Socket as Socket2, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

pub const SEND_RECV_BUF_BYTES: usize = 256 * 1024;
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub fn new_tcp_socket(domain: Domain) -> io::Result<Socket2> {
    let sock = Socket2::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    apply_defaults(&sock, true)?;
    Ok(sock)
}

pub fn new_udp_socket(domain: Domain) -> io::Result<Socket2> {
    let sock = Socket2::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    apply_defaults(&sock, false)?;
    Ok(sock)
}

fn apply_defaults(sock: &Socket2, is_tcp: bool) -> io::Result<()> {
    sock.set_reuse_address(true)?;
    if let Err(e) = sock.set_reuse_port(true) {
        // Open question in spec.md §9: tolerate kernels without SO_REUSEPORT.
        tracing::warn!(error = %e, "SO_REUSEPORT unsupported, continuing without it");
    }
    sock.set_nonblocking(true)?;
    if is_tcp {
        sock.set_tcp_nodelay(true)?;
    }
    sock.set_send_buffer_size(SEND_RECV_BUF_BYTES)?;
    sock.set_recv_buffer_size(SEND_RECV_BUF_BYTES)?;
    sock.set_linger(Some(Duration::ZERO))?;
    sock.set_cloexec(true)?;
    sock.set_write_timeout(Some(SEND_TIMEOUT))?;
    Ok(())
}

/// Applies the same option set to an already-accepted fd (spec.md
/// §4.8.3: "for each accepted fd, socket options are applied").
pub fn apply_accepted_defaults(sock: &Socket2) -> io::Result<()> {
    apply_defaults(sock, true)
}

/// Resolves `local_ip_or_iface` per spec.md §6: interface name first,
/// then a numeric address (which also covers the `"0.0.0.0"`/`"::"`
/// any-address sentinels), else failure. `None` means "unspecified"
/// directly.
pub fn resolve_bind_address(local_ip_or_iface: Option<&str>, is_ipv6: bool) -> io::Result<IpAddr> {
    let Some(s) = local_ip_or_iface else {
        return Ok(any_address(is_ipv6));
    };
    if let Some(addr) = find_interface_address(s, is_ipv6) {
        return Ok(addr);
    }
    if let Ok(addr) = s.parse::<IpAddr>() {
        return Ok(addr);
    }
    Err(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("no interface or address matching '{s}'"),
    ))
}

fn any_address(is_ipv6: bool) -> IpAddr {
    if is_ipv6 {
        Ipv6Addr::UNSPECIFIED.into()
    } else {
        Ipv4Addr::UNSPECIFIED.into()
    }
}

fn find_interface_address(name: &str, is_ipv6: bool) -> Option<IpAddr> {
    let addrs = nix::ifaddrs::getifaddrs().ok()?;
    for ifaddr in addrs {
        if ifaddr.interface_name != name {
            continue;
        }
        let address = ifaddr.address?;
        if !is_ipv6 {
            if let Some(sin) = address.as_sockaddr_in() {
                return Some(IpAddr::V4(sin.ip()));
            }
        } else if let Some(sin6) = address.as_sockaddr_in6() {
            return Some(IpAddr::V6(sin6.ip()));
        }
    }
    None
}
