use crate::error::{NetError, NetResult};
use std::ffi::CString;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A socket address: IPv4, IPv6, or unix-domain path.
///
/// Textual forms accepted by [`parse`](Address::parse):
///
/// - IPv4 dotted-quad `A.B.C.D`, optionally `A.B.C.D:PORT`
/// - IPv6 colon-hex per RFC 4291 including `::` compression and an
///   IPv4-mapped tail, optionally `%zone` (interface name or numeric);
///   bracketed `[addr]:PORT` when a port is present
/// - unix-domain filesystem path (anything containing `/`), bounded by
///   the platform `sun_path` size
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    Unix(PathBuf),
}

impl Address {
    /// Parses any accepted textual form.
    pub fn parse(s: &str) -> NetResult<Address> {
        if s.is_empty() {
            return Err(NetError::Inval);
        }
        if s.contains('/') {
            return Self::unix(s);
        }
        Self::parse_ip(s)
    }

    /// Parses an IPv4 or IPv6 textual form, with optional port.
    pub fn parse_ip(s: &str) -> NetResult<Address> {
        if let Some(rest) = s.strip_prefix('[') {
            // Bracketed IPv6, optionally followed by :port
            let end = rest.find(']').ok_or(NetError::Inval)?;
            let inner = &rest[..end];
            let tail = &rest[end + 1..];
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(p)?,
                None if tail.is_empty() => 0,
                None => return Err(NetError::Inval),
            };
            return Self::v6_with_zone(inner, port);
        }

        match s.matches(':').count() {
            0 => {
                let ip = Ipv4Addr::from_str(s).map_err(|_| NetError::Inval)?;
                Ok(Address::V4(SocketAddrV4::new(ip, 0)))
            }
            1 => match s.split_once(':') {
                Some((host, port)) => {
                    let ip = Ipv4Addr::from_str(host).map_err(|_| NetError::Inval)?;
                    Ok(Address::V4(SocketAddrV4::new(ip, parse_port(port)?)))
                }
                None => Err(NetError::Inval),
            },
            _ => Self::v6_with_zone(s, 0),
        }
    }

    fn v6_with_zone(s: &str, port: u16) -> NetResult<Address> {
        let (addr_part, zone) = match s.split_once('%') {
            Some((a, z)) => (a, Some(z)),
            None => (s, None),
        };
        let ip = Ipv6Addr::from_str(addr_part).map_err(|_| NetError::Inval)?;
        let scope = match zone {
            None => 0,
            Some(z) if z.is_empty() => return Err(NetError::Inval),
            Some(z) => match z.parse::<u32>() {
                Ok(n) => n,
                Err(_) => interface_index(z)?,
            },
        };
        Ok(Address::V6(SocketAddrV6::new(ip, port, 0, scope)))
    }

    /// Builds a unix-domain address, validating the path length against
    /// the platform `sun_path` bound.
    pub fn unix<P: AsRef<Path>>(path: P) -> NetResult<Address> {
        let path = path.as_ref();
        // Let the OS-facing conversion validate the length bound.
        socket2::SockAddr::unix(path).map_err(|_| NetError::Length)?;
        Ok(Address::Unix(path.to_path_buf()))
    }

    /// Resolves `host:port` (or bare host with `default_port`) through
    /// the system resolver. Used only when name resolution is enabled on
    /// the socket; numeric forms should go through [`parse`](Self::parse).
    pub fn resolve(host: &str, default_port: u16) -> NetResult<Address> {
        let candidates: Vec<_> = if host.contains(':') {
            host.to_socket_addrs()
                .map_err(|_| NetError::NotFound)?
                .collect()
        } else {
            (host, default_port)
                .to_socket_addrs()
                .map_err(|_| NetError::NotFound)?
                .collect()
        };
        match candidates.into_iter().next() {
            Some(std::net::SocketAddr::V4(a)) => Ok(Address::V4(a)),
            Some(std::net::SocketAddr::V6(a)) => Ok(Address::V6(a)),
            None => Err(NetError::NotFound),
        }
    }

    /// The protocol family for opening a matching socket.
    pub fn domain(&self) -> socket2::Domain {
        match self {
            Address::V4(_) => socket2::Domain::IPV4,
            Address::V6(_) => socket2::Domain::IPV6,
            Address::Unix(_) => socket2::Domain::UNIX,
        }
    }

    /// The port, or 0 for unix-domain addresses.
    pub fn port(&self) -> u16 {
        match self {
            Address::V4(a) => a.port(),
            Address::V6(a) => a.port(),
            Address::Unix(_) => 0,
        }
    }

    /// Returns the same address with a different port (no-op for unix).
    pub fn with_port(&self, port: u16) -> Address {
        match self {
            Address::V4(a) => Address::V4(SocketAddrV4::new(*a.ip(), port)),
            Address::V6(a) => {
                Address::V6(SocketAddrV6::new(*a.ip(), port, a.flowinfo(), a.scope_id()))
            }
            Address::Unix(p) => Address::Unix(p.clone()),
        }
    }

    /// OS-level form for bind/connect/sendto.
    pub fn to_sock_addr(&self) -> NetResult<socket2::SockAddr> {
        match self {
            Address::V4(a) => Ok(socket2::SockAddr::from(*a)),
            Address::V6(a) => Ok(socket2::SockAddr::from(*a)),
            Address::Unix(p) => socket2::SockAddr::unix(p).map_err(|_| NetError::Length),
        }
    }

    /// Converts an OS-level address back, e.g. an accepted peer.
    pub fn from_sock_addr(addr: &socket2::SockAddr) -> Option<Address> {
        if let Some(std_addr) = addr.as_socket() {
            return Some(match std_addr {
                std::net::SocketAddr::V4(a) => Address::V4(a),
                std::net::SocketAddr::V6(a) => Address::V6(a),
            });
        }
        addr.as_pathname().map(|p| Address::Unix(p.to_path_buf()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(a) => {
                if a.port() == 0 {
                    write!(f, "{}", a.ip())
                } else {
                    write!(f, "{}:{}", a.ip(), a.port())
                }
            }
            Address::V6(a) => {
                let zone = if a.scope_id() == 0 {
                    String::new()
                } else {
                    format!("%{}", a.scope_id())
                };
                if a.port() == 0 {
                    write!(f, "{}{}", a.ip(), zone)
                } else {
                    write!(f, "[{}{}]:{}", a.ip(), zone, a.port())
                }
            }
            Address::Unix(p) => write!(f, "{}", p.display()),
        }
    }
}

impl FromStr for Address {
    type Err = NetError;

    fn from_str(s: &str) -> NetResult<Address> {
        Address::parse(s)
    }
}

/// Numeric interface lookup for `%zone` names.
fn interface_index(name: &str) -> NetResult<u32> {
    let cname = CString::new(name).map_err(|_| NetError::Inval)?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if index == 0 {
        Err(NetError::NotFound)
    } else {
        Ok(index)
    }
}

fn parse_port(s: &str) -> NetResult<u16> {
    s.parse::<u16>().map_err(|_| NetError::Inval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_forms() {
        let bare = Address::parse("192.168.1.10").unwrap();
        assert_eq!(bare.port(), 0);
        assert_eq!(bare.to_string(), "192.168.1.10");

        let with_port = Address::parse("192.168.1.10:8080").unwrap();
        assert_eq!(with_port.port(), 8080);
        assert_eq!(with_port.to_string(), "192.168.1.10:8080");
    }

    #[test]
    fn test_v4_rejects_bad_octets_and_port() {
        assert!(Address::parse("256.0.0.1").is_err());
        assert!(Address::parse("1.2.3").is_err());
        assert!(Address::parse("1.2.3.4:65536").is_err());
        assert!(Address::parse("1.2.3.4:x").is_err());
    }

    #[test]
    fn test_v6_bracketed_with_port() {
        let addr = Address::parse("[2001:db8::1]:8080").unwrap();
        match &addr {
            Address::V6(a) => {
                assert_eq!(a.port(), 8080);
                let octets = a.ip().octets();
                assert_eq!(&octets[..4], &[0x20, 0x01, 0x0d, 0xb8]);
                assert_eq!(octets[15], 1);
            }
            other => panic!("expected V6, got {:?}", other),
        }
        assert_eq!(addr.to_string(), "[2001:db8::1]:8080");
    }

    #[test]
    fn test_v6_bare_and_compressed() {
        let addr = Address::parse("::1").unwrap();
        assert_eq!(addr.to_string(), "::1");
        assert_eq!(addr.port(), 0);

        let mapped = Address::parse("::ffff:10.0.0.1").unwrap();
        match mapped {
            Address::V6(a) => assert!(a.ip().to_ipv4_mapped().is_some()),
            other => panic!("expected V6, got {:?}", other),
        }
    }

    #[test]
    fn test_v6_numeric_zone() {
        let addr = Address::parse("fe80::1%3").unwrap();
        match &addr {
            Address::V6(a) => assert_eq!(a.scope_id(), 3),
            other => panic!("expected V6, got {:?}", other),
        }
        assert_eq!(addr.to_string(), "fe80::1%3");

        let bracketed = Address::parse("[fe80::1%3]:443").unwrap();
        assert_eq!(bracketed.to_string(), "[fe80::1%3]:443");
    }

    #[test]
    fn test_unix_path() {
        let addr = Address::parse("/tmp/test.sock").unwrap();
        assert!(matches!(addr, Address::Unix(_)));
        assert_eq!(addr.to_string(), "/tmp/test.sock");
        assert_eq!(addr.domain(), socket2::Domain::UNIX);
    }

    #[test]
    fn test_unix_path_too_long() {
        let long = format!("/tmp/{}", "x".repeat(300));
        assert_eq!(Address::unix(&long).unwrap_err(), NetError::Length);
    }

    #[test]
    fn test_with_port() {
        let addr = Address::parse("127.0.0.1").unwrap().with_port(9000);
        assert_eq!(addr.to_string(), "127.0.0.1:9000");
    }
}
