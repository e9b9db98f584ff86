//! Endpoint addresses: IPv4, IPv6 or a Unix-domain socket path.
//!
//! Addresses are parsed from the textual forms used in proxy configuration
//! (`ip:port`, `[ipv6]:port`, `:port`, `/path/to/socket`). Only numeric
//! hosts are accepted; name resolution belongs to the caller.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use socket2::SockAddr;
use sqlproxy_error::{ProxyError, Result};

/// The resolved form of a [`NetworkAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AddressKind {
    #[default]
    Unset,
    Ipv4(SocketAddrV4),
    Ipv6(SocketAddrV6),
    Unix(PathBuf),
}

/// A socket endpoint plus its canonical textual name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkAddress {
    kind: AddressKind,
    name: String,
}

impl NetworkAddress {
    /// An unset address.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` into a resolved address.
    pub fn parse(text: &str) -> Result<Self> {
        let kind = parse_kind(text)?;
        Ok(Self::from_kind(kind))
    }

    /// Replace this address with the one described by `text`.
    ///
    /// On failure the previous value is kept.
    pub fn set_address(&mut self, text: &str) -> Result<()> {
        *self = Self::parse(text)?;
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        !matches!(self.kind, AddressKind::Unset)
    }

    pub fn kind(&self) -> &AddressKind {
        &self.kind
    }

    /// The IP endpoint, if this is an IPv4 or IPv6 address.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self.kind {
            AddressKind::Ipv4(addr) => Some(SocketAddr::V4(addr)),
            AddressKind::Ipv6(addr) => Some(SocketAddr::V6(addr)),
            AddressKind::Unix(_) | AddressKind::Unset => None,
        }
    }

    pub fn unix_path(&self) -> Option<&Path> {
        match &self.kind {
            AddressKind::Unix(path) => Some(path),
            _ => None,
        }
    }

    /// Canonical text form; empty when unset.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_unix(&self) -> bool {
        matches!(self.kind, AddressKind::Unix(_))
    }

    /// Update from what the kernel reports for a socket, e.g. after binding
    /// to port 0. Unnamed Unix peers leave the address untouched.
    pub fn refresh_from(&mut self, addr: &SockAddr) {
        if let Some(ip) = addr.as_socket() {
            *self = Self::from(ip);
        } else if let Some(path) = addr.as_pathname() {
            *self = Self::from_kind(AddressKind::Unix(path.to_path_buf()));
        }
    }

    pub(crate) fn to_sock_addr(&self, op: &'static str) -> Result<SockAddr> {
        match &self.kind {
            AddressKind::Ipv4(addr) => Ok(SockAddr::from(*addr)),
            AddressKind::Ipv6(addr) => Ok(SockAddr::from(*addr)),
            AddressKind::Unix(path) => Ok(SockAddr::unix(path)?),
            AddressKind::Unset => Err(ProxyError::NoAddress { op }),
        }
    }

    fn from_kind(kind: AddressKind) -> Self {
        let name = match &kind {
            AddressKind::Unset => String::new(),
            AddressKind::Ipv4(addr) => addr.to_string(),
            AddressKind::Ipv6(addr) => addr.to_string(),
            AddressKind::Unix(path) => path.display().to_string(),
        };
        Self { kind, name }
    }
}

fn parse_kind(text: &str) -> Result<AddressKind> {
    if text.is_empty() {
        return Err(ProxyError::address(text, "empty address"));
    }

    if text.starts_with('/') {
        // Reject paths that do not fit sockaddr_un up front.
        SockAddr::unix(text).map_err(|err| ProxyError::address(text, err.to_string()))?;
        return Ok(AddressKind::Unix(PathBuf::from(text)));
    }

    if text.starts_with('[') {
        return text
            .parse::<SocketAddrV6>()
            .map(AddressKind::Ipv6)
            .map_err(|_| ProxyError::address(text, "expected [ipv6]:port"));
    }

    let Some((host, port)) = text.rsplit_once(':') else {
        return Err(ProxyError::address(text, "missing port"));
    };
    let port = port
        .parse::<u16>()
        .map_err(|_| ProxyError::address(text, "invalid port"))?;
    let ip = if host.is_empty() {
        Ipv4Addr::UNSPECIFIED
    } else {
        host.parse::<Ipv4Addr>()
            .map_err(|_| ProxyError::address(text, "host is not a numeric IPv4 address"))?
    };
    Ok(AddressKind::Ipv4(SocketAddrV4::new(ip, port)))
}

impl From<SocketAddr> for NetworkAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::from_kind(AddressKind::Ipv4(v4)),
            SocketAddr::V6(v6) => Self::from_kind(AddressKind::Ipv6(v6)),
        }
    }
}

impl FromStr for NetworkAddress {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NetworkAddress {
    type Error = ProxyError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<NetworkAddress> for String {
    fn from(addr: NetworkAddress) -> Self {
        addr.name
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
