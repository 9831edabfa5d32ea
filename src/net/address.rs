/*!
 * Address Codec
 *
 * Converts between the host-readable `Address` and the `sockaddr_in`-compatible
 * `WireAddress`. Byte-order conversion of the port happens here and nowhere else.
 */

use crate::core::limits::{EAFNOSUPPORT, EINVAL};
use crate::core::types::{RawStatus, AF_INET};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

/// Host to network byte order for a port
#[inline]
pub const fn htons(value: u16) -> u16 {
    value.to_be()
}

/// Network to host byte order for a port
#[inline]
pub const fn ntohs(value: u16) -> u16 {
    u16::from_be(value)
}

/// Supported address families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    Inet,
}

impl AddressFamily {
    /// Wire-level numeric tag
    pub const fn tag(self) -> u16 {
        match self {
            Self::Inet => AF_INET,
        }
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            AF_INET => Some(Self::Inet),
            _ => None,
        }
    }
}

/// Host-readable IPv4 socket address
///
/// `port` is in host order. `ipv4` holds the four address octets in memory
/// order (as received from the wire) and is never byte-swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub family: AddressFamily,
    pub port: u16,
    pub ipv4: u32,
}

impl Address {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            family: AddressFamily::Inet,
            port,
            ipv4: u32::from_ne_bytes(ip.octets()),
        }
    }

    /// `0.0.0.0:0`
    pub fn unspecified() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, 0)
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ipv4.to_ne_bytes())
    }

    pub fn octets(&self) -> [u8; 4] {
        self.ipv4.to_ne_bytes()
    }

    pub fn with_port(self, port: u16) -> Self {
        Self { port, ..self }
    }

    pub fn is_unspecified(&self) -> bool {
        self.ip().is_unspecified()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port)
    }
}

impl FromStr for Address {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddrV4>().map(Self::from)
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<Address> for SocketAddrV4 {
    fn from(addr: Address) -> Self {
        SocketAddrV4::new(addr.ip(), addr.port)
    }
}

/// Size of the raw `sockaddr_in` image
pub const WIRE_ADDRESS_LEN: usize = 16;

/// `sockaddr_in`-compatible address layout shared by every backend
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WireAddress {
    /// Address family tag (host order, like `sa_family_t`)
    pub family: u16,
    /// Port in network byte order
    pub port: u16,
    /// Four raw address octets
    pub addr: u32,
    pub zero: [u8; 8],
}

impl WireAddress {
    /// Raw 16-byte image, laid out exactly as `sockaddr_in`
    pub fn to_bytes(&self) -> [u8; WIRE_ADDRESS_LEN] {
        let mut bytes = [0u8; WIRE_ADDRESS_LEN];
        bytes[0..2].copy_from_slice(&self.family.to_ne_bytes());
        bytes[2..4].copy_from_slice(&self.port.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.addr.to_ne_bytes());
        bytes[8..16].copy_from_slice(&self.zero);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RawStatus> {
        if bytes.len() < WIRE_ADDRESS_LEN {
            return Err(EINVAL);
        }
        let mut zero = [0u8; 8];
        zero.copy_from_slice(&bytes[8..16]);
        Ok(Self {
            family: u16::from_ne_bytes([bytes[0], bytes[1]]),
            port: u16::from_ne_bytes([bytes[2], bytes[3]]),
            addr: u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            zero,
        })
    }

    /// View as a std socket address (for backends that take one)
    pub fn to_socket_addr(&self) -> Result<SocketAddrV4, RawStatus> {
        decode(self).map(SocketAddrV4::from)
    }

    pub fn from_socket_addr(addr: SocketAddrV4) -> Self {
        encode(&Address::from(addr))
    }
}

/// Encode a host-order address into its wire layout
pub fn encode(addr: &Address) -> WireAddress {
    WireAddress {
        family: addr.family.tag(),
        port: htons(addr.port),
        addr: addr.ipv4,
        zero: [0; 8],
    }
}

/// Decode a wire address filled in by a caller or a backend
pub fn decode(wire: &WireAddress) -> Result<Address, RawStatus> {
    let family = AddressFamily::from_tag(wire.family).ok_or(EAFNOSUPPORT)?;
    Ok(Address {
        family,
        port: ntohs(wire.port),
        ipv4: wire.addr,
    })
}
