//! Network peer endpoints.
//!
//! A [`Peer`] is the `(IP address, listen port)` pair under which a node can
//! be reached. On the wire the address occupies 16 bytes (IPv4 addresses are
//! v4-mapped into IPv6) followed by the port as a big-endian `u32`; only the
//! low 16 bits of the port field are meaningful.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::wire::{Reader, Writer};
use crate::{Result, IP_SIZE, PORT_SIZE};

/// A network endpoint: IP address plus listen port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// IP address the peer listens on.
    pub ip: IpAddr,
    /// TCP listen port.
    pub port: u16,
}

impl Peer {
    /// Encoded size of a peer on the wire.
    pub const WIRE_SIZE: usize = IP_SIZE + PORT_SIZE;

    /// Create a peer from an address and port.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// The all-zero sentinel peer used when a node's own address is unknown
    /// to itself (e.g. the committee entry a node records for itself).
    pub fn unspecified() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }

    /// Whether this is the all-zero sentinel.
    pub fn is_unspecified(&self) -> bool {
        self.port == 0 && self.ip.is_unspecified()
    }

    /// Append the wire encoding of this peer to `w`.
    pub fn encode(&self, w: &mut Writer) {
        let v6: Ipv6Addr = match self.ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        w.write_bytes(&v6.octets());
        w.write_u32(u32::from(self.port));
    }

    /// Encode this peer as a standalone byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::WIRE_SIZE);
        self.encode(&mut w);
        w.into_bytes()
    }

    /// Decode a peer from the reader, consuming [`Peer::WIRE_SIZE`] bytes.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let octets: [u8; IP_SIZE] = r.read_array()?;
        let v6 = Ipv6Addr::from(octets);
        let ip = match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        };
        let port = r.read_u32()? as u16;
        Ok(Self { ip, port })
    }

    /// Decode a peer from a standalone byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        Self::decode(&mut r)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddr> for Peer {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_v4() {
        let peer = Peer::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 33133);
        let decoded = Peer::from_bytes(&peer.to_bytes()).unwrap();
        assert_eq!(peer, decoded);
    }

    #[test]
    fn round_trip_v6() {
        let peer = Peer::new("2001:db8::1".parse().unwrap(), 4201);
        let decoded = Peer::from_bytes(&peer.to_bytes()).unwrap();
        assert_eq!(peer, decoded);
    }

    #[test]
    fn wire_size_is_fixed() {
        let peer = Peer::unspecified();
        assert_eq!(peer.to_bytes().len(), Peer::WIRE_SIZE);
    }

    #[test]
    fn truncated_peer_rejected() {
        let bytes = [0u8; Peer::WIRE_SIZE - 1];
        assert!(Peer::from_bytes(&bytes).is_err());
    }
}
