use log::{debug, info};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use thiserror::Error;

use crate::metrics;

pub const WOL_PORT: u16 = 9;
pub const MAC_ADDRESS_LEN: usize = 6;
pub const MAGIC_PACKET_LEN: usize = MAC_ADDRESS_LEN + 16 * MAC_ADDRESS_LEN;

const SYNCHRONIZATION_SCHEME: [u8; MAC_ADDRESS_LEN] = [0xff; MAC_ADDRESS_LEN];
const MAC_REPETITIONS: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid MAC address.")]
    InvalidMacAddress,
    #[error("Invalid octet at position {position}")]
    InvalidOctet { position: usize },
    #[error("Invalid hex digit in MAC address.")]
    InvalidHexDigit,
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Unable to resolve host {host:?}")]
    UnresolvableHost {
        host: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Failed to transmit magic packet: {0}")]
    TransmissionFailed(#[source] io::Error),
}

impl SendError {
    /// Short label used for the failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnresolvableHost { .. } => "unresolvable_host",
            Self::TransmissionFailed(_) => "transmission",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; MAC_ADDRESS_LEN]);

impl MacAddress {
    pub const fn new(octets: [u8; MAC_ADDRESS_LEN]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; MAC_ADDRESS_LEN] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_mac(s)
    }
}

/// Parses a MAC address written as six groups of one or two hex digits,
/// separated by `:` or `-`. Groups are returned in input order.
pub fn parse_mac(mac_address: &str) -> Result<MacAddress, ValidationError> {
    let mut groups: Vec<&str> = mac_address.split([':', '-']).collect();
    // Trailing delimiters are tolerated: "01:02:03:04:05:06:" has six groups.
    while groups.len() > 1 && groups.last() == Some(&"") {
        groups.pop();
    }
    if groups.len() != MAC_ADDRESS_LEN {
        return Err(ValidationError::InvalidMacAddress);
    }
    let mut octets = [0u8; MAC_ADDRESS_LEN];
    for (position, group) in groups.iter().enumerate() {
        if group.chars().count() > 2 {
            return Err(ValidationError::InvalidOctet { position });
        }
        // from_str_radix alone would let a leading '+' through.
        if group.is_empty() || !group.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidHexDigit);
        }
        octets[position] =
            u8::from_str_radix(group, 16).map_err(|_| ValidationError::InvalidHexDigit)?;
    }
    Ok(MacAddress(octets))
}

/// Six bytes of 0xff followed by the target MAC repeated sixteen times.
#[derive(Clone, PartialEq, Eq)]
pub struct MagicPacket([u8; MAGIC_PACKET_LEN]);

impl MagicPacket {
    pub fn new(mac_address: &MacAddress) -> Self {
        let mut data = [0u8; MAGIC_PACKET_LEN];
        data[..MAC_ADDRESS_LEN].copy_from_slice(&SYNCHRONIZATION_SCHEME);
        for chunk in data[MAC_ADDRESS_LEN..].chunks_exact_mut(MAC_ADDRESS_LEN) {
            chunk.copy_from_slice(&mac_address.0);
        }
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MagicPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mac = MacAddress(
            self.0[MAC_ADDRESS_LEN..2 * MAC_ADDRESS_LEN]
                .try_into()
                .map_err(|_| fmt::Error)?,
        );
        write!(f, "MagicPacket({} x{})", mac, MAC_REPETITIONS)
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, SendError> {
    if host.trim().is_empty() {
        return Err(SendError::UnresolvableHost {
            host: host.to_string(),
            source: None,
        });
    }
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| SendError::UnresolvableHost {
            host: host.to_string(),
            source: Some(e),
        })?;
    addrs.next().ok_or_else(|| SendError::UnresolvableHost {
        host: host.to_string(),
        source: None,
    })
}

fn transmit(packet: &MagicPacket, target: SocketAddr) -> io::Result<()> {
    let socket = match target {
        SocketAddr::V4(_) => {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
            socket.set_broadcast(true)?;
            socket
        }
        SocketAddr::V6(_) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?,
    };
    let sent = socket.send_to(packet.as_bytes(), target)?;
    if sent != MAGIC_PACKET_LEN {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("sent {} of {} bytes", sent, MAGIC_PACKET_LEN),
        ));
    }
    Ok(())
}

/// Sends a single magic packet for `mac_address` to `broadcast_address` on
/// the standard WoL port. Delivery is not confirmed.
pub fn send_wol(broadcast_address: &str, mac_address: &str) -> Result<(), SendError> {
    send_wol_to_port(broadcast_address, WOL_PORT, mac_address)
}

pub fn send_wol_to_port(
    broadcast_address: &str,
    port: u16,
    mac_address: &str,
) -> Result<(), SendError> {
    let result = parse_mac(mac_address)
        .map_err(SendError::from)
        .and_then(|mac| {
            let packet = MagicPacket::new(&mac);
            let target = resolve(broadcast_address, port)?;
            debug!("sending {:?} to {}", packet, target);
            transmit(&packet, target).map_err(SendError::TransmissionFailed)?;
            info!("sent magic packet for {} to {}", mac, target);
            Ok(())
        });
    match &result {
        Ok(()) => metrics::PACKETS_SENT.inc(),
        Err(e) => metrics::SEND_FAILURES
            .with_label_values(&[e.reason()])
            .inc(),
    }
    result
}
