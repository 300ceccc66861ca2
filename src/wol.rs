pub mod mac;
pub mod noop;
pub mod packet;
pub mod udp;

pub use mac::{normalize, validate, MacAddress};
pub use packet::MagicPacket;

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const WOL_PORT: u16 = 9;
pub const DEFAULT_BROADCAST: Ipv4Addr = Ipv4Addr::BROADCAST;
pub const DEFAULT_REPEAT: NonZeroU32 = match NonZeroU32::new(3) {
    Some(n) => n,
    None => unreachable!(),
};
const REPEAT_DELAY: Duration = Duration::from_millis(10);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid MAC address format: {0}")]
    InvalidFormat(String),
    #[error("invalid broadcast address: {0}")]
    InvalidBroadcastAddress(String),
    #[error("no suitable IPv4 address found on interface {0}")]
    NoUsableAddress(String),
    #[error("failed to create UDP socket on {context}: {source}")]
    Socket {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to send magic packet from {context} to {target}: {source}")]
    Send {
        context: String,
        target: SocketAddrV4,
        #[source]
        source: io::Error,
    },
}

/// Where a magic packet is delivered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SendTarget {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl SendTarget {
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.addr, self.port)
    }
}

impl Default for SendTarget {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST, WOL_PORT)
    }
}

/// Which local address a packet is sent from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceBinding {
    /// 0.0.0.0, leaving the outgoing interface to the routing table.
    Any,
    /// A named interface, resolved to an address at send time.
    Interface(String),
}

pub trait Transmitter {
    /// Sends one datagram and releases every resource it acquired before returning.
    fn transmit(
        &self,
        packet: &MagicPacket,
        target: SendTarget,
        binding: &SourceBinding,
    ) -> Result<(), Error>;
}

/// Parses MAC addresses, builds magic packets and hands them to a
/// [`Transmitter`]. Holds no per-call state, so one instance can be shared
/// between threads.
#[derive(Clone)]
pub struct WakeService {
    target: SendTarget,
    binding: SourceBinding,
    transmitter: Arc<dyn Transmitter + Sync + Send>,
}

impl WakeService {
    /// Builds a service sending over UDP. An empty or missing `broadcast`
    /// means 255.255.255.255; an empty `iface` means the wildcard address.
    pub fn new(iface: Option<&str>, broadcast: Option<&str>) -> Result<Self, Error> {
        Self::with_transmitter(iface, broadcast, Arc::new(udp::UdpTransmitter))
    }

    pub fn with_transmitter(
        iface: Option<&str>,
        broadcast: Option<&str>,
        transmitter: Arc<dyn Transmitter + Sync + Send>,
    ) -> Result<Self, Error> {
        let addr = match broadcast.map(str::trim) {
            None | Some("") => DEFAULT_BROADCAST,
            Some(s) => match s.parse::<IpAddr>() {
                Ok(IpAddr::V4(addr)) => addr,
                _ => return Err(Error::InvalidBroadcastAddress(s.to_string())),
            },
        };
        let binding = match iface.map(str::trim) {
            None | Some("") => SourceBinding::Any,
            Some(name) => SourceBinding::Interface(name.to_string()),
        };
        Ok(Self {
            target: SendTarget::new(addr, WOL_PORT),
            binding,
            transmitter,
        })
    }

    pub fn target(&self) -> SendTarget {
        self.target
    }

    pub fn binding(&self) -> &SourceBinding {
        &self.binding
    }

    pub fn send_once(&self, mac: &str) -> Result<(), Error> {
        self.send_repeated(mac, NonZeroU32::MIN)
    }

    /// Sends `count` identical packets, 10ms apart. The first failure stops
    /// the remaining sends and is returned.
    pub fn send_repeated(&self, mac: &str, count: NonZeroU32) -> Result<(), Error> {
        let packet = MagicPacket::new(mac.parse()?);
        for i in 0..count.get() {
            if i > 0 {
                thread::sleep(REPEAT_DELAY);
            }
            self.transmitter
                .transmit(&packet, self.target, &self.binding)?;
        }
        Ok(())
    }
}
