// Sends magic packets as UDP broadcast datagrams.

use crate::wol::packet::MagicPacket;
use crate::wol::{Error, SendTarget, SourceBinding, Transmitter};
use log::debug;
use nix::ifaddrs::getifaddrs;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(3);

/// Opens a fresh socket for every packet; nothing is kept between calls.
pub struct UdpTransmitter;

impl Transmitter for UdpTransmitter {
    fn transmit(
        &self,
        packet: &MagicPacket,
        target: SendTarget,
        binding: &SourceBinding,
    ) -> Result<(), Error> {
        let source = resolve_source(binding)?;
        let context = match binding {
            SourceBinding::Any => source.to_string(),
            SourceBinding::Interface(name) => format!("{} ({})", name, source),
        };
        let socket = open_socket(source).map_err(|source| Error::Socket {
            context: context.clone(),
            source,
        })?;

        let dest = target.socket_addr();
        send_all(&socket, packet.as_bytes(), dest).map_err(|source| Error::Send {
            context,
            target: dest,
            source,
        })?;
        debug!("sent magic packet from {} to {}", source, dest);
        Ok(())
    }
}

fn send_all(socket: &UdpSocket, data: &[u8], dest: SocketAddrV4) -> io::Result<()> {
    match socket.send_to(data, dest)? {
        n if n == data.len() => Ok(()),
        n => Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("wrote {} of {} bytes", n, data.len()),
        )),
    }
}

fn open_socket(source: Ipv4Addr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddrV4::new(source, 0))?;
    socket.set_broadcast(true)?;
    socket.set_write_timeout(Some(SOCKET_TIMEOUT))?;
    Ok(socket)
}

/// Picks the local address to send from: the wildcard address, or the first
/// non-loopback IPv4 address assigned to the named interface.
pub fn resolve_source(binding: &SourceBinding) -> Result<Ipv4Addr, Error> {
    let name = match binding {
        SourceBinding::Any => return Ok(Ipv4Addr::UNSPECIFIED),
        SourceBinding::Interface(name) => name,
    };
    let addrs = getifaddrs().map_err(|errno| Error::Socket {
        context: format!("interface {}", name),
        source: io::Error::from(errno),
    })?;
    addrs
        .filter(|ifaddr| &ifaddr.interface_name == name)
        .filter_map(|ifaddr| {
            let storage = ifaddr.address?;
            let sin = storage.as_sockaddr_in()?;
            Some(*SocketAddrV4::from(*sin).ip())
        })
        .find(|ip| !ip.is_loopback())
        .ok_or_else(|| Error::NoUsableAddress(name.clone()))
}

#[cfg(test)]
mod tests {
    use crate::wol::mac::MacAddress;
    use crate::wol::udp::*;

    #[test]
    fn test_resolve_any() {
        assert_eq!(
            resolve_source(&SourceBinding::Any).unwrap(),
            Ipv4Addr::UNSPECIFIED
        );
    }

    #[test]
    fn test_resolve_loopback_only() {
        // lo only carries 127.0.0.1, which is never chosen.
        let err = resolve_source(&SourceBinding::Interface("lo".to_string())).unwrap_err();
        assert!(matches!(err, Error::NoUsableAddress(ref i) if i == "lo"));
    }

    #[test]
    fn test_resolve_missing_interface() {
        let err =
            resolve_source(&SourceBinding::Interface("wolgate-none0".to_string())).unwrap_err();
        assert!(matches!(err, Error::NoUsableAddress(_)));
    }

    #[test]
    fn test_transmit_to_loopback() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = listener.local_addr().unwrap().port();

        let packet = MagicPacket::new(MacAddress::new([0x24, 0x4b, 0xfe, 0x55, 0x78, 0x94]));
        UdpTransmitter
            .transmit(
                &packet,
                SendTarget::new(Ipv4Addr::LOCALHOST, port),
                &SourceBinding::Any,
            )
            .unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(len, 102);
        assert_eq!(&buf[..len], &packet.as_bytes()[..]);
    }

    #[test]
    fn test_send_error_names_source_and_target() {
        // Linux refuses UDP datagrams addressed to port 0.
        let packet = MagicPacket::new(MacAddress::new([0x24, 0x4b, 0xfe, 0x55, 0x78, 0x94]));
        let err = UdpTransmitter
            .transmit(
                &packet,
                SendTarget::new(Ipv4Addr::LOCALHOST, 0),
                &SourceBinding::Any,
            )
            .unwrap_err();
        match &err {
            Error::Send {
                context, target, ..
            } => {
                assert_eq!(context, "0.0.0.0");
                assert_eq!(target.to_string(), "127.0.0.1:0");
            }
            other => panic!("expected Send, got {:?}", other),
        }
        assert!(err
            .to_string()
            .starts_with("failed to send magic packet from 0.0.0.0 to 127.0.0.1:0"));
    }
}
