use crate::wol::mac::MacAddress;

const SYNCHRONIZATION_STREAM: [u8; 6] = [0xff; 6];
const MAC_REPETITIONS: usize = 16;
pub const MAGIC_PACKET_LEN: usize = SYNCHRONIZATION_STREAM.len() + MAC_REPETITIONS * 6;

/// The 102 byte Wake-on-LAN payload: six 0xFF bytes, then the target
/// address sixteen times.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MagicPacket([u8; MAGIC_PACKET_LEN]);

impl MagicPacket {
    pub fn new(mac: MacAddress) -> Self {
        let mut data = [0u8; MAGIC_PACKET_LEN];
        data[..SYNCHRONIZATION_STREAM.len()].copy_from_slice(&SYNCHRONIZATION_STREAM);
        for chunk in data[SYNCHRONIZATION_STREAM.len()..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&mac.octets());
        }
        MagicPacket(data)
    }

    pub fn as_bytes(&self) -> &[u8; MAGIC_PACKET_LEN] {
        &self.0
    }
}

impl From<MacAddress> for MagicPacket {
    fn from(mac: MacAddress) -> Self {
        MagicPacket::new(mac)
    }
}
