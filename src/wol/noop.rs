use crate::wol::packet::MagicPacket;
use crate::wol::{Error, SendTarget, SourceBinding, Transmitter};
use log::info;

pub struct LogOnlyTransmitter;

impl Transmitter for LogOnlyTransmitter {
    fn transmit(
        &self,
        packet: &MagicPacket,
        target: SendTarget,
        binding: &SourceBinding,
    ) -> Result<(), Error> {
        let mac = &packet.as_bytes()[6..12];
        info!(
            "faking magic packet for {:02x?} to {} via {:?}",
            mac,
            target.socket_addr(),
            binding
        );
        Ok(())
    }
}
