pub mod packet;
pub mod primitive;
pub mod response;

pub use packet::{Packet, PacketHeader, PacketReader, PacketWriter, ReadStep, WriteStep};
pub use packet::{read_packet, write_packet};

#[cfg(test)]
mod packet_test;
