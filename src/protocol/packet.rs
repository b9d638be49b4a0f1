use std::io::{Read, Write};

use tracing::trace;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::HEADER_SIZE;
use crate::error::{Error, Result, eyre};

/// MySQL packet header (zero-copy)
///
/// Layout matches the wire protocol:
/// - length: 3 bytes (little-endian, payload length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(length: usize, sequence_id: u8) -> Self {
        let len = u32::to_le_bytes(length as u32);
        Self {
            length: [len[0], len[1], len[2]],
            sequence_id,
        }
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }

    pub fn encode_in_place(&mut self, length: usize, sequence_id: u8) {
        let len = u32::to_le_bytes(length as u32);
        self.length = [len[0], len[1], len[2]];
        self.sequence_id = sequence_id;
    }
}

/// One complete framed packet: `[len_lo][len_mid][len_hi][seq][payload…]`.
///
/// The proxy never interprets payload content here; discrimination of
/// OK/ERR/EOF lives in [`crate::protocol::response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Vec<u8>,
}

impl Packet {
    /// Wrap an already-framed byte buffer. The buffer must hold the 4-byte
    /// header and exactly the payload the header announces.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::InvalidPacket);
        }
        let header = PacketHeader::ref_from_bytes(&bytes[..HEADER_SIZE])?;
        if bytes.len() != header.length() + HEADER_SIZE {
            return Err(Error::InvalidPacket);
        }
        Ok(Self { bytes })
    }

    /// Frame a payload under a fresh header.
    pub fn from_payload(sequence_id: u8, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(PacketHeader::encode(payload.len(), sequence_id).as_bytes());
        bytes.extend_from_slice(payload);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total framed size, header included. Never less than [`HEADER_SIZE`].
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn sequence_id(&self) -> u8 {
        self.bytes[3]
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// First payload byte: the command byte of a client packet, or the status
    /// byte of a server packet. `None` for an empty payload.
    pub fn first_payload_byte(&self) -> Option<u8> {
        self.payload().first().copied()
    }
}

/// Outcome of one [`PacketReader::step`].
#[derive(Debug)]
pub enum ReadStep {
    /// More bytes are still owed; call `step` again.
    Incomplete,
    /// The frame is complete.
    Complete(Packet),
    /// The peer closed the stream on a frame boundary or mid-frame.
    Eof,
}

/// Resumable packet-read cursor.
///
/// Each `step` issues at most one `read` against the underlying stream, so a
/// caller can interleave reads from several streams without ever mixing bytes
/// from two packets. Created empty for each packet; consumed by the completed
/// packet, reset on EOF or error.
#[derive(Debug, Default)]
pub struct PacketReader {
    buf: Vec<u8>,
    filled: usize,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<R: Read>(&mut self, reader: &mut R) -> Result<ReadStep> {
        if self.filled < HEADER_SIZE {
            return self.step_header(reader);
        }
        self.step_payload(reader)
    }

    fn step_header<R: Read>(&mut self, reader: &mut R) -> Result<ReadStep> {
        if self.buf.len() < HEADER_SIZE {
            self.buf.resize(HEADER_SIZE, 0);
        }

        let n = match reader.read(&mut self.buf[self.filled..HEADER_SIZE]) {
            Ok(n) => n,
            Err(err) => {
                self.reset();
                return Err(err.into());
            }
        };
        if n == 0 {
            self.reset();
            return Ok(ReadStep::Eof);
        }
        self.filled += n;

        if self.filled == HEADER_SIZE {
            let header = PacketHeader::ref_from_bytes(&self.buf[..HEADER_SIZE])?;
            let length = header.length();
            trace!(
                sequence_id = header.sequence_id,
                length, "read header, expecting payload"
            );
            self.buf.resize(HEADER_SIZE + length, 0);
            if length == 0 {
                return Ok(self.complete());
            }
        }
        Ok(ReadStep::Incomplete)
    }

    fn step_payload<R: Read>(&mut self, reader: &mut R) -> Result<ReadStep> {
        let n = match reader.read(&mut self.buf[self.filled..]) {
            Ok(n) => n,
            Err(err) => {
                self.reset();
                return Err(err.into());
            }
        };
        if n == 0 {
            self.reset();
            return Ok(ReadStep::Eof);
        }
        self.filled += n;

        if self.filled == self.buf.len() {
            trace!(size = self.filled, "completed packet");
            return Ok(self.complete());
        }
        trace!(read = self.filled, of = self.buf.len(), "partial packet");
        Ok(ReadStep::Incomplete)
    }

    fn complete(&mut self) -> ReadStep {
        self.filled = 0;
        ReadStep::Complete(Packet {
            bytes: std::mem::take(&mut self.buf),
        })
    }

    fn reset(&mut self) {
        self.buf = Vec::new();
        self.filled = 0;
    }
}

/// Outcome of one [`PacketWriter::step`].
#[derive(Debug, PartialEq, Eq)]
pub enum WriteStep {
    Incomplete,
    Complete,
}

/// Resumable packet-write cursor: a borrowed packet plus a `sent` counter,
/// reset per packet per destination.
#[derive(Debug)]
pub struct PacketWriter<'p> {
    packet: &'p Packet,
    sent: usize,
}

impl<'p> PacketWriter<'p> {
    pub fn new(packet: &'p Packet) -> Self {
        Self { packet, sent: 0 }
    }

    pub fn step<W: Write>(&mut self, writer: &mut W) -> Result<WriteStep> {
        let remaining = &self.packet.as_bytes()[self.sent..];
        if remaining.is_empty() {
            return Err(Error::Bug(eyre!(
                "write cursor driven past the end of its packet"
            )));
        }

        let n = writer.write(remaining)?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
        }
        self.sent += n;

        if self.sent == self.packet.len() {
            trace!(size = self.sent, "completed packet write");
            Ok(WriteStep::Complete)
        } else {
            trace!(sent = self.sent, of = self.packet.len(), "partial write");
            Ok(WriteStep::Incomplete)
        }
    }
}

/// Drive a read cursor to one complete packet. EOF surfaces as
/// [`Error::UnexpectedEof`]; callers that treat a clean close as normal match
/// on it.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Packet> {
    let mut cursor = PacketReader::new();
    loop {
        match cursor.step(reader)? {
            ReadStep::Incomplete => {}
            ReadStep::Complete(packet) => return Ok(packet),
            ReadStep::Eof => return Err(Error::UnexpectedEof),
        }
    }
}

/// Drive a write cursor to completion and flush.
pub fn write_packet<W: Write>(writer: &mut W, packet: &Packet) -> Result<()> {
    let mut cursor = PacketWriter::new(packet);
    while let WriteStep::Incomplete = cursor.step(writer)? {}
    writer.flush()?;
    Ok(())
}
