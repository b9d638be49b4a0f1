use std::io::{Cursor, Read, Write};

use pretty_assertions::assert_eq;

use crate::error::Error;
use crate::protocol::packet::{
    Packet, PacketReader, PacketWriter, ReadStep, WriteStep, read_packet, write_packet,
};

/// Hands out at most `chunk` bytes per read, exercising resumption.
struct Trickle<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.data.len().min(self.chunk).min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Accepts at most one byte per write.
struct OneByteSink {
    written: Vec<u8>,
}

impl Write for OneByteSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.written.push(buf[0]);
        Ok(1)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn framed(sequence_id: u8, payload: &[u8]) -> Vec<u8> {
    Packet::from_payload(sequence_id, payload).as_bytes().to_vec()
}

#[test]
fn round_trip_whole() {
    let wire = framed(3, b"SELECT 1");
    let packet = read_packet(&mut Cursor::new(wire.clone())).unwrap();
    assert_eq!(packet.as_bytes(), &wire[..]);
    assert_eq!(packet.sequence_id(), 3);
    assert_eq!(packet.payload(), b"SELECT 1");

    let mut out = Vec::new();
    write_packet(&mut out, &packet).unwrap();
    assert_eq!(out, wire);
}

#[test]
fn read_survives_every_fragmentation() {
    let wire = framed(0, b"\x03SELECT 1 FROM t");
    for chunk in 1..=wire.len() {
        let mut reader = Trickle { data: &wire, chunk };
        let packet = read_packet(&mut reader).unwrap();
        assert_eq!(packet.as_bytes(), &wire[..], "chunk size {}", chunk);
    }
}

#[test]
fn single_byte_reads_report_incomplete_until_the_last() {
    let wire = framed(0, &[0x0a, b'5', 0]);
    let mut reader = Trickle { data: &wire, chunk: 1 };
    let mut cursor = PacketReader::new();
    for _ in 0..wire.len() - 1 {
        assert!(matches!(
            cursor.step(&mut reader).unwrap(),
            ReadStep::Incomplete
        ));
    }
    match cursor.step(&mut reader).unwrap() {
        ReadStep::Complete(packet) => assert_eq!(packet.as_bytes(), &wire[..]),
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn eof_before_and_within_a_frame() {
    // Nothing at all.
    let mut cursor = PacketReader::new();
    assert!(matches!(
        cursor.step(&mut Cursor::new(Vec::new())).unwrap(),
        ReadStep::Eof
    ));

    // Stream dies mid-header.
    let wire = framed(0, b"abc");
    let mut cursor = PacketReader::new();
    let mut truncated = Cursor::new(wire[..2].to_vec());
    assert!(matches!(
        cursor.step(&mut truncated).unwrap(),
        ReadStep::Incomplete
    ));
    assert!(matches!(cursor.step(&mut truncated).unwrap(), ReadStep::Eof));

    // Stream dies mid-payload.
    let mut cursor = PacketReader::new();
    let mut truncated = Cursor::new(wire[..5].to_vec());
    assert!(matches!(
        cursor.step(&mut truncated).unwrap(),
        ReadStep::Incomplete
    ));
    assert!(matches!(
        cursor.step(&mut truncated).unwrap(),
        ReadStep::Incomplete
    ));
    assert!(matches!(cursor.step(&mut truncated).unwrap(), ReadStep::Eof));

    // The driving helper surfaces EOF as an error.
    assert!(matches!(
        read_packet(&mut Cursor::new(Vec::new())),
        Err(Error::UnexpectedEof)
    ));
}

#[test]
fn empty_payload_completes() {
    let wire = framed(7, b"");
    let packet = read_packet(&mut Cursor::new(wire.clone())).unwrap();
    assert_eq!(packet.as_bytes(), &wire[..]);
    assert_eq!(packet.payload(), b"");
}

#[test]
fn write_survives_partial_writes() {
    let packet = Packet::from_payload(2, b"\x00\x00\x00\x02\x00");
    let mut sink = OneByteSink { written: Vec::new() };
    let mut cursor = PacketWriter::new(&packet);
    let mut steps = 0;
    loop {
        steps += 1;
        match cursor.step(&mut sink).unwrap() {
            WriteStep::Incomplete => {}
            WriteStep::Complete => break,
        }
    }
    assert_eq!(steps, packet.len());
    assert_eq!(sink.written, packet.as_bytes());

    // Driving a finished cursor is a bug, not a silent no-op.
    assert!(matches!(cursor.step(&mut sink), Err(Error::Bug(_))));
}

#[test]
fn from_bytes_validates_the_header() {
    assert!(Packet::from_bytes(vec![1, 0]).is_err());
    // Header says 2 payload bytes, buffer has 1.
    assert!(Packet::from_bytes(vec![2, 0, 0, 0, b'x']).is_err());
    let packet = Packet::from_bytes(vec![1, 0, 0, 5, b'x']).unwrap();
    assert_eq!(packet.sequence_id(), 5);
    assert_eq!(packet.payload(), b"x");
}
