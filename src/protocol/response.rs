//! Discrimination of server-to-client payloads.
//!
//! Only the first payload byte (plus, for EOF, the payload length) tells a
//! reply apart: `0x00` OK, `0xff` ERR, `0xfe` EOF when shorter than 9 bytes.
//! Anything else is a result-set header, a field definition, or a row datum.

use zerocopy::byteorder::little_endian::U16 as U16LE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::{
    EOF_HEADER, EOF_MAX_PAYLOAD, ERR_HEADER, OK_HEADER, ServerStatusFlags,
};
use crate::error::{Error, Result};
use crate::protocol::primitive::{read_int_1, read_int_2, read_string_fix};

pub fn is_ok(payload: &[u8]) -> bool {
    payload.first() == Some(&OK_HEADER)
}

pub fn is_err(payload: &[u8]) -> bool {
    payload.first() == Some(&ERR_HEADER)
}

/// An EOF marker terminates field-definition and row sub-streams. A payload
/// starting with 0xfe but 9 bytes or longer is a length-encoded integer, not
/// an EOF.
pub fn is_eof(payload: &[u8]) -> bool {
    payload.first() == Some(&EOF_HEADER) && payload.len() < EOF_MAX_PAYLOAD
}

/// The payload part of an ERR packet, unparsed.
#[derive(Debug, Clone, Copy)]
pub struct ErrPayloadBytes<'a>(pub &'a [u8]);

/// The ERR packet parsed from [`ErrPayloadBytes`], for logging and display.
#[derive(Debug, Clone, thiserror::Error)]
#[error("ERROR {} ({}): {}", self.error_code, self.sql_state, self.message)]
pub struct ErrPayload {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

impl TryFrom<ErrPayloadBytes<'_>> for ErrPayload {
    type Error = Error;

    fn try_from(bytes: ErrPayloadBytes<'_>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.0)?;
        if header != ERR_HEADER {
            return Err(Error::InvalidPacket);
        }

        let (error_code, data) = read_int_2(data)?;

        // 4.1+ servers prepend '#' and a 5-byte SQLSTATE; older servers start
        // the message right after the error code.
        let (sql_state, message) = if data.first() == Some(&b'#') {
            let (_marker, data) = read_string_fix(data, 1)?;
            let (sql_state, data) = read_string_fix(data, 5)?;
            (String::from_utf8_lossy(sql_state).into_owned(), data)
        } else {
            (String::new(), data)
        };

        Ok(ErrPayload {
            error_code,
            sql_state,
            message: String::from_utf8_lossy(message).into_owned(),
        })
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct EofPayload {
    warnings: U16LE,
    status_flags: U16LE,
}

impl EofPayload {
    pub fn warnings(&self) -> u16 {
        self.warnings.get()
    }

    pub fn status_flags(&self) -> ServerStatusFlags {
        ServerStatusFlags::from_bits_truncate(self.status_flags.get())
    }
}

/// Parse the warning count and status flags out of an EOF payload (zero-copy).
pub fn read_eof_payload(payload: &[u8]) -> Result<&EofPayload> {
    if !is_eof(payload) || payload.len() < 5 {
        return Err(Error::InvalidPacket);
    }
    EofPayload::ref_from_bytes(&payload[1..5]).map_err(|_| Error::InvalidPacket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_discrimination_respects_length() {
        assert!(is_eof(&[0xfe, 0x00, 0x00, 0x02, 0x00]));
        // 0xfe with a 9-byte payload is a length-encoded integer header.
        assert!(!is_eof(&[0xfe, 0, 0, 0, 0, 0, 0, 0, 0]));
        assert!(!is_eof(&[0x00]));
        assert!(!is_eof(&[]));
    }

    #[test]
    fn err_payload_with_sql_state() {
        let mut payload = vec![0xff, 0x48, 0x04]; // 1096
        payload.extend_from_slice(b"#HY000No tables used");
        let parsed = ErrPayload::try_from(ErrPayloadBytes(&payload)).unwrap();
        assert_eq!(parsed.error_code, 1096);
        assert_eq!(parsed.sql_state, "HY000");
        assert_eq!(parsed.message, "No tables used");
    }

    #[test]
    fn err_payload_pre_41_layout() {
        let mut payload = vec![0xff, 0x15, 0x04]; // 1045
        payload.extend_from_slice(b"Access denied");
        let parsed = ErrPayload::try_from(ErrPayloadBytes(&payload)).unwrap();
        assert_eq!(parsed.error_code, 1045);
        assert_eq!(parsed.sql_state, "");
        assert_eq!(parsed.message, "Access denied");
    }
}
