/// Every MySQL packet starts with a 3-byte payload length and a 1-byte
/// sequence id.
pub const HEADER_SIZE: usize = 4;

/// First payload byte of an OK packet.
pub const OK_HEADER: u8 = 0x00;
/// First payload byte of an ERR packet.
pub const ERR_HEADER: u8 = 0xff;
/// First payload byte of an EOF packet. Only an EOF when the payload is
/// shorter than [`EOF_MAX_PAYLOAD`]; longer payloads starting with 0xfe are
/// length-encoded integers.
pub const EOF_HEADER: u8 = 0xfe;
pub const EOF_MAX_PAYLOAD: usize = 9;

/// In an ERR packet, the human-readable message starts at this payload offset
/// (after the header byte and the 2-byte error code).
pub const ERR_MESSAGE_OFFSET: usize = 3;

/// Command byte: the first payload byte of every client-to-server packet.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandByte {
    Sleep = 0x00,
    /// Client is closing the connection. Delegates drop the connection
    /// without replying.
    Quit = 0x01,
    InitDb = 0x02,
    /// Text-protocol query; the reply may carry row data.
    Query = 0x03,
    /// Column metadata for one table; the reply is field definitions only.
    FieldList = 0x04,
    CreateDb = 0x05,
    DropDb = 0x06,
    Refresh = 0x07,
    Shutdown = 0x08,
    Statistics = 0x09,
    ProcessInfo = 0x0a,
    Connect = 0x0b,
    ProcessKill = 0x0c,
    Debug = 0x0d,
    Ping = 0x0e,
    Time = 0x0f,
    DelayedInsert = 0x10,
    ChangeUser = 0x11,
    BinlogDump = 0x12,
    TableDump = 0x13,
    ConnectOut = 0x14,
    RegisterSlave = 0x15,
    StmtPrepare = 0x16,
    StmtExecute = 0x17,
    StmtSendLongData = 0x18,
    StmtClose = 0x19,
    StmtReset = 0x1a,
    SetOption = 0x1b,
    StmtFetch = 0x1c,
}

impl CommandByte {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Sleep),
            0x01 => Some(Self::Quit),
            0x02 => Some(Self::InitDb),
            0x03 => Some(Self::Query),
            0x04 => Some(Self::FieldList),
            0x05 => Some(Self::CreateDb),
            0x06 => Some(Self::DropDb),
            0x07 => Some(Self::Refresh),
            0x08 => Some(Self::Shutdown),
            0x09 => Some(Self::Statistics),
            0x0a => Some(Self::ProcessInfo),
            0x0b => Some(Self::Connect),
            0x0c => Some(Self::ProcessKill),
            0x0d => Some(Self::Debug),
            0x0e => Some(Self::Ping),
            0x0f => Some(Self::Time),
            0x10 => Some(Self::DelayedInsert),
            0x11 => Some(Self::ChangeUser),
            0x12 => Some(Self::BinlogDump),
            0x13 => Some(Self::TableDump),
            0x14 => Some(Self::ConnectOut),
            0x15 => Some(Self::RegisterSlave),
            0x16 => Some(Self::StmtPrepare),
            0x17 => Some(Self::StmtExecute),
            0x18 => Some(Self::StmtSendLongData),
            0x19 => Some(Self::StmtClose),
            0x1a => Some(Self::StmtReset),
            0x1b => Some(Self::SetOption),
            0x1c => Some(Self::StmtFetch),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Server status bits carried by OK and EOF payloads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ServerStatusFlags: u16 {
        /// A transaction is open
        const SERVER_STATUS_IN_TRANS = 0x0001;
        /// Autocommit is enabled
        const SERVER_STATUS_AUTOCOMMIT = 0x0002;
        /// More result sets follow this one
        const SERVER_MORE_RESULTS_EXISTS = 0x0008;
        const SERVER_STATUS_NO_GOOD_INDEX_USED = 0x0010;
        const SERVER_STATUS_NO_INDEX_USED = 0x0020;
        /// A read-only cursor is open
        const SERVER_STATUS_CURSOR_EXISTS = 0x0040;
        /// The last row of an open cursor has been sent
        const SERVER_STATUS_LAST_ROW_SENT = 0x0080;
        const SERVER_STATUS_DB_DROPPED = 0x0100;
        const SERVER_STATUS_NO_BACKSLASH_ESCAPES = 0x0200;
        const SERVER_STATUS_METADATA_CHANGED = 0x0400;
        const SERVER_QUERY_WAS_SLOW = 0x0800;
        const SERVER_PS_OUT_PARAMS = 0x1000;
        /// In a read-only transaction
        const SERVER_STATUS_IN_TRANS_READONLY = 0x2000;
        /// Session state change information follows
        const SERVER_SESSION_STATE_CHANGED = 0x4000;
    }
}

#[cfg(test)]
mod tests {
    use super::CommandByte;

    #[test]
    fn command_byte_round_trip() {
        assert_eq!(CommandByte::from_u8(0x01), Some(CommandByte::Quit));
        assert_eq!(CommandByte::from_u8(0x03), Some(CommandByte::Query));
        assert_eq!(CommandByte::from_u8(0x04), Some(CommandByte::FieldList));
        assert_eq!(CommandByte::from_u8(0x1c), Some(CommandByte::StmtFetch));
        assert_eq!(CommandByte::from_u8(0x1d), None);
        assert_eq!(CommandByte::from_u8(0xff), None);
    }
}
