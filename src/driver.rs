//! Per-session conversation driver.
//!
//! Tracks, for each delegate independently, what kind of reply sequence is
//! currently in flight. Only the shape of the stream (OK, ERR, field
//! definitions, rows, EOF markers) tells the proxy when a delegate is done
//! talking, so the whole fan-out/reduce cycle is programmed by the command
//! classification here and advanced one packet at a time by [`Driver::reply`].

use std::borrow::Cow;

use tracing::{debug, info, trace};
use zerocopy::FromBytes;

use crate::constant::{CommandByte, HEADER_SIZE};
use crate::delegate::ReplySet;
use crate::error::{Error, Result, eyre};
use crate::protocol::packet::{Packet, PacketHeader};
use crate::protocol::primitive::{read_int_lenenc, read_string_null, write_string_null};
use crate::protocol::response::{self, ErrPayload, ErrPayloadBytes, read_eof_payload};

/// Dense index of one backend database, fixed for the process lifetime.
pub type DelegateId = usize;

/// What kind of reply sequence a delegate currently owes us.
///
/// `Idle` and `Errored` are the settled states: nothing more is expected on
/// that stream until the next command round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The delegate has not yet sent its server greeting (we are its client).
    Greeting,
    /// Nothing outstanding; ready for the next command.
    Idle,
    /// A single OK/ERR or a result-set header.
    Simple { expecting_rows: bool },
    /// Field definitions, terminated by an EOF marker.
    TableFields { expecting_rows: bool },
    /// Row data, terminated by an EOF marker.
    TableRows,
    /// This delegate answered the current round with an ERR packet.
    Errored,
}

impl Expect {
    pub fn settled(self) -> bool {
        matches!(self, Self::Idle | Self::Errored)
    }
}

/// High-level classification of a client command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// COM_QUERY: carries SQL text, replies may carry rows.
    Sql,
    /// COM_FIELD_LIST: carries a table name, replies are field definitions.
    TableMeta,
    /// Recognized control traffic (QUIT, the handshake response).
    Other,
    /// Forwarded as-is with the default single-reply expectation.
    Unsupported,
}

/// Whether a delegate takes part in the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Use,
    Skip,
}

/// How a round of per-delegate replies collapses into the one packet the
/// client sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReducePolicy {
    /// The first non-empty reply in delegate order wins, whether or not some
    /// other delegate errored. Historically observed proxy behavior.
    #[default]
    FirstReply,
    /// Any delegate error this round makes the error packet the reply.
    ErrorIfAny,
    /// All participating delegates must answer with identical payloads.
    RequireAllEqual,
}

/// All conversation state for one client session, owned by that session.
pub struct Driver {
    delegates: Vec<Expect>,
    done: bool,
    awaiting_auth_response: bool,
    auth_response: bool,
    error_reply: Option<Packet>,
    policy: ReducePolicy,
}

impl Driver {
    /// Every delegate starts at [`Expect::Greeting`]: the proxy is the client
    /// of each backend, and the first packet on each stream is the server
    /// handshake greeting.
    pub fn new(delegate_count: usize, policy: ReducePolicy) -> Self {
        Self {
            delegates: vec![Expect::Greeting; delegate_count],
            done: false,
            awaiting_auth_response: false,
            auth_response: false,
            error_reply: None,
            policy,
        }
    }

    /// Is the session over? True once the client has issued QUIT.
    pub fn done(&self) -> bool {
        self.done
    }

    /// True iff some delegate still owes reply packets.
    pub fn expects_replies(&self) -> bool {
        !self.done && self.delegates.iter().any(|state| !state.settled())
    }

    /// True iff the proxy is ready for a new client command: not done, and at
    /// least one delegate has nothing outstanding.
    pub fn expects_commands(&self) -> bool {
        !self.done && self.delegates.iter().any(|state| state.settled())
    }

    /// Did any delegate answer the current round with an ERR packet?
    pub fn got_error(&self) -> bool {
        self.delegates
            .iter()
            .any(|state| *state == Expect::Errored)
    }

    /// Owned copy of the most recently observed ERR packet this session, if
    /// any. The slot holds one packet and a later error overwrites it.
    pub fn error_packet(&self) -> Option<Packet> {
        self.error_reply.clone()
    }

    /// Read-only view of one delegate's current expectation.
    pub fn expectation(&self, id: DelegateId) -> Expect {
        self.delegates[id]
    }

    pub fn disposition(&self, id: DelegateId) -> Disposition {
        if self.delegates[id].settled() {
            Disposition::Skip
        } else {
            Disposition::Use
        }
    }

    /// Note the receipt of a client command and program the per-delegate
    /// expectations for the round it opens.
    pub fn classify(&mut self, command: &Packet) -> CommandKind {
        self.auth_response = false;

        // Default: a single OK/ERR/result-set response, no row data.
        for state in &mut self.delegates {
            *state = Expect::Simple {
                expecting_rows: false,
            };
        }

        if self.awaiting_auth_response {
            // The handshake response carries no command byte; it is consumed
            // here and armed for the per-delegate schema rewrite.
            self.awaiting_auth_response = false;
            self.auth_response = true;
            debug!("client sent its handshake response");
            return CommandKind::Other;
        }

        let command_byte = command.first_payload_byte();
        trace!(?command_byte, "classifying command");

        match command_byte.and_then(CommandByte::from_u8) {
            Some(CommandByte::Quit) => {
                // Delegates quietly drop our connection; nothing to wait for.
                for state in &mut self.delegates {
                    *state = Expect::Idle;
                }
                self.done = true;
                CommandKind::Other
            }
            Some(CommandByte::Query) => {
                for state in &mut self.delegates {
                    *state = Expect::Simple {
                        expecting_rows: true,
                    };
                }
                CommandKind::Sql
            }
            Some(CommandByte::FieldList) => CommandKind::TableMeta,
            _ => CommandKind::Unsupported,
        }
    }

    /// Note that the command went out. Delegates the selector skipped owe no
    /// reply this round.
    pub fn command_sent<F>(&mut self, selector: F)
    where
        F: Fn(DelegateId) -> Disposition,
    {
        for (id, state) in self.delegates.iter_mut().enumerate() {
            if selector(id) == Disposition::Skip {
                *state = Expect::Idle;
            }
        }
    }

    /// Advance delegate `id`'s reply state machine on one received packet.
    pub fn reply(&mut self, id: DelegateId, reply: &Packet) {
        let payload = reply.payload();
        let state = self.delegates[id];

        if state.settled() {
            debug!(delegate = id, "dropping a packet nobody was waiting for");
            return;
        }

        // ERR short-circuits from any live state.
        if response::is_err(payload) {
            match ErrPayload::try_from(ErrPayloadBytes(payload)) {
                Ok(err) => info!(delegate = id, %err, "delegate replied with an error"),
                Err(_) => info!(delegate = id, "delegate replied with an unparseable ERR packet"),
            }
            self.delegates[id] = Expect::Errored;
            self.error_reply = Some(reply.clone());
            return;
        }

        self.delegates[id] = match state {
            Expect::Greeting => {
                // The very next client packet is the handshake response, not
                // a normal command.
                self.awaiting_auth_response = true;
                debug!(delegate = id, "greeting -> idle");
                Expect::Idle
            }
            Expect::Simple { expecting_rows } => {
                if response::is_ok(payload) {
                    debug!(delegate = id, "simple -> idle");
                    Expect::Idle
                } else {
                    if let Ok((columns, _)) = read_int_lenenc(payload) {
                        debug!(delegate = id, columns, "simple -> fields");
                    }
                    Expect::TableFields { expecting_rows }
                }
            }
            Expect::TableFields { expecting_rows } => {
                if response::is_eof(payload) {
                    if expecting_rows {
                        debug!(delegate = id, "fields -> rows");
                        Expect::TableRows
                    } else {
                        debug!(delegate = id, "fields -> idle");
                        Expect::Idle
                    }
                } else {
                    trace!(delegate = id, "field definition");
                    Expect::TableFields { expecting_rows }
                }
            }
            Expect::TableRows => {
                if response::is_eof(payload) {
                    if let Ok(eof) = read_eof_payload(payload) {
                        debug!(
                            delegate = id,
                            warnings = eof.warnings(),
                            status = ?eof.status_flags(),
                            "rows -> idle"
                        );
                    } else {
                        debug!(delegate = id, "rows -> idle");
                    }
                    Expect::Idle
                } else {
                    trace!(delegate = id, "row");
                    Expect::TableRows
                }
            }
            // Settled states returned early above.
            Expect::Idle | Expect::Errored => state,
        };
    }

    /// Collapse one round of per-delegate replies into the single packet the
    /// client sees, according to the configured policy.
    pub fn reduce(&self, replies: &ReplySet) -> Result<Packet> {
        match self.policy {
            ReducePolicy::FirstReply => self.first_reply(replies),
            ReducePolicy::ErrorIfAny => {
                if self.got_error() {
                    self.error_packet().ok_or_else(|| {
                        Error::Bug(eyre!("delegate errored but no error packet was captured"))
                    })
                } else {
                    self.first_reply(replies)
                }
            }
            ReducePolicy::RequireAllEqual => {
                let mut gathered = replies.iter();
                let (first_id, first) = gathered
                    .next()
                    .ok_or_else(|| Error::Bug(eyre!("reducing an empty reply set")))?;
                for (id, reply) in gathered {
                    if reply.payload() != first.payload() {
                        return Err(Error::RepliesDiverged(format!(
                            "delegate {} disagrees with delegate {}",
                            id, first_id
                        )));
                    }
                }
                Ok(first.clone())
            }
        }
    }

    fn first_reply(&self, replies: &ReplySet) -> Result<Packet> {
        replies
            .iter()
            .next()
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| Error::Bug(eyre!("reducing an empty reply set")))
    }

    /// Rewrite a command for one delegate.
    ///
    /// Ordinary commands are forwarded verbatim. The handshake response gets
    /// this delegate's schema name substituted for whatever database the
    /// client asked for, and its length header recomputed. The offsets assume
    /// the fixed 32-byte prefix of the handshake response with an empty
    /// auth-response field (length byte 0), as sent by clients the proxy
    /// supports.
    pub fn rewrite_for(&self, command: &Packet, schema: &str) -> Result<Packet> {
        if !self.auth_response {
            return Ok(command.clone());
        }

        // Username starts at absolute offset 36: 4-byte packet header plus
        // the 32-byte fixed prefix (capabilities, max packet size, charset,
        // reserved filler).
        const USERNAME_OFFSET: usize = 36;

        let bytes = command.as_bytes();
        if bytes.len() <= USERNAME_OFFSET {
            return Err(Error::InvalidPacket);
        }
        let (username, _) =
            read_string_null(&bytes[USERNAME_OFFSET..]).map_err(|_| Error::InvalidPacket)?;

        // Skip the username, its terminator, and the auth-response-length
        // byte; that lands on the database-name field.
        let schema_offset = USERNAME_OFFSET + username.len() + 2;
        if schema_offset > bytes.len() {
            return Err(Error::InvalidPacket);
        }

        let mut out = Vec::with_capacity(schema_offset + schema.len() + 1);
        out.extend_from_slice(&bytes[..schema_offset]);
        write_string_null(&mut out, schema);

        let payload_length = out.len() - HEADER_SIZE;
        PacketHeader::mut_from_bytes(&mut out[..HEADER_SIZE])?
            .encode_in_place(payload_length, command.sequence_id());

        trace!(schema, "rewrote handshake response");
        Packet::from_bytes(out)
    }
}

fn text_after_command_byte(command: &Packet) -> &[u8] {
    command.payload().get(1..).unwrap_or_default()
}

/// The SQL text of a COM_QUERY packet: everything after the command byte.
pub fn sql_text(command: &Packet) -> Cow<'_, str> {
    let body = text_after_command_byte(command);
    match simdutf8::basic::from_utf8(body) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => String::from_utf8_lossy(body),
    }
}

/// The table name of a COM_FIELD_LIST packet. Same position as the SQL text,
/// but null-terminated on the wire.
pub fn table_name(command: &Packet) -> Cow<'_, str> {
    let body = text_after_command_byte(command);
    let body = match body.iter().position(|&byte| byte == 0) {
        Some(end) => &body[..end],
        None => body,
    };
    match simdutf8::basic::from_utf8(body) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => String::from_utf8_lossy(body),
    }
}
