//! The per-client conversation loop.
//!
//! One session alternates two phases until the client quits: read commands
//! and fan them out while any delegate is idle, then gather and reduce
//! replies while any delegate owes one. Everything is synchronous and
//! single-threaded within the session; the phases never interleave.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::constant::CommandByte;
use crate::delegate::DelegatePool;
use crate::driver::{CommandKind, Driver, ReducePolicy, sql_text, table_name};
use crate::error::Result;
use crate::mapping::{AllDelegates, DelegateSelector, Passthrough, QueryMapper};
use crate::protocol::packet::{Packet, read_packet, write_packet};
use crate::protocol::primitive::write_int_1;

/// Runs the conversation between one client and the delegate pool.
pub struct Session<M = Passthrough, D = AllDelegates> {
    policy: ReducePolicy,
    mapper: M,
    selector: D,
}

impl Session {
    /// A plain fan-out session: every delegate, queries untouched.
    pub fn new(policy: ReducePolicy) -> Self {
        Self::with_hooks(policy, Passthrough, AllDelegates)
    }
}

impl<M: QueryMapper, D: DelegateSelector> Session<M, D> {
    pub fn with_hooks(policy: ReducePolicy, mapper: M, selector: D) -> Self {
        Self {
            policy,
            mapper,
            selector,
        }
    }

    /// Converse until the client quits or goes away. The pool must already be
    /// connected; it is disconnected on every exit path.
    pub fn run<C, S>(&mut self, client: &mut C, pool: &mut DelegatePool<S>) -> Result<()>
    where
        C: Read + Write,
        S: Read + Write,
    {
        let result = self.converse(client, pool);
        pool.disconnect();
        result
    }

    fn converse<C, S>(&mut self, client: &mut C, pool: &mut DelegatePool<S>) -> Result<()>
    where
        C: Read + Write,
        S: Read + Write,
    {
        let mut driver = Driver::new(pool.len(), self.policy);

        while !driver.done() {
            // Read commands and delegate them.
            while driver.expects_commands() {
                debug!("waiting for next command");
                let command = match read_packet(client) {
                    Ok(command) => command,
                    Err(err) if err.client_went_away() => {
                        debug!("client went away");
                        return Ok(());
                    }
                    Err(err) => {
                        error!(%err, "error reading command");
                        return Err(err);
                    }
                };
                let command = self.inspect(&mut driver, command);
                pool.broadcast(&mut driver, &self.selector, &command)?;
            }

            // Read replies from delegates, reduce and return them.
            while driver.expects_replies() {
                let replies = pool.gather(&mut driver)?;
                let reply = driver.reduce(&replies)?;
                if let Err(err) = write_packet(client, &reply) {
                    error!(%err, "error sending reply");
                    return Err(err);
                }
            }

            debug!("done with this conversation round");
        }

        Ok(())
    }

    /// Classify one command and run it through the mapping seam. A query the
    /// mapper rewrites is re-framed under the original sequence id.
    fn inspect(&mut self, driver: &mut Driver, command: Packet) -> Packet {
        match driver.classify(&command) {
            CommandKind::Sql => {
                let sql = sql_text(&command);
                debug!(%sql, "query");
                if self.mapper.requires_mapping(&sql) {
                    if let Some(rewritten) = self.mapper.rewrite(&sql) {
                        let mut payload = Vec::with_capacity(1 + rewritten.len());
                        write_int_1(&mut payload, CommandByte::Query as u8);
                        payload.extend_from_slice(rewritten.as_bytes());
                        return Packet::from_payload(command.sequence_id(), &payload);
                    }
                }
                command
            }
            CommandKind::TableMeta => {
                debug!(table = %table_name(&command), "field list");
                command
            }
            CommandKind::Other => command,
            CommandKind::Unsupported => {
                debug!(
                    command_byte = ?command.first_payload_byte(),
                    "forwarding unsupported command"
                );
                command
            }
        }
    }
}
