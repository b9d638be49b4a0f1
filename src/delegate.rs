//! The delegate pool: one backend connection per configured database, the
//! fan-out write path, and the one-packet-per-delegate gather sweep.

use std::io::{Read, Write};

use tracing::{debug, trace};

use crate::driver::{DelegateId, Disposition, Driver};
use crate::error::{Error, Result, eyre};
use crate::mapping::DelegateSelector;
use crate::opts::DelegateOpts;
use crate::protocol::packet::{Packet, read_packet, write_packet};
use crate::stream::Stream;

/// One backend database: its options plus, while connected, a live stream.
pub struct Delegate<S> {
    opts: DelegateOpts,
    stream: Option<S>,
}

impl<S> Delegate<S> {
    fn stream_mut(&mut self, id: DelegateId) -> Result<&mut S> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Bug(eyre!("delegate {} has no live connection", id)))
    }
}

/// One round of gathered replies, one optional packet per delegate id.
#[derive(Debug)]
pub struct ReplySet {
    replies: Vec<Option<Packet>>,
}

impl ReplySet {
    pub fn new(delegate_count: usize) -> Self {
        Self {
            replies: vec![None; delegate_count],
        }
    }

    pub fn insert(&mut self, id: DelegateId, reply: Packet) {
        self.replies[id] = Some(reply);
    }

    pub fn get(&self, id: DelegateId) -> Option<&Packet> {
        self.replies.get(id).and_then(Option::as_ref)
    }

    /// Present replies in delegate-id order.
    pub fn iter(&self) -> impl Iterator<Item = (DelegateId, &Packet)> {
        self.replies
            .iter()
            .enumerate()
            .filter_map(|(id, reply)| reply.as_ref().map(|packet| (id, packet)))
    }

    pub fn is_empty(&self) -> bool {
        self.replies.iter().all(Option::is_none)
    }
}

/// The set of delegates for one client session.
///
/// Generic over the stream type so sessions can be driven against in-memory
/// or loopback streams; the daemon uses [`Stream`].
pub struct DelegatePool<S> {
    delegates: Vec<Delegate<S>>,
}

impl DelegatePool<Stream> {
    pub fn new(opts: Vec<DelegateOpts>) -> Self {
        Self {
            delegates: opts
                .into_iter()
                .map(|opts| Delegate { opts, stream: None })
                .collect(),
        }
    }

    /// Establish network-level connections to every delegate.
    pub fn connect(&mut self) -> Result<()> {
        for (id, delegate) in self.delegates.iter_mut().enumerate() {
            let stream = Stream::connect(&delegate.opts)?;
            debug!(delegate = id, address = %delegate.opts.address(), "connected");
            delegate.stream = Some(stream);
        }
        Ok(())
    }
}

impl<S: Read + Write> DelegatePool<S> {
    /// Assemble a pool over already-established streams.
    pub fn from_streams(delegates: Vec<(DelegateOpts, S)>) -> Self {
        Self {
            delegates: delegates
                .into_iter()
                .map(|(opts, stream)| Delegate {
                    opts,
                    stream: Some(stream),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    /// Drop every backend connection. Closing the socket is the whole of the
    /// MySQL-level goodbye; QUIT forwarding already happened if the client
    /// sent one.
    pub fn disconnect(&mut self) {
        for delegate in &mut self.delegates {
            delegate.stream = None;
        }
        debug!("disconnected all delegates");
    }

    /// Fan one command out to every delegate the selector keeps, rewriting it
    /// per delegate. Afterwards the driver stops expecting replies from the
    /// skipped ones.
    pub fn broadcast(
        &mut self,
        driver: &mut Driver,
        selector: &dyn DelegateSelector,
        command: &Packet,
    ) -> Result<()> {
        for (id, delegate) in self.delegates.iter_mut().enumerate() {
            if selector.select(id) == Disposition::Skip {
                trace!(delegate = id, "selector skipped delegate");
                continue;
            }
            let out = driver.rewrite_for(command, &delegate.opts.schema)?;
            write_packet(delegate.stream_mut(id)?, &out)?;
            trace!(delegate = id, size = out.len(), "delegated command");
        }
        driver.command_sent(|id| selector.select(id));
        Ok(())
    }

    /// One sweep in delegate-id order: read exactly one packet from every
    /// delegate that still owes replies, advance the driver's state machine
    /// with it, and collect it into the reply set.
    pub fn gather(&mut self, driver: &mut Driver) -> Result<ReplySet> {
        let mut replies = ReplySet::new(self.delegates.len());
        for (id, delegate) in self.delegates.iter_mut().enumerate() {
            if driver.disposition(id) == Disposition::Skip {
                continue;
            }
            let reply = read_packet(delegate.stream_mut(id)?)?;
            driver.reply(id, &reply);
            replies.insert(id, reply);
        }
        Ok(replies)
    }
}
