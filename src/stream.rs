use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

use crate::error::Result;
use crate::opts::DelegateOpts;

/// A connected byte stream to a client or a delegate.
///
/// Reads go through a [`BufReader`]; the codec issues many short reads (a
/// 4-byte header, then the payload) and the buffer absorbs them. Writes go
/// straight to the socket.
pub enum Stream {
    Tcp(BufReader<TcpStream>),
    Unix(BufReader<UnixStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    /// Connect to a delegate: its Unix socket when configured, TCP otherwise.
    pub fn connect(opts: &DelegateOpts) -> Result<Self> {
        if let Some(path) = &opts.socket {
            let stream = UnixStream::connect(path)?;
            Ok(Self::unix(stream))
        } else {
            let stream = TcpStream::connect(opts.address())?;
            stream.set_nodelay(opts.tcp_nodelay)?;
            Ok(Self::tcp(stream))
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(reader) => reader.read(buf),
            Self::Unix(reader) => reader.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(reader) => reader.get_mut().write(buf),
            Self::Unix(reader) => reader.get_mut().write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(reader) => reader.get_mut().flush(),
            Self::Unix(reader) => reader.get_mut().flush(),
        }
    }
}
