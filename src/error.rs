use thiserror::Error;

pub use color_eyre::eyre::eyre;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed packet")]
    InvalidPacket,

    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Bad config: {0}")]
    BadConfig(String),

    #[error("Delegate replies diverged: {0}")]
    RepliesDiverged(String),

    #[error("A bug in fanout-mysql: {0}")]
    Bug(color_eyre::Report),
}

impl Error {
    /// A closed or reset client connection is a normal way for a session to
    /// end; it is torn down without an error log.
    pub fn client_went_away(&self) -> bool {
        match self {
            Self::UnexpectedEof => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl<Src, Dst: ?Sized> From<zerocopy::CastError<Src, Dst>> for Error {
    fn from(err: zerocopy::CastError<Src, Dst>) -> Self {
        Self::Bug(color_eyre::eyre::eyre!("{:#?}", err))
    }
}
