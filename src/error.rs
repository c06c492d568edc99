//! Library error type

use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to the X server.
///
/// The two conditions the caller is expected to have a policy for are
/// [`Error::NoTrueColorVisual`] (fatal, the screen cannot display direct
/// color) and [`Error::SharedMemoryUnavailable`] (retry with shared memory
/// disabled, see [`crate::Display::set_use_shm`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no truecolor visual available on this screen")]
    NoTrueColorVisual,

    #[error("x server can't attach shared memory")]
    SharedMemoryUnavailable,

    #[error("event code {0} is out of range")]
    InvalidEventCode(i32),

    #[error("unknown window {0:#x}")]
    UnknownWindow(u32),

    #[error("invalid xpm data: {0}")]
    Xpm(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error(transparent)]
    Id(#[from] ReplyOrIdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
