//! Error types for bipio
//!
//! `WouldBlock` is deliberately absent: a transfer that would block is an
//! internal outcome of the pump and never reaches a caller.

use core::fmt;

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Result type for socket and engine setup
pub type SetupResult<T> = Result<T, SetupError>;

/// Operation a stream was asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// Errors surfaced by stream read/write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Stream lacks the capability for this operation
    Unsupported(Operation),

    /// Peer closed the stream cleanly
    EndOfStream,

    /// OS-level failure stored on the stream (raw OS error code)
    Io(i32),

    /// Handle has already been released by `close()`
    Closed,
}

impl StreamError {
    /// Raw OS error code, if this error carries one
    pub fn os_code(&self) -> Option<i32> {
        match self {
            StreamError::Io(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Unsupported(Operation::Read) => {
                write!(f, "stream does not support reading")
            }
            StreamError::Unsupported(Operation::Write) => {
                write!(f, "writing is not supported for this stream")
            }
            StreamError::EndOfStream => write!(f, "end of stream"),
            StreamError::Io(code) => write!(f, "{}", os_message(*code)),
            StreamError::Closed => write!(f, "stream is closed"),
        }
    }
}

impl std::error::Error for StreamError {}

/// Errors from socket creation, engine startup and configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// socket() failed
    Socket(i32),
    /// Switching a descriptor to non-blocking mode failed
    Nonblocking(i32),
    /// Listen address is not a dotted-quad IPv4 address
    InvalidAddress(String),
    /// bind() failed
    Bind(i32),
    /// listen() failed
    Listen(i32),
    /// accept() failed with something other than "nothing pending"
    Accept(i32),
    /// Socket handle has already been released
    Closed,
    /// Wake channel could not be allocated
    WakeChannel(i32),
    /// Reactor thread could not be spawned
    ReactorSpawn(String),
    /// Configuration rejected by validation
    Config(ConfigError),
}

impl SetupError {
    /// Raw OS error code, if this error carries one
    pub fn os_code(&self) -> Option<i32> {
        match self {
            SetupError::Socket(code)
            | SetupError::Nonblocking(code)
            | SetupError::Bind(code)
            | SetupError::Listen(code)
            | SetupError::Accept(code)
            | SetupError::WakeChannel(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Socket(code) => write!(f, "socket(): {}", os_message(*code)),
            SetupError::Nonblocking(code) => {
                write!(f, "fcntl(F_SETFL, O_NONBLOCK): {}", os_message(*code))
            }
            SetupError::InvalidAddress(addr) => write!(f, "invalid IPv4 address: {}", addr),
            SetupError::Bind(code) => write!(f, "bind(): {}", os_message(*code)),
            SetupError::Listen(code) => write!(f, "listen(): {}", os_message(*code)),
            SetupError::Accept(code) => write!(f, "accept(): {}", os_message(*code)),
            SetupError::Closed => write!(f, "socket is closed"),
            SetupError::WakeChannel(code) => write!(f, "pipe() failed: {}", os_message(*code)),
            SetupError::ReactorSpawn(msg) => write!(f, "failed to start IO thread: {}", msg),
            SetupError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SetupError {}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        SetupError::Config(e)
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// OS description of a raw error code.
fn os_message(code: i32) -> String {
    std::io::Error::from_raw_os_error(code).to_string()
}
