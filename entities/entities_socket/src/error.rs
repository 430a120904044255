//! Error Module
//!
//! Categorized errors for socket operations. Every variant that originates
//! in the operating system carries the name of the syscall or resolver
//! function that failed, so messages can be correlated with the platform
//! documentation (`connect(2)`, `getaddrinfo`).

use nix::errno::Errno;
use std::io;

/// Reasons a caller-supplied argument was rejected
///
/// These are never retryable: the caller has to fix the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    /// No registered constant matches the given name
    UnknownConstant { kind: &'static str, name: String },
    /// Address bytes are malformed (too short, wrong family, wrong length)
    InvalidAddress(String),
    /// UNIX-domain path does not fit into `sun_path`
    PathTooLong { len: usize, max: usize },
    /// Full-size `sockaddr_un` whose path runs into the end of the buffer
    NotNulTerminated,
    /// String argument contains an interior NUL byte
    NulByte(&'static str),
    /// Integer does not fit the C type it is converted into
    OutOfRange { value: i64, target: &'static str },
    /// Argument has the wrong structure
    InvalidShape(String),
}

/// Resolver-side failure codes
///
/// Kept apart from errno values: resolver failures live in their own code
/// space (`EAI_*`) or have no numeric code at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverCode {
    /// `EAI_*` value returned by `getaddrinfo`/`getnameinfo`
    Gai(i32),
    /// Resolver succeeded but produced no usable host
    HostNotFound,
    /// No service database entry and no literal port fallback
    UnknownService,
    /// Candidates of one address reverse-resolved to different names
    AmbiguousAddress,
}

/// Socket error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// An OS call failed
    Syscall {
        syscall: &'static str,
        errno: i32,
        message: String,
    },
    /// The name service failed
    Resolution {
        function: &'static str,
        code: ResolverCode,
        message: String,
    },
    /// Caller supplied malformed input
    InvalidArgument(ArgumentError),
    /// Non-fatal: wait for readiness and reissue the call
    Retry { syscall: &'static str, errno: i32 },
}

impl SocketError {
    /// Build a syscall error from a raw errno
    pub fn syscall(syscall: &'static str, errno: i32) -> Self {
        SocketError::Syscall {
            syscall,
            errno,
            message: errno_message(errno).to_string(),
        }
    }

    /// Build a syscall error from the calling thread's current errno
    pub fn last_os_error(syscall: &'static str) -> Self {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Self::syscall(syscall, errno)
    }

    /// Translate an `io::Error` returned by a syscall wrapper
    ///
    /// Always produces [`SocketError::Syscall`]; errno values that would
    /// normally signal "try again" are reported as-is.
    pub fn from_io(syscall: &'static str, err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => Self::syscall(syscall, errno),
            None => SocketError::Syscall {
                syscall,
                errno: 0,
                message: err.to_string(),
            },
        }
    }

    /// Translate an `io::Error` from a call that may legitimately ask for a retry
    ///
    /// `EAGAIN`, `EWOULDBLOCK` and `EINPROGRESS` become [`SocketError::Retry`];
    /// everything else is a [`SocketError::Syscall`].
    pub fn from_io_retryable(syscall: &'static str, err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) if is_retry_errno(errno) => SocketError::Retry { syscall, errno },
            _ => Self::from_io(syscall, err),
        }
    }

    /// Build a resolver error
    pub fn resolution(function: &'static str, code: ResolverCode, message: impl Into<String>) -> Self {
        SocketError::Resolution {
            function,
            code,
            message: message.into(),
        }
    }

    /// `true` for the explicit non-fatal outcomes
    pub fn is_retry(&self) -> bool {
        matches!(self, SocketError::Retry { .. })
    }

    /// OS errno, when the error carries one
    pub fn errno(&self) -> Option<i32> {
        match self {
            SocketError::Syscall { errno, .. } | SocketError::Retry { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// Name of the failing syscall or resolver function
    pub fn origin(&self) -> Option<&'static str> {
        match self {
            SocketError::Syscall { syscall, .. } | SocketError::Retry { syscall, .. } => Some(*syscall),
            SocketError::Resolution { function, .. } => Some(*function),
            SocketError::InvalidArgument(_) => None,
        }
    }
}

/// Human-readable description of an errno value
pub fn errno_message(errno: i32) -> &'static str {
    Errno::from_i32(errno).desc()
}

/// errno values that mean "not ready yet" rather than "failed"
pub fn is_retry_errno(errno: i32) -> bool {
    errno == libc::EAGAIN || errno == libc::EWOULDBLOCK || errno == libc::EINPROGRESS
}

impl From<ArgumentError> for SocketError {
    fn from(err: ArgumentError) -> Self {
        SocketError::InvalidArgument(err)
    }
}

impl std::fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgumentError::UnknownConstant { kind, name } => write!(f, "unknown socket {}: {}", kind, name),
            ArgumentError::InvalidAddress(msg) => write!(f, "{}", msg),
            ArgumentError::PathTooLong { len, max } => {
                write!(f, "too long unix socket path ({} bytes given but {} bytes max)", len, max)
            }
            ArgumentError::NotNulTerminated => write!(f, "sockaddr_un.sun_path not NUL terminated"),
            ArgumentError::NulByte(what) => write!(f, "{} contains null byte", what),
            ArgumentError::OutOfRange { value, target } => {
                let direction = if *value > 0 { "big" } else { "small" };
                write!(f, "integer {} too {} to convert into `{}'", value, direction, target)
            }
            ArgumentError::InvalidShape(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ArgumentError {}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketError::Syscall { syscall, message, .. } => write!(f, "{} - {}", message, syscall),
            SocketError::Resolution { function, message, .. } => write!(f, "{}: {}", function, message),
            SocketError::InvalidArgument(err) => write!(f, "{}", err),
            SocketError::Retry { syscall, errno } => {
                write!(f, "{} - {} would block", errno_message(*errno), syscall)
            }
        }
    }
}

impl std::error::Error for SocketError {}
