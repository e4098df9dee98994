use std::io;
use thiserror::Error;

/// Result alias for socket and buffer operations.
pub type NetResult<T> = Result<T, NetError>;

/// Error kinds surfaced by the socket and buffer layers, mapped from OS
/// error codes. Unmapped codes keep the raw errno in
/// [`Unknown`](NetError::Unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NetError {
    /// Operation on a closed descriptor.
    #[error("socket is closed")]
    Closed,
    /// Permission denied.
    #[error("permission denied for socket")]
    Access,
    /// Address or port in use or not available.
    #[error("socket address/port in use or not available")]
    Exists,
    /// Message too long.
    #[error("message too long")]
    Size,
    /// Descriptor exhaustion.
    #[error("no more socket descriptors available")]
    Limit,
    /// Host or address string too long.
    #[error("host or address string too long")]
    Length,
    /// Connection refused or reset.
    #[error("connection refused or reset")]
    Fail,
    /// Address resolution failed.
    #[error("address not found")]
    NotFound,
    /// Deadline elapsed.
    #[error("operation timed out")]
    Timeout,
    /// Non-blocking operation could not proceed.
    #[error("operation would block")]
    WouldBlock,
    /// Interrupted by a signal with auto-resume disabled.
    #[error("interrupted by signal")]
    Signal,
    /// Invalid buffer pointer.
    #[error("invalid pointer")]
    BadPtr,
    /// Invalid argument.
    #[error("invalid argument")]
    Inval,
    /// Invalid operation for the current state.
    #[error("invalid operation for current socket state")]
    InvalOp,
    /// Out of memory for the operation.
    #[error("out of memory for socket operation")]
    Space,
    /// Unmapped OS error; the raw code is preserved.
    #[error("unknown socket error (code {0})")]
    Unknown(i32),
}

impl NetError {
    /// Maps a raw errno value into the taxonomy.
    pub fn from_errno(code: i32) -> NetError {
        match code {
            libc::EACCES | libc::EPERM => NetError::Access,
            libc::EADDRINUSE | libc::EADDRNOTAVAIL => NetError::Exists,
            libc::EMSGSIZE => NetError::Size,
            libc::EMFILE | libc::ENFILE => NetError::Limit,
            libc::ENAMETOOLONG => NetError::Length,
            libc::ECONNREFUSED
            | libc::ECONNRESET
            | libc::ECONNABORTED
            | libc::EPIPE
            | libc::ENETUNREACH
            | libc::EHOSTUNREACH
            | libc::ENETDOWN => NetError::Fail,
            libc::ETIMEDOUT => NetError::Timeout,
            libc::EWOULDBLOCK | libc::EINPROGRESS | libc::EALREADY => NetError::WouldBlock,
            libc::EINTR => NetError::Signal,
            libc::EFAULT => NetError::BadPtr,
            libc::EINVAL => NetError::Inval,
            libc::EOPNOTSUPP | libc::ENOTCONN | libc::EISCONN | libc::EDESTADDRREQ => {
                NetError::InvalOp
            }
            libc::ENOMEM | libc::ENOBUFS => NetError::Space,
            libc::EBADF | libc::ENOTSOCK => NetError::Closed,
            other => NetError::Unknown(other),
        }
    }

    /// Whether retrying later can succeed without other action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NetError::WouldBlock | NetError::Timeout | NetError::Signal
        )
    }

    /// Whether the socket is unusable until closed and reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NetError::Closed | NetError::Fail)
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> NetError {
        if let Some(code) = err.raw_os_error() {
            return NetError::from_errno(code);
        }
        match err.kind() {
            io::ErrorKind::WouldBlock => NetError::WouldBlock,
            io::ErrorKind::TimedOut => NetError::Timeout,
            io::ErrorKind::PermissionDenied => NetError::Access,
            io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => NetError::Exists,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => NetError::Fail,
            io::ErrorKind::NotFound => NetError::NotFound,
            io::ErrorKind::Interrupted => NetError::Signal,
            io::ErrorKind::InvalidInput => NetError::Inval,
            io::ErrorKind::OutOfMemory => NetError::Space,
            io::ErrorKind::NotConnected | io::ErrorKind::Unsupported => NetError::InvalOp,
            _ => NetError::Unknown(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(NetError::from_errno(libc::EACCES), NetError::Access);
        assert_eq!(NetError::from_errno(libc::EADDRINUSE), NetError::Exists);
        assert_eq!(NetError::from_errno(libc::ECONNRESET), NetError::Fail);
        assert_eq!(NetError::from_errno(libc::EWOULDBLOCK), NetError::WouldBlock);
        assert_eq!(NetError::from_errno(libc::EBADF), NetError::Closed);
        assert_eq!(NetError::from_errno(-1), NetError::Unknown(-1));
    }

    #[test]
    fn test_io_error_mapping() {
        let err = io::Error::from_raw_os_error(libc::ETIMEDOUT);
        assert_eq!(NetError::from(err), NetError::Timeout);

        let err = io::Error::new(io::ErrorKind::WouldBlock, "wb");
        assert_eq!(NetError::from(err), NetError::WouldBlock);
    }

    #[test]
    fn test_classification() {
        assert!(NetError::WouldBlock.is_recoverable());
        assert!(!NetError::Fail.is_recoverable());
        assert!(NetError::Closed.is_terminal());
        assert!(!NetError::Timeout.is_terminal());
    }
}
