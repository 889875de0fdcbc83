// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Error taxonomy for PolyStore.
//
// `KvError` covers every out-of-band failure a backend, the provider, or a
// bulk handler can report. Per-key conditions ("not found", "buffer too
// small") travel in-band as size sentinels (see `batch`) and do not use this
// type unless they abort the whole call. `ErrorCode` is the stable numeric
// form exchanged on the wire.

use thiserror::Error;

use crate::id::DatabaseId;

/// Result alias used across the PolyStore crates.
pub type KvResult<T> = Result<T, KvError>;

/// Out-of-band errors reported by backends, the provider, and handlers.
#[derive(Debug, Error)]
pub enum KvError {
    /// A buffer could not be allocated or acquired.
    #[error("allocation failure")]
    Allocation,

    /// Malformed or inconsistent arguments (zero-length key in a batch,
    /// size arithmetic mismatch, region too small for the declared count).
    #[error("invalid argument")]
    InvalidArgs,

    /// The request names a database this provider does not host.
    #[error("invalid database id: {0}")]
    InvalidDatabase(DatabaseId),

    /// The requested backend type is not registered.
    #[error("invalid backend type: {0}")]
    InvalidBackend(String),

    /// The configuration document is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The admin token presented does not match the provider's.
    #[error("invalid token")]
    InvalidToken,

    /// The transport failed during a pull, push, or response.
    #[error("transport error: {0}")]
    FromTransport(String),

    /// The mode word carries a bit the target backend does not accept, or
    /// the operation itself is not available on this backend.
    #[error("unsupported operation")]
    OpUnsupported,

    /// The operation is recognized but forbidden (e.g. permission denied by
    /// a disk engine).
    #[error("forbidden operation: {0}")]
    OpForbidden(String),

    /// A key was not found and the failure aborts the whole call.
    #[error("key not found")]
    KeyNotFound,

    /// A caller-provided buffer is too small to hold the whole result.
    #[error("buffer too small")]
    BufferSize,

    /// `NEW_ONLY` put over an existing key.
    #[error("key exists")]
    KeyExists,

    /// The stored data is corrupted.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// An I/O error from a disk engine or the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking wait (watcher or buffer pool) timed out.
    #[error("timeout")]
    Timeout,

    /// The operation was canceled before completion.
    #[error("operation aborted")]
    Aborted,

    /// The target is busy; the client may retry.
    #[error("busy")]
    Busy,

    /// Any failure that does not fit the categories above.
    #[error("{0}")]
    Other(String),
}

impl KvError {
    /// The stable numeric code exchanged on the wire for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            KvError::Allocation => ErrorCode::Allocation,
            KvError::InvalidArgs => ErrorCode::InvalidArgs,
            KvError::InvalidDatabase(_) => ErrorCode::InvalidDatabase,
            KvError::InvalidBackend(_) => ErrorCode::InvalidBackend,
            KvError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            KvError::InvalidToken => ErrorCode::InvalidToken,
            KvError::FromTransport(_) => ErrorCode::FromTransport,
            KvError::OpUnsupported => ErrorCode::OpUnsupported,
            KvError::OpForbidden(_) => ErrorCode::OpForbidden,
            KvError::KeyNotFound => ErrorCode::KeyNotFound,
            KvError::BufferSize => ErrorCode::BufferSize,
            KvError::KeyExists => ErrorCode::KeyExists,
            KvError::Corruption(_) => ErrorCode::Corruption,
            KvError::Io(_) => ErrorCode::Io,
            KvError::Timeout => ErrorCode::Timeout,
            KvError::Aborted => ErrorCode::Aborted,
            KvError::Busy => ErrorCode::Busy,
            KvError::Other(_) => ErrorCode::Other,
        }
    }
}

/// Numeric return codes as exchanged with clients.
///
/// The positions mirror the original wire enumeration and must not be
/// reordered; new codes are appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    Allocation = 1,
    InvalidInstance = 2,
    InvalidArgs = 3,
    InvalidProvider = 4,
    InvalidDatabase = 5,
    InvalidBackend = 6,
    InvalidConfig = 7,
    InvalidToken = 8,
    FromTransport = 9,
    FromRuntime = 10,
    OpUnsupported = 11,
    OpForbidden = 12,
    KeyNotFound = 13,
    BufferSize = 14,
    KeyExists = 15,
    Corruption = 16,
    Io = 17,
    Incomplete = 18,
    Timeout = 19,
    Aborted = 20,
    Busy = 21,
    Expired = 22,
    TryAgain = 23,
    Other = 24,
}

/// The code reported for a whole call, `Success` when `result` is `Ok`.
pub fn code_of<T>(result: &KvResult<T>) -> ErrorCode {
    match result {
        Ok(_) => ErrorCode::Success,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_positions_are_stable() {
        assert_eq!(ErrorCode::Success as u8, 0);
        assert_eq!(ErrorCode::InvalidArgs as u8, 3);
        assert_eq!(ErrorCode::InvalidToken as u8, 8);
        assert_eq!(ErrorCode::FromTransport as u8, 9);
        assert_eq!(ErrorCode::OpUnsupported as u8, 11);
        assert_eq!(ErrorCode::KeyNotFound as u8, 13);
        assert_eq!(ErrorCode::KeyExists as u8, 15);
        assert_eq!(ErrorCode::Timeout as u8, 19);
        assert_eq!(ErrorCode::Other as u8, 24);
    }

    #[test]
    fn test_error_to_code() {
        assert_eq!(KvError::InvalidArgs.code(), ErrorCode::InvalidArgs);
        assert_eq!(KvError::Timeout.code(), ErrorCode::Timeout);
        assert_eq!(
            KvError::InvalidBackend("bogus".into()).code(),
            ErrorCode::InvalidBackend
        );
        let io = KvError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.code(), ErrorCode::Io);
    }

    #[test]
    fn test_code_of_result() {
        assert_eq!(code_of(&KvResult::Ok(())), ErrorCode::Success);
        assert_eq!(
            code_of::<()>(&Err(KvError::KeyExists)),
            ErrorCode::KeyExists
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(KvError::KeyExists.to_string(), "key exists");
        assert!(KvError::InvalidConfig("not an object".into())
            .to_string()
            .contains("not an object"));
    }
}
