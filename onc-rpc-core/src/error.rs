use std::io;

use thiserror::Error;

use crate::{messages::AuthStat, xdr};

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error, {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode or decode xdr, {0}")]
    Xdr(#[from] xdr::Error),
    #[error("record of {size} bytes exceeds the limit of {limit} bytes")]
    RecordTooLarge { size: usize, limit: usize },
    /// The stream failed inside a record and is no longer at a record
    /// boundary.
    #[error("connection lost inside a record, {0}")]
    Broken(io::Error),
    #[error("connection closed by the peer")]
    Closed,
    #[error("reply xid {got} does not match call xid {expected}")]
    XidMismatch { expected: u32, got: u32 },
    #[error("expected a reply message, got a call")]
    UnexpectedMessage,
    #[error("call denied, server speaks rpc versions {low}..={high}")]
    RpcMismatch { low: u32, high: u32 },
    #[error("call denied, authentication failed: {0:?}")]
    AuthError(AuthStat),
    #[error("program unavailable on the server")]
    ProgUnavail,
    #[error("program version mismatch, server supports {low}..={high}")]
    ProgMismatch { low: u32, high: u32 },
    #[error("procedure unavailable on the server")]
    ProcUnavail,
    #[error("server could not decode the arguments")]
    GarbageArgs,
    #[error("server failed to run the procedure")]
    SystemErr,
    #[error("union arm of {needed} bytes does not fit a buffer of {available} bytes")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("program {program} version {version} is not registered with rpcbind")]
    NotRegistered { program: u32, version: u32 },
    #[error("invalid universal address {0:?}")]
    InvalidAddress(String),
}

impl Error {
    /// A read that timed out before any byte of the next record arrived.
    /// The connection is still usable.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Io(err)
                if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}
