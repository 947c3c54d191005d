use alloc::string::String;

use crate::SlaveAddr;

/// Bus-level failure of a single register transaction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No acknowledge from {addr}")]
    Nack { addr: SlaveAddr },
    #[error("Timeout")]
    Timeout,
    #[error("Arbitration lost")]
    ArbitrationLost,
    #[error("Malformed transfer, length {len}")]
    Malformed { len: usize },
    #[error("Other error: {0}")]
    Other(String),
}
