use gmsl_if::{SlaveAddr, TransportError};

use crate::{ChannelMask, LinkState};

pub type Result<T = ()> = core::result::Result<T, BringupError>;

/// 寄存器序列执行失败：失败步骤的下标和底层总线错误
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("step {index} failed: {source}")]
pub struct SequenceError {
    pub index: usize,
    #[source]
    pub source: TransportError,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BringupError {
    /// `found` 为 `None` 表示三次都没有读到任何值
    #[error("Deserializer ID mismatch: expected {expected:#04x}, found {found:?}")]
    IdMismatch { expected: u8, found: Option<u8> },
    #[error("No camera link detected")]
    NoLinkDetected,
    #[error("Camera links are not locked, status {status:?}")]
    NotLocked { status: Option<u8> },
    #[error("Serializer on channel {channel} is not responding")]
    NotResponding { channel: u8 },
    #[error("Channel {channel} did not take address {addr}")]
    AddressConflict { channel: u8, addr: SlaveAddr },
    #[error("Unsupported link topology {mask:?}")]
    InvalidTopology { mask: ChannelMask },
    #[error("Channel {channel} is not selected on the deserializer")]
    ChannelNotSelected { channel: u8 },
    #[error("Deadline exceeded in state {state:?}")]
    DeadlineExceeded { state: LinkState },
    #[error("Link not initialized")]
    NotInitialized,
    #[error("Unsupported media bus code {code:#06x}")]
    UnsupportedFormat { code: u32 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
