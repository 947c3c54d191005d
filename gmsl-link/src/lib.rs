#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
extern crate log;

pub use gmsl_if::*;

pub mod bus;
pub mod channel;
pub mod config;
pub mod controller;
pub mod device;
pub mod err;
pub mod exec;
#[cfg(feature = "embedded-hal")]
pub mod hal;
pub mod mask;
pub mod op;
pub mod order;
pub mod profile;

#[cfg(test)]
pub(crate) mod testing;

pub use bus::SharedBus;
pub use channel::{BusSelection, ChannelBringup, ChannelOutcome, ChannelSlot};
pub use config::{BringupConfig, TestPatternMode};
pub use controller::{InitStatus, LinkBringupController, LinkState};
pub use device::{
    BusConfig, DeviceContext, FormatRequest, FormatWhich, FrameFormat, MediaBusFormat,
    TestPatternState,
};
pub use err::{BringupError, Result, SequenceError};
pub use exec::SequenceExecutor;
pub use mask::ChannelMask;
pub use op::RegisterOp;
pub use order::{CsiLanes, LaneSettings, LinkConfigurator, OutputOrderConfig};
pub use profile::{AnyChip, ChipProfile, Max9286, Max9288};
