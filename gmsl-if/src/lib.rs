#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod err;
pub mod reg;
pub mod transport;

pub use err::TransportError;
pub use reg::{RegPath, RegWidth, SlaveAddr};
pub use transport::TransportPort;
