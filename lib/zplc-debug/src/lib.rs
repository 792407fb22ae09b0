//! Line-delimited JSON debug channel for the ZPLC execution core.
//!
//! One frame per line, flushed as it's written, so a consumer can tail the
//! channel with nothing fancier than a pipe. [`DebugChannel`] implements
//! [`zplc_abi::Observer`] and is handed straight to a running scheduler;
//! the command surface in [`commands`] lets an external tool switch modes,
//! manage watched addresses, and reset a stuck task without restarting
//! anything.

mod channel;
mod commands;
mod frame;

pub use channel::{DebugChannel, DebugChannelHandle};
pub use commands::{CommandTarget, DebugCommand};
pub use frame::{DebugFrame, Envelope};
