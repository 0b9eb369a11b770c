#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod asynch;
pub mod blocking;
pub mod command;
pub mod config;
pub mod context;
pub mod datapack;
pub mod error;
pub mod framer;
pub mod module_timing;
pub mod parser;
pub mod registry;
pub mod service;
pub mod tokenizer;
pub mod transaction;

#[cfg(test)]
mod test_helpers;

pub use config::{ModemConfig, NoPin, Settings};
pub use datapack::PackBuf;
pub use error::{Error, GenericError, UrcStatus};
pub use registry::Handle;
pub use service::{ServiceStatus, Sid};
pub use transaction::{Engine, UrcHandler};
