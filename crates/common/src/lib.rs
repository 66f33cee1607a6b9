//! Shared types for the FreightMaster workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
