//! Session Registry for Sotto
//!
//! Single source of truth for which relay sessions exist and who may act on
//! them. Owns creation, admission, expiry and teardown; no other component
//! mutates session state.

mod error;
mod registry;

pub use error::*;
pub use registry::*;
