//! Route handlers for the publication surface
//!
//! - [`collections`] - availability and manifests
//! - [`system`] - health

mod collections;
mod system;

pub use collections::*;
pub use system::*;
