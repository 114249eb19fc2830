//! Workspace placeholder crate.
//!
//! Exposes the `desktop-shims` feature so host applications can depend on
//! `ampsync-workspace` and get the sync core wired with the desktop bridges.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
