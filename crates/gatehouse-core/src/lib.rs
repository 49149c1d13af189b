//! Core types and trait definitions for the Gatehouse presence service.
//!
//! No HTTP, no database. Every other crate in the workspace depends on this
//! one.

pub mod error;
pub mod event;
pub mod identity;
pub mod presence;
pub mod store;
pub mod tag;

pub use error::{Error, Result};
