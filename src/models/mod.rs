//! Data models for the church site backend.
//!
//! Content records are untyped JSON documents; only accounts and sessions are typed.

mod account;
mod content;

pub use account::*;
pub use content::*;
