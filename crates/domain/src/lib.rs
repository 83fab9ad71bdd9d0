//! Shared types for the Hookline workspace: configuration schema, the
//! common error type, structured trace events, validated user ids, and the
//! per-user record model persisted by `hl-store`.

pub mod config;
pub mod error;
pub mod model;
pub mod trace;
pub mod user_id;

pub use error::{Error, Result};
pub use user_id::UserId;
