//! Durable per-user records for Hookline.
//!
//! Every user owns one JSON document at `<users_dir>/<user_id>/data.json`.
//! All mutation goes through [`UserStore`], which serializes access per user
//! with a lazily created read/write lock so compound read-modify-write
//! sequences never interleave.

pub mod locks;
pub mod store;

pub use locks::UserLockMap;
pub use store::{StatsSnapshot, UserStore, WebhookSelector};
