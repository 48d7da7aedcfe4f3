//! Admin API
//!
//! Provider CRUD, audit log queries and usage statistics. Everything here
//! sits behind the admin bearer token.

pub mod logs;
pub mod providers;
pub mod stats;
