//! Route handlers for the HTTP API.

pub mod health;
pub mod metadata;
pub mod stream;
pub mod tools;
