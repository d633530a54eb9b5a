//! Metadata store backends.

pub mod memory;
pub mod sqlite;
pub mod store;
