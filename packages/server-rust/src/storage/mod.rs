//! Storage backends for the querier traits in [`crate::traits`].
//!
//! Only the in-memory backend ships here; SQL-backed queriers live outside
//! this crate and plug in through the same traits.

pub mod memory;

pub use memory::MemoryStore;
