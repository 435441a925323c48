//! In-memory implementations of the state and access-list ports.

pub mod access_list;
pub mod state_adapter;

pub use access_list::*;
pub use state_adapter::*;
