//! Trait boundaries of the engine: callers drive it through
//! [`ExecutionApi`]; it drives a [`StateBackend`] and an [`AccessList`].

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
