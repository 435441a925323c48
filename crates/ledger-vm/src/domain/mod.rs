//! Pure types and functions of the engine: no I/O, no async, no locks.

pub mod codec;
pub mod entities;
pub mod invariants;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use invariants::*;
pub use services::*;
pub use value_objects::*;
