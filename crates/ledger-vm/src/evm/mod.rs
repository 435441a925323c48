//! # EVM
//!
//! The execution engine: decoding, gas, frame memory and stack, the
//! interpreter loop, and the dispatcher that runs nested frames and
//! precompiles inside state checkpoints.

pub mod dispatcher;
pub mod gas;
pub mod guard;
pub mod interpreter;
pub mod memory;
pub mod opcodes;
pub mod precompiles;
pub mod stack;

pub use dispatcher::{CallDispatcher, FrameOutcome};
pub use gas::{costs, OPCODE_GAS};
pub use guard::ExecutionGuard;
pub use interpreter::Interpreter;
pub use memory::Memory;
pub use opcodes::{decode, Opcode, OPCODE_TABLE};
pub use precompiles::{Precompile, PrecompileOutput, PrecompileRegistry};
pub use stack::Stack;
