pub mod code;
pub mod compiler;
pub mod exec;

pub use code::{Code, Opcode};
pub use compiler::compile;
pub use exec::{exec, Frame, Vm};
