pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod image;
pub mod ir;
pub mod op;
pub mod verify;

pub use compile::{Compiler, ExternalSig};
pub use compile_error::CompileError;
pub use ir::{Constant, FunctionDesc, ProgramBc, ScopeKind, ScopeLayout};
pub use op::Opcode;
