//! Executing compiled programs: the VM, its stacks, and host externals.

pub mod externals;
pub mod runtime_error;
pub mod stack;
pub mod turtle;
pub mod vm_bc;

pub use externals::{External, Externals};
pub use runtime_error::RuntimeError;
pub use stack::{InstrumentedStack, StackStats};
pub use vm_bc::{Vm, VmStats};
