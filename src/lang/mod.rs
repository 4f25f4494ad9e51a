//! # Cilly Abstract Syntax Tree and runtime values
//!
//! The AST is produced by the parser and consumed by the bytecode compiler
//! (or any other tree consumer, such as a transpiler). Runtime values are
//! what the VM keeps on its operand stack and in its scope frames.
//!
//! ## Documentation conventions
//!
//! - Every `Expr` pushes exactly one value when compiled.
//! - Every `Stmt` leaves the operand stack as it found it.

pub mod node;
pub mod program;
pub mod value;
