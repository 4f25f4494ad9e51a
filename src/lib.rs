//! # Cilly
//!
//! A small dynamically typed scripting language compiled to a flat `u32`
//! bytecode stream and executed on a stack VM.
//!
//! ```text
//! source ─ Lexer ─▶ tokens ─ Parser ─▶ Program ─ Compiler ─▶ ProgramBc ─ Vm ─▶ output
//!                                                     │
//!                                                     └─ image::save / load (.cbc)
//! ```
//!
//! [`pipeline`] strings the stages together; each stage is also usable on
//! its own.

pub mod bytecode;
pub mod config;
pub mod frontend;
pub mod lang;
pub mod pipeline;
pub mod runtime;

pub use config::VmConfig;
pub use pipeline::Error;
pub use runtime::{Externals, Vm, VmStats};
