use crate::bytecode::op::Opcode;

/// A failure during execution. Every variant carries the address of the
/// instruction that failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("at {pc}: unknown opcode {code}")]
    UnknownOpcode { pc: usize, code: u32 },

    #[error("at {pc}: truncated {op} instruction")]
    TruncatedInstruction { pc: usize, op: Opcode },

    #[error("at {pc}: no variable at depth {depth}, slot {slot}")]
    ScopeOutOfRange { pc: usize, depth: usize, slot: usize },

    #[error("at {pc}: no scope to leave")]
    NoScope { pc: usize },

    #[error("at {pc}: stack underflow in {op}")]
    StackUnderflow { pc: usize, op: Opcode },

    #[error("at {pc}: constant {index} does not exist")]
    BadConstant { pc: usize, index: usize },

    #[error("at {pc}: return with an empty call stack")]
    EmptyCallStack { pc: usize },

    #[error("at {pc}: unknown function id {id}")]
    UnknownFunction { pc: usize, id: usize },

    #[error("at {pc}: a value of type {type_name} is not callable")]
    NotCallable { pc: usize, type_name: &'static str },

    #[error("at {pc}: '{name}' expects {expected} argument(s), got {found}")]
    ArityMismatch {
        pc: usize,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("at {pc}: unknown external '{name}'")]
    UnknownExternal { pc: usize, name: String },

    #[error("at {pc}: external '{name}' failed: {message}")]
    External {
        pc: usize,
        name: String,
        message: String,
    },

    #[error("at {pc}: division by zero")]
    DivisionByZero { pc: usize },

    #[error("at {pc}: integer overflow in '{symbol}'")]
    Arithmetic { pc: usize, symbol: &'static str },

    #[error("at {pc}: type error: {message}")]
    Type { pc: usize, message: String },

    #[error("at {pc}: {what} limit exceeded ({limit})")]
    LimitExceeded {
        pc: usize,
        what: &'static str,
        limit: usize,
    },

    #[error("at {pc}: cannot write output: {message}")]
    Output { pc: usize, message: String },
}

impl RuntimeError {
    /// Address of the failing instruction.
    pub fn pc(&self) -> usize {
        use RuntimeError::*;
        match self {
            UnknownOpcode { pc, .. }
            | TruncatedInstruction { pc, .. }
            | ScopeOutOfRange { pc, .. }
            | NoScope { pc }
            | StackUnderflow { pc, .. }
            | BadConstant { pc, .. }
            | EmptyCallStack { pc }
            | UnknownFunction { pc, .. }
            | NotCallable { pc, .. }
            | ArityMismatch { pc, .. }
            | UnknownExternal { pc, .. }
            | External { pc, .. }
            | DivisionByZero { pc }
            | Arithmetic { pc, .. }
            | Type { pc, .. }
            | LimitExceeded { pc, .. }
            | Output { pc, .. } => *pc,
        }
    }

    pub(crate) fn type_error(pc: usize, message: impl Into<String>) -> Self {
        RuntimeError::Type {
            pc,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_pc() {
        let e = RuntimeError::DivisionByZero { pc: 12 };
        assert_eq!(e.to_string(), "at 12: division by zero");
        assert_eq!(e.pc(), 12);
    }

    #[test]
    fn test_type_error_helper() {
        let e = RuntimeError::type_error(3, "cannot negate string");
        assert_eq!(e.to_string(), "at 3: type error: cannot negate string");
    }
}
