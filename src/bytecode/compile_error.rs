/// Errors raised while lowering an AST to bytecode.
///
/// Each variant names the offending identifier or construct. Messages are
/// printed after a `compile error: ` prefix by the pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("undefined name '{name}'")]
    UndefinedName { name: String },

    #[error("'{name}' is already defined in this scope")]
    Redefinition { name: String },

    #[error("function '{name}' is defined more than once")]
    DuplicateFunction { name: String },

    #[error("cannot assign to function '{name}'")]
    AssignToFunction { name: String },

    #[error("cannot assign to external '{name}'")]
    AssignToExternal { name: String },

    #[error("'{name}' expects {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("external '{name}' can only be called, not used as a value")]
    ExternalAsValue { name: String },

    #[error("'break' outside of a loop")]
    BreakOutsideLoop,

    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop,

    #[error("'return' outside of a function")]
    ReturnOutsideFunction,

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn undefined(name: &str) -> Self {
        CompileError::UndefinedName {
            name: name.to_string(),
        }
    }

    pub fn redefinition(name: &str) -> Self {
        CompileError::Redefinition {
            name: name.to_string(),
        }
    }

    pub fn arity(name: &str, expected: usize, found: usize) -> Self {
        CompileError::ArityMismatch {
            name: name.to_string(),
            expected,
            found,
        }
    }

    /// Suggested fix shown under the message by the CLI, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CompileError::UndefinedName { .. } => {
                Some("names must be defined with 'var' before use; functions may not see enclosing variables")
            }
            CompileError::Redefinition { .. } => {
                Some("use assignment ('x = ...') to change an existing variable")
            }
            CompileError::AssignToFunction { .. } => {
                Some("function bindings are constant; define a new variable instead")
            }
            CompileError::AssignToExternal { .. } => {
                Some("externals are provided by the host; define a new variable instead")
            }
            _ => None,
        }
    }
}
