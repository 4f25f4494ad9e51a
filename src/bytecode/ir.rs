use crate::lang::node::Number;
use crate::lang::value::Value;
use serde::{Deserialize, Serialize};

/// Operand value reserved for jump targets and scope sizes that have not been
/// backpatched yet.
pub const PLACEHOLDER: u32 = u32::MAX;

/// A compiled Cilly program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramBc {
    /// Flat instruction stream: opcodes followed by their operand words.
    pub code: Vec<u32>,

    /// Constant pool indexed by `LOAD_CONST` and `CALL_PRIMITIVE`.
    pub constants: Vec<Constant>,

    /// Scope layouts in creation order.
    pub scopes: Vec<ScopeLayout>,

    /// Function table; `functions[id].id == id`.
    pub functions: Vec<FunctionDesc>,
}

impl ProgramBc {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            scopes: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn function(&self, id: usize) -> Option<&FunctionDesc> {
        self.functions.get(id)
    }
}

impl Default for ProgramBc {
    fn default() -> Self {
        Self::new()
    }
}

/// Constant pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Constant {
    /// Strict equality used to deduplicate the pool: same variant, same
    /// value. `Float` compares by bit pattern so `1.0` and `1` stay distinct
    /// and `NaN` still dedups.
    pub fn same(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Constant::Int(n) => Value::int(*n),
            Constant::Float(n) => Value::float(*n),
            Constant::Str(s) => Value::str(s),
        }
    }
}

impl From<Number> for Constant {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Constant::Int(i),
            Number::Float(f) => Constant::Float(f),
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", Number::Int(*n)),
            Constant::Float(n) => write!(f, "{}", Number::Float(*n)),
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScopeKind {
    /// A `{ ... }` block, including the program's outermost block.
    Block,
    /// The parameter frame of function `function`.
    Params { function: usize },
}

/// Variable names of one runtime frame, in slot order.
///
/// `start..end` is the code range the frame is live in: from `ENTER_SCOPE`
/// to just past its `LEAVE_SCOPE` for blocks, the whole body for parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeLayout {
    pub kind: ScopeKind,
    pub names: Vec<String>,
    pub start: u32,
    pub end: u32,
}

impl ScopeLayout {
    pub fn contains(&self, addr: usize) -> bool {
        (self.start as usize) <= addr && addr < (self.end as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDesc {
    pub id: usize,
    pub name: String,
    pub params: Vec<String>,
    /// Address of the first instruction of the body.
    pub entry: u32,
    /// Address right after the body's final `RETURN`.
    pub end: u32,
}

impl FunctionDesc {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_strict_equality() {
        assert!(Constant::Int(1).same(&Constant::Int(1)));
        assert!(!Constant::Int(1).same(&Constant::Float(1.0)));
        assert!(Constant::Float(f64::NAN).same(&Constant::Float(f64::NAN)));
        assert!(!Constant::Float(0.0).same(&Constant::Float(-0.0)));
        assert!(!Constant::Str("1".into()).same(&Constant::Int(1)));
    }

    #[test]
    fn test_constant_display() {
        assert_eq!(Constant::Int(7).to_string(), "7");
        assert_eq!(Constant::Float(2.0).to_string(), "2.0");
        assert_eq!(Constant::Str("a b".into()).to_string(), "\"a b\"");
    }

    #[test]
    fn test_constant_to_value() {
        assert_eq!(Constant::Int(3).to_value(), Value::int(3));
        assert_eq!(Constant::Str("x".into()).to_value(), Value::str("x"));
    }
}
