use super::node::Number;
use std::rc::Rc;

/// Runtime value in the Cilly VM.
///
/// Values are immutable. Strings are reference counted so that loading a
/// string constant or copying a variable never copies the text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer or floating-point number.
    Number(Number),

    /// UTF-8 string.
    Str(Rc<str>),

    /// Boolean. Use [`Value::TRUE`] / [`Value::FALSE`].
    Bool(bool),

    Null,
}

impl Value {
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);
    pub const NULL: Value = Value::Null;

    /// The canonical boolean for `b`.
    pub fn bool(b: bool) -> Value {
        if b { Value::TRUE } else { Value::FALSE }
    }

    pub fn int(n: i64) -> Value {
        Value::Number(Number::Int(n))
    }

    pub fn float(n: f64) -> Value {
        Value::Number(Number::Float(n))
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(Number::Int(_)) => "integer",
            Value::Number(Number::Float(_)) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
        }
    }

    /// Truthiness used by `!`: `false`, `null`, zero and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Number(n) => !n.is_zero(),
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Language-level equality (`==`).
    ///
    /// Numbers compare numerically across integer and float; other kinds
    /// compare only with themselves.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(Number::Int(a)), Value::Number(Number::Int(b))) => a == b,
            (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    /// Textual form used by `print`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
        }
    }
}
