use serde::{Deserialize, Serialize};

/// Numeric literal payload.
///
/// Integers and floats share one token/value kind; the variant only records
/// whether the source spelling had a decimal point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Float(n) => n == 0.0,
        }
    }
}

impl std::fmt::Display for Number {
    /// Floats always carry a fractional part (`2.0`), integers never do.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{}", n),
            Number::Float(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e16 => {
                write!(f, "{:.1}", n)
            }
            Number::Float(n) => write!(f, "{}", n),
        }
    }
}

/// Literal expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(Number),
    String(String),
    True,
    False,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `^`
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Expression node. Every expression produces exactly one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // ───────────────────────────── Leaves ─────────────────────────────
    /// Number, string, `true`, `false` or `null`.
    Literal(Literal),

    /// Variable, function or external name.
    Ident(String),

    // ──────────────────────────── Operators ───────────────────────────
    /// Prefix `-` / `!`.
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Infix operator. `&&` and `||` short-circuit.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    // ──────────────────────────── Functions ───────────────────────────
    /// Call application: `callee(args...)`.
    Call { callee: Box<Expr>, args: Vec<Expr> },

    /// Function literal: `fun(params) { body }`.
    ///
    /// `define name = fun(...) {...}` uses the same node; only the compiler
    /// treats a definition whose value is a `Fun` as a named function.
    Fun { params: Vec<String>, body: Vec<Stmt> },
}

/// Statement node. Statements leave the operand stack unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `var name = value;` or `define name = value;`
    Define { name: String, value: Expr },

    /// `name = value;`
    Assign { name: String, value: Expr },

    /// `print(args...);`
    Print(Vec<Expr>),

    /// `if (cond) then_branch else else_branch`
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while (cond) body`
    While { cond: Expr, body: Box<Stmt> },

    Break,

    Continue,

    /// `return;` or `return value;`
    Return(Option<Expr>),

    /// `{ statements... }`, opens a lexical scope.
    Block(Vec<Stmt>),

    /// `expr;`, the value is discarded.
    Expr(Expr),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_display() {
        assert_eq!(Number::Int(7).to_string(), "7");
        assert_eq!(Number::Int(-3).to_string(), "-3");
        assert_eq!(Number::Float(2.0).to_string(), "2.0");
        assert_eq!(Number::Float(0.5).to_string(), "0.5");
        assert_eq!(Number::Float(-1.25).to_string(), "-1.25");
        assert_eq!(Number::Float(f64::INFINITY).to_string(), "inf");
    }

    #[test]
    fn test_number_zero() {
        assert!(Number::Int(0).is_zero());
        assert!(Number::Float(0.0).is_zero());
        assert!(Number::Float(-0.0).is_zero());
        assert!(!Number::Float(0.1).is_zero());
    }

    #[test]
    fn test_binary_op_symbols() {
        assert_eq!(BinaryOp::LtEq.symbol(), "<=");
        assert_eq!(BinaryOp::Or.symbol(), "||");
    }
}
