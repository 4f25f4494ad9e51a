use super::node::Stmt;

/// Parsed Cilly program: the top-level statement list.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}
