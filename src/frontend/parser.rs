use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::parse_error::ParseError;
use crate::frontend::token::Token;
use crate::lang::node::{BinaryOp, Expr, Literal, Stmt, UnaryOp};
use crate::lang::program::Program;

/// Right binding power of the prefix `-` and `!` operators.
const UNARY_BP: u8 = 85;

/// Right binding power for prefix forms, or `None` if the token cannot start
/// an expression.
fn prefix_binding_power(token: &Token) -> Option<u8> {
    let bp = match token {
        Token::Ident(_)
        | Token::Number(_)
        | Token::String(_)
        | Token::True
        | Token::False
        | Token::Null
        | Token::LParen => 100,
        Token::Fun => 98,
        Token::Minus | Token::Bang => UNARY_BP,
        _ => return None,
    };
    Some(bp)
}

/// `(left, right)` binding powers for infix and postfix forms.
fn infix_binding_power(token: &Token) -> Option<(u8, u8)> {
    let bp = match token {
        Token::LParen => (90, 91),
        Token::Caret => (82, 83),
        Token::Star | Token::Slash | Token::Percent => (80, 81),
        Token::Plus | Token::Minus => (70, 71),
        Token::Gt | Token::GtEq | Token::Lt | Token::LtEq => (60, 61),
        Token::EqEq | Token::NotEq => (50, 51),
        Token::AndAnd => (40, 41),
        Token::OrOr => (30, 31),
        _ => return None,
    };
    Some(bp)
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    let op = match token {
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::Percent => BinaryOp::Mod,
        Token::Caret => BinaryOp::Pow,
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Gt => BinaryOp::Gt,
        Token::GtEq => BinaryOp::GtEq,
        Token::Lt => BinaryOp::Lt,
        Token::LtEq => BinaryOp::LtEq,
        Token::EqEq => BinaryOp::Eq,
        Token::NotEq => BinaryOp::NotEq,
        Token::AndAnd => BinaryOp::And,
        Token::OrOr => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Eof => "end of input".to_string(),
        other => format!("'{}'", other),
    }
}

/// Pratt / recursive-descent parser for Cilly.
///
/// Statements are dispatched on one token of lookahead (two for
/// `identifier '='`). Expressions use binding powers: the core loop keeps
/// consuming infix operators while their left power exceeds the bound it was
/// called with.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    /// Creates a parser from lexer output.
    ///
    /// An `Eof` token is appended if the stream does not already end in one,
    /// so lookahead never runs off the end.
    pub fn new(mut tokens: Vec<Spanned>) -> Self {
        if !matches!(tokens.last(), Some(Spanned { token: Token::Eof, .. })) {
            let span = tokens
                .last()
                .map(|s| s.span.clone())
                .unwrap_or(Span { line: 1, col: 1 });
            tokens.push(Spanned {
                token: Token::Eof,
                span,
            });
        }
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Spanned {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_next(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + 1).min(last)].token
    }

    /// Consumes the current token. Never moves past `Eof`.
    fn advance(&mut self) -> Token {
        let token = self.current().token.clone();
        if !matches!(token, Token::Eof) {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let span = &self.current().span;
        ParseError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected '{}', found {}",
                expected,
                describe(self.peek())
            )))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ParseError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!(
                "expected identifier {}, found {}",
                context,
                describe(other)
            ))),
        }
    }

    /// Parses a complete program: statements until `Eof`.
    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while !matches!(self.peek(), Token::Eof) {
            statements.push(self.parse_statement()?);
        }

        tracing::debug!(statements = statements.len(), "parsed program");
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Token::Define | Token::Var => self.parse_define(),
            Token::Ident(_) if matches!(self.peek_next(), Token::Assign) => self.parse_assign(),
            Token::Print => self.parse_print(),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::Break => {
                self.advance();
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.advance();
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Continue)
            }
            Token::Return => self.parse_return(),
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            _ => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// `('var' | 'define') NAME '=' expr ';'`
    fn parse_define(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        let name = self.expect_ident(&format!("after '{}'", keyword))?;
        self.expect(Token::Assign)?;
        let value = self.parse_expr(0)?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Define { name, value })
    }

    /// `NAME '=' expr ';'`
    fn parse_assign(&mut self) -> Result<Stmt, ParseError> {
        let name = self.expect_ident("in assignment")?;
        self.expect(Token::Assign)?;
        let value = self.parse_expr(0)?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Assign { name, value })
    }

    /// `'print' '(' args? ')' ';'`
    fn parse_print(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        self.expect(Token::LParen)?;
        let args = self.parse_args()?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Print(args))
    }

    /// `'if' '(' expr ')' stmt ('else' stmt)?`
    ///
    /// A dangling `else` attaches to the innermost `if`, since the recursive
    /// call for the then-branch gets to see it first.
    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        self.expect(Token::LParen)?;
        let cond = self.parse_expr(0)?;
        self.expect(Token::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);

        let else_branch = if matches!(self.peek(), Token::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    /// `'while' '(' expr ')' stmt`
    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        self.expect(Token::LParen)?;
        let cond = self.parse_expr(0)?;
        self.expect(Token::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { cond, body })
    }

    /// `'return' expr? ';'`
    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let value = if matches!(self.peek(), Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr(0)?)
        };
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Return(value))
    }

    /// `'{' stmt* '}'`
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Token::RBrace => {
                    self.advance();
                    return Ok(statements);
                }
                Token::Eof => return Err(self.error("expected '}', found end of input")),
                _ => statements.push(self.parse_statement()?),
            }
        }
    }

    /// Comma-separated arguments up to and including the closing `)`.
    /// The opening `(` has already been consumed.
    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Token::RParen) {
            self.advance();
            return Ok(args);
        }

        args.push(self.parse_expr(0)?);
        while matches!(self.peek(), Token::Comma) {
            self.advance();
            args.push(self.parse_expr(0)?);
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_params(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if matches!(self.peek(), Token::RParen) {
            self.advance();
            return Ok(params);
        }

        params.push(self.expect_ident("in parameter list")?);
        while matches!(self.peek(), Token::Comma) {
            self.advance();
            params.push(self.expect_ident("in parameter list")?);
        }
        self.expect(Token::RParen)?;
        Ok(params)
    }

    /// Parses an expression whose infix operators all bind tighter than
    /// `min_bp`.
    pub fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some((l_bp, r_bp)) = infix_binding_power(self.peek()) else {
                break;
            };
            if l_bp <= min_bp {
                break;
            }

            let token = self.advance();
            lhs = match binary_op(&token) {
                Some(op) => {
                    let rhs = self.parse_expr(r_bp)?;
                    Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    }
                }
                // The only non-binary infix form is call application.
                None => Expr::Call {
                    callee: Box::new(lhs),
                    args: self.parse_args()?,
                },
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let Some(bp) = prefix_binding_power(self.peek()) else {
            return Err(self.error(format!("unexpected token {}", describe(self.peek()))));
        };

        let expr = match self.advance() {
            Token::Ident(name) => Expr::Ident(name),
            Token::Number(n) => Expr::Literal(Literal::Number(n)),
            Token::String(s) => Expr::Literal(Literal::String(s)),
            Token::True => Expr::Literal(Literal::True),
            Token::False => Expr::Literal(Literal::False),
            Token::Null => Expr::Literal(Literal::Null),
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                inner
            }
            Token::Minus => Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(self.parse_expr(bp)?),
            },
            Token::Bang => Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.parse_expr(bp)?),
            },
            Token::Fun => {
                let params = self.parse_params()?;
                let body = self.parse_block()?;
                Expr::Fun { params, body }
            }
            other => {
                return Err(self.error(format!("unexpected token {}", describe(&other))));
            }
        };

        Ok(expr)
    }
}
