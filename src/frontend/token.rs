use crate::lang::node::Number;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(Number),
    String(std::string::String),
    True,
    False,
    Null,

    // Keywords
    Var,
    Define,
    Print,
    If,
    Else,
    While,
    Break,
    Continue,
    Return,
    Fun,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,

    // Assignment & comparison
    Assign,
    EqEq,
    Bang,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,

    // Logic
    AndAnd,
    OrOr,
    /// A lone `&` (the lexer falls back to it when `&&` does not match).
    Amp,
    /// A lone `|`.
    Pipe,

    // Identifier
    Ident(std::string::String),

    Eof,
}

impl Token {
    /// Maps an identifier spelling to its keyword token, if it is one.
    pub fn keyword(ident: &str) -> Option<Token> {
        let token = match ident {
            "var" => Token::Var,
            "define" => Token::Define,
            "print" => Token::Print,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "return" => Token::Return,
            "fun" => Token::Fun,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => return None,
        };
        Some(token)
    }

    /// Returns true for keyword tokens (including the literal keywords).
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::Var
                | Token::Define
                | Token::Print
                | Token::If
                | Token::Else
                | Token::While
                | Token::Break
                | Token::Continue
                | Token::Return
                | Token::Fun
                | Token::True
                | Token::False
                | Token::Null
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Var => write!(f, "var"),
            Token::Define => write!(f, "define"),
            Token::Print => write!(f, "print"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::Return => write!(f, "return"),
            Token::Fun => write!(f, "fun"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::Assign => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::Bang => write!(f, "!"),
            Token::NotEq => write!(f, "!="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Eof => write!(f, "EOF"),
        }
    }
}
