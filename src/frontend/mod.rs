//! Source text to AST: tokens, the lexer, and the Pratt parser.

pub mod lexer;
pub mod parse_error;
pub mod parser;
pub mod token;
pub mod token_dumper;

pub use lexer::{LexError, Lexer, Span, Spanned};
pub use parse_error::ParseError;
pub use parser::Parser;
pub use token::Token;
