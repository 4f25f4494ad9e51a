use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;
use std::fmt::Write;

pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints source text instead of Debug
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        print!("{}", self.dump_to_string(tokens));
    }

    pub fn dump_to_string(&self, tokens: &[Spanned]) -> String {
        let mut out = String::new();
        for s in tokens {
            self.write_one(&mut out, s);
        }
        out
    }

    fn write_one(&self, out: &mut String, s: &Spanned) {
        let line = s.span.line;
        let col = s.span.col;

        let kind = self.kind(&s.token);
        let colr = if self.color { self.color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        let _ = if self.show_debug_repr {
            writeln!(
                out,
                "[{:02}:{:02}] {}{:<8} {:?}{}",
                line, col, colr, kind, s.token, reset
            )
        } else {
            writeln!(
                out,
                "[{:02}:{:02}] {}{:<8} {}{}",
                line, col, colr, kind, s.token, reset
            )
        };
    }

    fn kind(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => "EOF",

            // literals
            Number(_) => "NUMBER",
            String(_) => "STRING",
            True | False | Null => "LITERAL",

            Ident(_) => "IDENT",

            // structure
            LParen | RParen => "PAREN",
            LBrace | RBrace => "BRACE",
            Comma | Semicolon => "PUNCT",

            // ops / comparisons
            Plus | Minus | Star | Slash | Percent | Caret | Bang | AndAnd | OrOr | Amp | Pipe => "OP",
            Assign => "ASSIGN",
            EqEq | NotEq | Lt | LtEq | Gt | GtEq => "CMP",

            Var | Define | Print | If | Else | While | Break | Continue | Return | Fun => "KEYWORD",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => Self::DIM,
            String(_) => Self::GRN,
            Number(_) | True | False | Null => Self::CYN,
            Ident(_) => Self::YEL,
            Plus | Minus | Star | Slash | Percent | Caret | Bang | AndAnd | OrOr | Amp | Pipe => Self::MAG,
            EqEq | NotEq | Lt | LtEq | Gt | GtEq => Self::MAG,
            _ => Self::RESET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    #[test]
    fn test_plain_dump() {
        let tokens = Lexer::new("var x = 1;").tokenize().unwrap();
        let out = TokenDumper::new().no_color().pretty().dump_to_string(&tokens);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "[01:01] KEYWORD  var");
        assert_eq!(lines[1], "[01:05] IDENT    x");
        assert_eq!(lines[3], "[01:09] NUMBER   1");
        assert_eq!(lines[5], "[01:11] EOF      EOF");
    }

    #[test]
    fn test_color_wraps_each_line() {
        let tokens = Lexer::new("\"s\"").tokenize().unwrap();
        let out = TokenDumper::new().dump_to_string(&tokens);
        let first = out.lines().next().unwrap();
        assert!(first.contains(TokenDumper::GRN));
        assert!(first.ends_with(TokenDumper::RESET));
    }
}
