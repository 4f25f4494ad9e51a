use crate::frontend::token::Token;
use crate::lang::node::Number;

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{line}:{col}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

/// Operators that may be followed by a second character.
///
/// Keyed on the first character: `(second, two-char token, one-char token)`.
fn two_char_operator(first: char) -> Option<(char, Token, Token)> {
    let entry = match first {
        '>' => ('=', Token::GtEq, Token::Gt),
        '<' => ('=', Token::LtEq, Token::Lt),
        '=' => ('=', Token::EqEq, Token::Assign),
        '!' => ('=', Token::NotEq, Token::Bang),
        '&' => ('&', Token::AndAnd, Token::Amp),
        '|' => ('|', Token::OrOr, Token::Pipe),
        _ => return None,
    };
    Some(entry)
}

fn one_char_token(ch: char) -> Option<Token> {
    let token = match ch {
        '(' => Token::LParen,
        ')' => Token::RParen,
        '{' => Token::LBrace,
        '}' => Token::RBrace,
        ',' => Token::Comma,
        ';' => Token::Semicolon,
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '%' => Token::Percent,
        '^' => Token::Caret,
        _ => return None,
    };
    Some(token)
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn error_at(&self, span: &Span, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    /// Skips whitespace and `#` line comments.
    fn skip_trivia(&mut self) {
        while let Some(ch) = self.current() {
            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '#' => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_string(&mut self, start: &Span) -> Result<Token, LexError> {
        self.advance(); // opening quote

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Ok(Token::String(string));
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => return Err(self.error_at(start, "unterminated string literal")),
            }
        }
    }

    fn read_number(&mut self, start: &Span) -> Result<Token, LexError> {
        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if self.current() == Some('.') {
            digits.push('.');
            self.advance();
            while let Some(ch) = self.current() {
                if ch.is_ascii_digit() {
                    digits.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }

            let value: f64 = digits
                .parse()
                .map_err(|_| self.error_at(start, format!("invalid float: {}", digits)))?;
            return Ok(Token::Number(Number::Float(value)));
        }

        let value: i64 = digits
            .parse()
            .map_err(|_| self.error_at(start, format!("integer literal out of range: {}", digits)))?;
        Ok(Token::Number(Number::Int(value)))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::keyword(&ident).unwrap_or(Token::Ident(ident))
    }

    fn read_operator(&mut self, ch: char) -> Option<Token> {
        if let Some(token) = one_char_token(ch) {
            self.advance();
            return Some(token);
        }

        let (second, double, single) = two_char_operator(ch)?;
        self.advance();
        if self.current() == Some(second) {
            self.advance();
            Some(double)
        } else {
            Some(single)
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia();
            let span = self.span();

            let token = match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('"') => self.read_string(&span)?,
                Some(ch) if ch.is_ascii_digit() => self.read_number(&span)?,
                Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => self.read_identifier(),
                Some(ch) => match self.read_operator(ch) {
                    Some(token) => token,
                    None => {
                        return Err(self.error_at(&span, format!("unexpected character '{}'", ch)));
                    }
                },
            };

            tokens.push(Spanned { token, span });
        }

        tracing::debug!(count = tokens.len(), "tokenized source");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .filter(|t| !matches!(t, Token::Eof))
            .collect()
    }

    fn lex_err(source: &str) -> LexError {
        Lexer::new(source).tokenize().unwrap_err()
    }

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    fn int(n: i64) -> Token {
        Token::Number(Number::Int(n))
    }

    #[test]
    fn test_print_statement() {
        let t = tokens("print(1 + 2 * 3);");
        assert_eq!(
            t,
            vec![
                Token::Print,
                Token::LParen,
                int(1),
                Token::Plus,
                int(2),
                Token::Star,
                int(3),
                Token::RParen,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_caret() {
        assert_eq!(tokens("2^3"), vec![int(2), Token::Caret, int(3)]);
    }

    #[test]
    fn test_keywords() {
        let t = tokens("var define print if else while break continue return fun true false null");
        assert_eq!(
            t,
            vec![
                Token::Var,
                Token::Define,
                Token::Print,
                Token::If,
                Token::Else,
                Token::While,
                Token::Break,
                Token::Continue,
                Token::Return,
                Token::Fun,
                Token::True,
                Token::False,
                Token::Null,
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        let t = tokens("variable iffy _fun x_1");
        assert_eq!(
            t,
            vec![ident("variable"), ident("iffy"), ident("_fun"), ident("x_1")]
        );
    }

    #[test]
    fn test_two_char_operators() {
        let t = tokens(">= <= == != && ||");
        assert_eq!(
            t,
            vec![
                Token::GtEq,
                Token::LtEq,
                Token::EqEq,
                Token::NotEq,
                Token::AndAnd,
                Token::OrOr,
            ]
        );
    }

    #[test]
    fn test_two_char_fallback_to_single() {
        let t = tokens("> < = ! & |");
        assert_eq!(
            t,
            vec![
                Token::Gt,
                Token::Lt,
                Token::Assign,
                Token::Bang,
                Token::Amp,
                Token::Pipe,
            ]
        );
    }

    #[test]
    fn test_operator_without_spaces() {
        let t = tokens("a>=b==!c");
        assert_eq!(
            t,
            vec![
                ident("a"),
                Token::GtEq,
                ident("b"),
                Token::EqEq,
                Token::Bang,
                ident("c"),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let t = tokens("42 3.14 7. 0");
        assert_eq!(
            t,
            vec![
                int(42),
                Token::Number(Number::Float(3.14)),
                Token::Number(Number::Float(7.0)),
                int(0),
            ]
        );
    }

    #[test]
    fn test_minus_is_separate_token() {
        assert_eq!(tokens("-5"), vec![Token::Minus, int(5)]);
    }

    #[test]
    fn test_integer_overflow_errors() {
        let err = lex_err("99999999999999999999");
        assert!(err.message.contains("out of range"), "msg was: {}", err.message);
    }

    #[test]
    fn test_string_without_escapes() {
        let t = tokens(r#""a\nb" "x y""#);
        assert_eq!(
            t,
            vec![
                Token::String("a\\nb".to_string()),
                Token::String("x y".to_string()),
            ]
        );
    }

    #[test]
    fn test_string_may_span_lines() {
        let t = tokens("\"line1\nline2\"");
        assert_eq!(t, vec![Token::String("line1\nline2".to_string())]);
    }

    #[test]
    fn test_unterminated_string_errors_at_opening_quote() {
        let err = lex_err("print(\n  \"oops);");
        assert!(
            err.message.contains("unterminated string"),
            "msg was: {}",
            err.message
        );
        assert_eq!((err.line, err.col), (2, 3));
    }

    #[test]
    fn test_comments_are_skipped() {
        let t = tokens("# header\nvar x = 1; # trailing\n# last");
        assert_eq!(
            t,
            vec![Token::Var, ident("x"), Token::Assign, int(1), Token::Semicolon]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex_err("var x = 1 @ 2;");
        assert!(err.message.contains("'@'"), "msg was: {}", err.message);
        assert_eq!((err.line, err.col), (1, 11));
    }

    #[test]
    fn test_spans_track_lines_and_columns() {
        let spanned = Lexer::new("var a;\n  print(a);").tokenize().unwrap();
        assert_eq!(spanned[0].span, Span { line: 1, col: 1 });
        assert_eq!(spanned[1].span, Span { line: 1, col: 5 });
        assert_eq!(spanned[3].span, Span { line: 2, col: 3 });
    }

    #[test]
    fn test_eof_is_always_last() {
        let spanned = Lexer::new("").tokenize().unwrap();
        assert_eq!(spanned.len(), 1);
        assert_eq!(spanned[0].token, Token::Eof);
    }

    #[test]
    fn test_lexing_is_deterministic() {
        let src = "define f = fun(a, b) { return a + b * 2.5; };";
        assert_eq!(tokens(src), tokens(src));
    }

    #[test]
    fn test_error_display_has_location() {
        let err = lex_err("\n  $");
        assert_eq!(err.to_string(), "2:3: unexpected character '$'");
    }
}
