/// A parsing error with source location.
///
/// `line` and `col` are 1-based positions coming from the lexer spans. Errors
/// at end of input point at the `Eof` token, which sits right after the last
/// character of the source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{line}:{col}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}
