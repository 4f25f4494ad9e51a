//! On-disk bytecode images.
//!
//! Layout: 4-byte magic `CILY`, little-endian `u16` format version, then the
//! `postcard` encoding of a [`ProgramBc`].

use crate::bytecode::ir::ProgramBc;
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"CILY";
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("not a cilly bytecode image")]
    BadMagic,

    #[error("unsupported image version {found} (expected {VERSION})")]
    Version { found: u16 },

    #[error("corrupt image: {0}")]
    Decode(#[from] postcard::Error),

    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

pub fn encode(bc: &ProgramBc) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + bc.code.len() * 2);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&postcard::to_allocvec(bc)?);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<ProgramBc, ImageError> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(ImageError::BadMagic);
    }
    let found = u16::from_le_bytes([bytes[4], bytes[5]]);
    if found != VERSION {
        return Err(ImageError::Version { found });
    }
    Ok(postcard::from_bytes(&bytes[HEADER_LEN..])?)
}

pub fn save(path: &Path, bc: &ProgramBc) -> Result<(), ImageError> {
    let bytes = encode(bc)?;
    std::fs::write(path, &bytes).map_err(|source| ImageError::Io {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote bytecode image");
    Ok(())
}

pub fn load(path: &Path) -> Result<ProgramBc, ImageError> {
    let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
        path: path.display().to_string(),
        source,
    })?;
    decode(&bytes)
}

/// True if `bytes` starts with the image magic.
pub fn is_image(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;
    use crate::frontend::{lexer::Lexer, parser::Parser};

    fn compile(src: &str) -> ProgramBc {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        Compiler::new(&[]).compile(&program).unwrap()
    }

    #[test]
    fn test_file_round_trip() {
        let bc = compile(
            "define f = fun(n) { if (n < 2) return n; return f(n - 1) + f(n - 2); }; print(f(10), 2.5, \"s\");",
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fib.cbc");
        save(&path, &bc).unwrap();
        assert_eq!(load(&path).unwrap(), bc);
    }

    #[test]
    fn test_header() {
        let bytes = encode(&ProgramBc::new()).unwrap();
        assert!(is_image(&bytes));
        assert_eq!(&bytes[4..6], &VERSION.to_le_bytes());
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        assert!(matches!(decode(b"print(1);"), Err(ImageError::BadMagic)));
        assert!(matches!(decode(b"CI"), Err(ImageError::BadMagic)));

        let mut bytes = encode(&ProgramBc::new()).unwrap();
        bytes[4] = 9;
        assert!(matches!(decode(&bytes), Err(ImageError::Version { found: 9 })));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let bytes = encode(&compile("print(1);")).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(decode(cut), Err(ImageError::Decode(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.cbc")).unwrap_err();
        assert!(err.to_string().contains("nope.cbc"), "msg = {}", err);
    }
}
