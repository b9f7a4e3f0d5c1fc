//! Error types and common message constants.

use luma_core::Value;
use thiserror::Error;

pub mod messages {
    /// Pre-allocated, never-collected message used when allocation fails.
    pub const MEMERRMSG: &str = "not enough memory";
    pub const TOO_BIG: &str = "memory allocation error: block too big";
    pub const TRUNCATED: &str = "truncated chunk";
    pub const NOT_A_CHUNK: &str = "not a binary chunk";
    pub const VERSION_MISMATCH: &str = "version mismatch";
    pub const FORMAT_MISMATCH: &str = "format mismatch";
    pub const CORRUPTED: &str = "corrupted chunk";
    pub const INT_FORMAT: &str = "integer format mismatch";
    pub const FLOAT_FORMAT: &str = "float format mismatch";
    pub const INT_OVERFLOW: &str = "integer overflow";
    pub const BAD_CONSTANT_STRING: &str = "bad format for constant string";
    pub const BAD_CONSTANT_TAG: &str = "bad constant tag";
    pub const UPVALUE_COUNT: &str = "upvalue count mismatch";
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Error object raised by application code (a closing method).
    #[error("runtime error: {0:?}")]
    Runtime(Value),

    #[error("variable '{name}' got a non-closable value")]
    NonClosable { name: String },

    #[error("{}", messages::MEMERRMSG)]
    OutOfMemory,

    #[error("{}", messages::TOO_BIG)]
    TooBig,

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl RuntimeError {
    /// Errors that abort the operation regardless of protection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::NonClosable { .. } | RuntimeError::OutOfMemory | RuntimeError::TooBig
        )
    }
}

/// Malformed precompiled chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{chunk}: bad binary format ({reason})")]
pub struct LoadError {
    pub chunk: String,
    pub reason: String,
}

/// First failure reported by a dump sink.
#[derive(Debug, Error)]
#[error("dump failed: {0}")]
pub struct DumpError(#[from] pub std::io::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render() {
        let e = RuntimeError::NonClosable { name: "x".into() };
        assert_eq!(e.to_string(), "variable 'x' got a non-closable value");
        assert!(e.is_fatal());
        assert_eq!(RuntimeError::OutOfMemory.to_string(), "not enough memory");
        let load = LoadError {
            chunk: "main".into(),
            reason: messages::TRUNCATED.into(),
        };
        assert_eq!(load.to_string(), "main: bad binary format (truncated chunk)");
        assert!(!RuntimeError::from(load).is_fatal());
        assert!(!RuntimeError::Runtime(Value::integer(1)).is_fatal());
    }
}
