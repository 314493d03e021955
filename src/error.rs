use thiserror::Error;

use crate::interpreter::SessionState;

/// Errors raised while turning bytes into a [`ClassFile`](crate::ClassFile).
///
/// All of these are fatal for the class being opened; nothing partial escapes.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed class header: {reason}")]
    MalformedHeader { reason: String },

    #[error("input truncated at byte offset {offset:#x}")]
    TruncatedInput { offset: u64 },

    #[error("unknown constant pool tag {tag} at byte offset {offset:#x}")]
    UnknownConstantTag { tag: u8, offset: u64 },

    #[error("constant pool index #{index} does not refer to {expected}")]
    DanglingReference { index: u16, expected: &'static str },

    #[error("invalid {name} attribute: {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("invalid descriptor {0:?}")]
    InvalidDescriptor(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A constant pool lookup that cannot be satisfied.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("constant pool index #{index} does not refer to {expected}")]
    DanglingReference { index: u16, expected: &'static str },
}

impl From<ResolveError> for ParseError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::DanglingReference { index, expected } => {
                ParseError::DanglingReference { index, expected }
            }
        }
    }
}

/// Errors raised while decoding a method's code array.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DisassemblyError {
    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { offset: u32, byte: u8 },

    /// The opcode is known but its operands run past the end of the code array
    /// (or describe an impossible switch table).
    #[error("instruction at offset {offset} is truncated")]
    TruncatedInput { offset: u32 },
}

/// Errors reported by a debug session command.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SessionError {
    #[error("line {line} has no instruction mapped to it")]
    InvalidBreakpoint { line: u32 },

    #[error("session is {state:?} and cannot execute; reset it first")]
    NotRunnable { state: SessionState },

    #[error("execution fault at offset {pc}: {reason}")]
    Fault { pc: u32, reason: String },

    #[error("method {0} not found")]
    MethodNotFound(String),

    #[error("method {0} has no code")]
    NoCode(String),
}

/// Errors surfaced by the [`Engine`](crate::Engine) command surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Disassembly(#[from] DisassemblyError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("method {0} not found")]
    MethodNotFound(String),
}

impl From<ResolveError> for EngineError {
    fn from(err: ResolveError) -> Self {
        EngineError::Parse(err.into())
    }
}
