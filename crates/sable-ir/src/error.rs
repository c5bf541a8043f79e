//! IR errors
//!
//! All failures in the IR core are synchronous and fatal to the calling
//! operation; structural invariants (def-use integrity, name uniqueness)
//! are upheld by construction rather than checked after the fact.

use thiserror::Error;

pub type IrResult<T> = Result<T, IrError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{value} is not an operand of {user}")]
    InvalidUse { user: String, value: String },

    #[error("{opcode} expects {expected} operand(s), got {got}")]
    Arity {
        opcode: String,
        expected: String,
        got: usize,
    },

    #[error("{opcode}: operand '{slot}' has type {got}, expected {expected}")]
    TypeMismatch {
        opcode: String,
        slot: String,
        expected: String,
        got: String,
    },

    #[error("invalid syntax declaration: {reason}")]
    Schema { reason: String },

    #[error("unknown opcode '{opcode}'")]
    UnknownOpcode { opcode: String },

    #[error("{what} is not implemented")]
    NotImplemented { what: String },
}
