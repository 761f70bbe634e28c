use thiserror::Error;

use crate::ir::ast::VarType;
use crate::span::Span;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Syntax error near index {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Lexer error at {span}: {message}")]
    LexerError { message: String, span: Span },

    #[error("No program root block found in the workspace")]
    MissingRoot,

    #[error("Unsupported block for EMMI export: {block_type}")]
    UnsupportedBlock { block_type: String },

    #[error("Unsupported operator {op:?} in block {block_type}")]
    UnsupportedOperator { block_type: String, op: String },

    #[error("Continue is not supported in EMMI scripts")]
    ContinueUnsupported,

    #[error("Too many variables for type {var_type}. Max is {max}.")]
    SlotExhausted { var_type: VarType, max: u8 },

    #[error("Invalid script: {reason}")]
    InvalidScript { reason: String },

    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}
