//! EMMI robot program toolchain: visual block trees, the JSON program AST and
//! the token script the robot firmware interprets.

pub mod blockly;
pub mod error;
pub mod ir;
pub mod sanitize;
pub mod script;
pub mod span;
pub mod synth;

pub use error::CompileError;
pub use ir::ast::Program;
