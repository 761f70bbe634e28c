pub mod ast;
pub mod command;
