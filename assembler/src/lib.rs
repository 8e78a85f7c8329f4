//! Assembler front-end for TI-58/59 keystroke programs.
//!
//! Source text goes through four layers: [`lexer`] splits raw tokens,
//! [`ir1_semantic_tokens`] attaches trivia and meaning, [`ir2_statements`]
//! groups tokens into statements, and [`ir3_encode`] turns those into
//! opcodes and addresses. [`Program`] ties it together with the checks
//! in [`analysis`].

pub mod analysis;
pub mod error;
pub mod ir1_semantic_tokens;
pub mod ir2_statements;
pub mod ir3_encode;
pub mod keys;
pub mod lexer;
pub mod listing;
pub mod parser;
pub mod program;

mod util;

pub use parser::{assemble, parse, LeniencyLevel};
pub use program::Program;
