//! Textual I/O for the IL (spec §4.1): the canonical serializer and the
//! parser that reads it back. This is the stable exchange boundary between
//! the core and every external tool, code generator, and test input (spec
//! §6 "IL textual format").

pub mod lexer;
pub mod parse;
pub mod serialize;

pub use parse::parse;
pub use serialize::{serialize, SerializeOptions};
