//! Inspector for [Java Classfiles](https://docs.oracle.com/javase/specs/jvms/se10/html/jvms-4.html):
//! parse, disassemble, decompile and step through methods one instruction at a time.

use std::fs::File;
use std::io::{prelude::*, BufReader};
use std::path::Path;

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod code_attribute;
pub mod constant_info;
pub mod field_info;
pub mod method_info;

#[cfg(feature = "decompile")]
pub mod decompile;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod reader;
pub mod types;

pub use engine::{Engine, EngineConfig};
pub use error::{DisassemblyError, EngineError, ParseError, ResolveError, SessionError};
pub use parser::class_parser;
pub use types::*;

/// Parse a class file from a byte buffer.
///
/// ```rust
/// let result = classfile_inspector::open(b"this_will_be_parsed_as_classfile");
/// assert!(result.is_err());
/// ```
pub fn open(bytes: &[u8]) -> Result<ClassFile, ParseError> {
    class_parser(bytes)
}

/// Attempt to parse a class file given a path to a class file (with or without the
/// `.class` extension).
pub fn parse_class_file<P: AsRef<Path>>(path: P) -> Result<ClassFile, ParseError> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) if path.extension().is_none() => File::open(path.with_extension("class"))?,
        Err(err) => return Err(err.into()),
    };
    let mut reader = BufReader::new(file);
    parse_class_from_reader(&mut reader)
}

/// Attempt to parse a class file given a reader that implements the std::io::Read trait.
///
/// ```rust
/// let mut reader = "this_will_be_parsed_as_classfile".as_bytes();
/// let result = classfile_inspector::parse_class_from_reader(&mut reader);
/// assert!(result.is_err());
/// ```
pub fn parse_class_from_reader<T: Read>(reader: &mut T) -> Result<ClassFile, ParseError> {
    let mut class_bytes = Vec::new();
    reader.read_to_end(&mut class_bytes)?;
    class_parser(&class_bytes)
}
