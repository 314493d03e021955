//! Cursor-based big-endian reader over an in-memory class file.
//!
//! Every structure in the class file is decoded through `binrw`; this wrapper
//! remembers where each read started so that failures can be reported with
//! the byte offset of the structure that could not be completed.

use std::io::Cursor;

use binrw::{BinRead, Endian};
use log::trace;

use crate::error::ParseError;

pub struct ClassReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Current byte offset from the start of the buffer.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position() as usize)
    }

    /// The byte under the cursor, without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.cursor.get_ref().get(self.position() as usize).copied()
    }

    /// Read one big-endian structure that takes no arguments.
    pub fn read<T>(&mut self) -> Result<T, ParseError>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        self.read_with::<T>(())
    }

    /// Read one big-endian structure with explicit `binrw` arguments.
    pub fn read_with<T: BinRead>(&mut self, args: T::Args<'_>) -> Result<T, ParseError> {
        let start = self.position();
        match T::read_options(&mut self.cursor, Endian::Big, args) {
            Ok(value) => {
                trace!(
                    "read {} bytes at {:#x}",
                    self.position() - start,
                    start
                );
                Ok(value)
            }
            Err(err) => {
                self.cursor.set_position(start);
                Err(map_binrw_error(err, start))
            }
        }
    }

    /// Read exactly `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ParseError> {
        let start = self.position() as usize;
        let bytes: &'a [u8] = self.cursor.get_ref();
        let end = start
            .checked_add(count)
            .filter(|&end| end <= bytes.len())
            .ok_or(ParseError::TruncatedInput {
                offset: start as u64,
            })?;
        self.cursor.set_position(end as u64);
        Ok(&bytes[start..end])
    }
}

/// Translate a `binrw` failure that happened while reading a structure which
/// started at `start` into the crate's error taxonomy.
pub fn map_binrw_error(err: binrw::Error, start: u64) -> ParseError {
    if err.is_eof() {
        return ParseError::TruncatedInput { offset: start };
    }
    match err {
        binrw::Error::BadMagic { pos, .. } => ParseError::MalformedHeader {
            reason: format!("bad magic at offset {:#x}", pos),
        },
        binrw::Error::Io(io) => ParseError::Io(io),
        other => ParseError::MalformedHeader {
            reason: format!("unreadable structure at offset {:#x}: {}", start, other),
        },
    }
}
