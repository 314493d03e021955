use std::io::Cursor;

use binrw::{BinRead, Endian};
use log::{debug, warn};

use crate::error::DisassemblyError;

use super::types::{Instruction, WideInstruction};

/// What to do with a byte that is not a valid opcode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DisassemblyPolicy {
    /// Fail with [`DisassemblyError::UnknownOpcode`].
    #[default]
    Strict,
    /// Emit a one-byte [`Instruction::Unknown`] entry and keep going.
    RawFallback,
}

/// An instruction located in its method's code array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressedInstruction {
    pub address: u32,
    pub length: u32,
    pub instruction: Instruction,
}

impl AddressedInstruction {
    /// Offset of the instruction that follows this one.
    pub fn next_address(&self) -> u32 {
        self.address + self.length
    }
}

/// Decode a code array from offset 0 to its end.
///
/// Entries are contiguous: their lengths sum to `code.len()`.
pub fn disassemble(
    code: &[u8],
    policy: DisassemblyPolicy,
) -> Result<Vec<AddressedInstruction>, DisassemblyError> {
    let mut cursor = Cursor::new(code);
    let mut out = Vec::new();
    while (cursor.position() as usize) < code.len() {
        let address = cursor.position() as u32;
        let instruction = Instruction::read_options(&mut cursor, Endian::Big, (address,))
            .map_err(|_| DisassemblyError::TruncatedInput { offset: address })?;
        if let Instruction::Unknown(byte) = instruction {
            check_unknown(code, address, byte, policy)?;
            warn!("unknown opcode {:#04x} at offset {}, emitting raw byte", byte, address);
            cursor.set_position(address as u64 + 1);
        }
        let length = cursor.position() as u32 - address;
        out.push(AddressedInstruction {
            address,
            length,
            instruction,
        });
    }
    debug!("disassembled {} bytes into {} instructions", code.len(), out.len());
    Ok(out)
}

/// Decide whether an `Unknown` decode is a truncated known instruction or a
/// genuinely unknown byte the policy may tolerate.
fn check_unknown(
    code: &[u8],
    address: u32,
    byte: u8,
    policy: DisassemblyPolicy,
) -> Result<(), DisassemblyError> {
    const WIDE: u8 = 0xc4;
    const LAST_OPCODE: u8 = 0xc9;

    let unknown = if byte == WIDE {
        match code.get(address as usize + 1) {
            Some(sub) if !WideInstruction::OPCODES.contains(sub) => {
                Some(DisassemblyError::UnknownOpcode {
                    offset: address + 1,
                    byte: *sub,
                })
            }
            _ => None,
        }
    } else if byte > LAST_OPCODE {
        Some(DisassemblyError::UnknownOpcode {
            offset: address,
            byte,
        })
    } else {
        None
    };

    match unknown {
        // a known opcode whose operands did not decode
        None => Err(DisassemblyError::TruncatedInput { offset: address }),
        Some(err) if policy == DisassemblyPolicy::Strict => Err(err),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_sequence() {
        let code = [0x1a, 0x1b, 0x60, 0xac];
        let instrs = disassemble(&code, DisassemblyPolicy::Strict).unwrap();
        let ops: Vec<_> = instrs.iter().map(|i| i.instruction.clone()).collect();
        assert_eq!(
            ops,
            vec![Instruction::Iload0, Instruction::Iload1, Instruction::Iadd, Instruction::Ireturn]
        );
        assert_eq!(instrs[3].address, 3);
        assert!(instrs.iter().all(|i| i.length == 1));
    }

    #[test]
    fn tableswitch_padding_follows_address() {
        // iload_0; tableswitch at 1, padding 2 bytes, default=+20, low=0, high=1
        let mut code = vec![0x1a, 0xaa, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&10i32.to_be_bytes());
        code.extend_from_slice(&15i32.to_be_bytes());
        let instrs = disassemble(&code, DisassemblyPolicy::Strict).unwrap();
        assert_eq!(instrs.len(), 2);
        let switch = &instrs[1];
        assert_eq!(switch.length, 1 + 2 + 12 + 8);
        assert_eq!(switch.instruction.byte_size(1), switch.length);
        match &switch.instruction {
            Instruction::Tableswitch { default, low, high, offsets } => {
                assert_eq!((*default, *low, *high), (20, 0, 1));
                assert_eq!(offsets, &vec![10, 15]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wide_forms_decode() {
        let code = [0xc4, 0x84, 0x01, 0x00, 0xff, 0xfe, 0xc4, 0x15, 0x01, 0x00];
        let instrs = disassemble(&code, DisassemblyPolicy::Strict).unwrap();
        assert_eq!(
            instrs[0].instruction,
            Instruction::Wide(WideInstruction::Iinc { index: 256, value: -2 })
        );
        assert_eq!(instrs[0].length, 6);
        assert_eq!(instrs[1].instruction, Instruction::Wide(WideInstruction::Iload(256)));
        assert_eq!(instrs[1].address, 6);
    }

    #[test]
    fn unknown_opcode_respects_policy() {
        let code = [0x00, 0xcb, 0xb1];
        assert_eq!(
            disassemble(&code, DisassemblyPolicy::Strict),
            Err(DisassemblyError::UnknownOpcode { offset: 1, byte: 0xcb })
        );
        let instrs = disassemble(&code, DisassemblyPolicy::RawFallback).unwrap();
        assert_eq!(instrs.len(), 3);
        assert_eq!(instrs[1].instruction, Instruction::Unknown(0xcb));
        assert_eq!(instrs[1].length, 1);
        assert_eq!(instrs[2].instruction, Instruction::Return);
    }

    #[test]
    fn truncated_operands_fail_regardless_of_policy() {
        // sipush missing its second operand byte
        let code = [0x00, 0x11, 0x01];
        for policy in [DisassemblyPolicy::Strict, DisassemblyPolicy::RawFallback] {
            assert_eq!(
                disassemble(&code, policy),
                Err(DisassemblyError::TruncatedInput { offset: 1 })
            );
        }
    }

    #[test]
    fn inverted_tableswitch_is_rejected() {
        let mut code = vec![0xaa, 0, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&5i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        assert_eq!(
            disassemble(&code, DisassemblyPolicy::Strict),
            Err(DisassemblyError::TruncatedInput { offset: 0 })
        );
    }
}
