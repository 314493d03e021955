mod disassembler;
mod instruction;
mod listing;
mod types;

pub use disassembler::{disassemble, AddressedInstruction, DisassemblyPolicy};
pub use instruction::{branch_target, switch_padding, Operand};
pub use listing::{render_instruction, render_listing};
pub use types::*;
